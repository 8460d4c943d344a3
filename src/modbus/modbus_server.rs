// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the simulated PLC datastore
//!
//! For avoiding confusion with the Modbus master/slave terminology, this
//! module uses the terms "server" and "client" instead. The server is the
//! simulated PLC providing register data, while the client is the device
//! (typically the testbed's HMI or an operator tool) requesting it.
//!
//! The server is a thin adapter: every request is mapped one-to-one onto the
//! shared [`RegisterStore`], so clients observe exactly the state the
//! behavior engine and dependency propagator produce. Out-of-range windows
//! come back as `IllegalDataAddress`; the datastore itself enforces the
//! bounds, this layer only translates the error.
//!
//! ## Register Map
//!
//! The register layout is entirely configuration-driven (see the
//! `datastore` section of the master configuration); this server imposes no
//! layout of its own.

use std::future;
use std::sync::Arc;

use log::{debug, error};

use tokio_modbus::prelude::*;

use crate::datastore::{Bank, RegisterStore, StoreError};

/// A Modbus TCP server exposing the four banks of one simulated slave.
///
/// ### Thread Safety
///
/// The underlying datastore serializes access per bank, so one service
/// instance can safely be shared across concurrent client connections.
#[derive(Clone)]
pub struct ScadaModbusServer {
    store: Arc<RegisterStore>,
}

impl tokio_modbus::server::Service for ScadaModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// This method handles the data-access function codes:
    /// - 0x01: Read Coils
    /// - 0x02: Read Discrete Inputs
    /// - 0x03: Read Holding Registers
    /// - 0x04: Read Input Registers
    /// - 0x05: Write Single Coil
    /// - 0x06: Write Single Register
    /// - 0x0F: Write Multiple Coils
    /// - 0x10: Write Multiple Registers
    ///
    /// Any other function code will return an IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadCoils(addr, cnt) => self
                .read_bits(Bank::Coil, addr, cnt)
                .map(Response::ReadCoils),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .read_bits(Bank::DiscreteInput, addr, cnt)
                .map(Response::ReadDiscreteInputs),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .read_words(Bank::HoldingRegister, addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .read_words(Bank::InputRegister, addr, cnt)
                .map(Response::ReadInputRegisters),
            Request::WriteSingleRegister(addr, value) => self
                .write_words(Bank::HoldingRegister, addr, &[value])
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => self
                .write_words(Bank::HoldingRegister, addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::WriteSingleCoil(addr, asserted) => self
                .write_words(Bank::Coil, addr, &[u16::from(asserted)])
                .map(|_| Response::WriteSingleCoil(addr, asserted)),
            Request::WriteMultipleCoils(addr, bits) => {
                let words: Vec<u16> = bits.iter().map(|b| u16::from(*b)).collect();
                self.write_words(Bank::Coil, addr, &words)
                    .map(|_| Response::WriteMultipleCoils(addr, bits.len() as u16))
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

impl ScadaModbusServer {
    /// Create a server backed by the shared datastore.
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self { store }
    }

    fn read_words(&self, bank: Bank, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        self.store.read(bank, addr, cnt).map_err(exception)
    }

    fn read_bits(&self, bank: Bank, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
        let words = self.store.read(bank, addr, cnt).map_err(exception)?;
        Ok(words.iter().map(|w| *w != 0).collect())
    }

    fn write_words(&self, bank: Bank, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        self.store.write(bank, addr, values).map_err(exception)
    }
}

fn exception(err: StoreError) -> ExceptionCode {
    match err {
        StoreError::OutOfRange {
            bank,
            address,
            count,
        } => {
            error!(
                "Exception::IllegalDataAddress - bank `{}` window {}+{} not found",
                bank, address, count
            );
            ExceptionCode::IllegalDataAddress
        }
    }
}
