// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Modbus Module
//!
//! Thin Modbus TCP front-end over the shared register datastore. The
//! protocol layer carries no simulation logic of its own; the behavior
//! engine and dependency propagator only ever see the datastore.

pub mod modbus_server;

pub use modbus_server::ScadaModbusServer;
