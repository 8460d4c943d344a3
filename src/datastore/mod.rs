// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register datastore for simulated PLC devices
//!
//! The datastore holds the four Modbus-style register banks of one simulated
//! PLC or HMI slave:
//!
//! | Bank | Contents | Access |
//! |------|----------|--------|
//! | `di` | Discrete inputs | Read only over the wire |
//! | `co` | Coils / discrete outputs | Read/write |
//! | `ir` | Input registers | Read only over the wire |
//! | `hr` | Holding registers | Read/write |
//!
//! Each bank is a contiguous run of 16-bit registers starting at a
//! configurable base address. Behavior tasks, the dependency propagator, the
//! checkpoint manager and the Modbus front-end all share one
//! [`RegisterStore`] through an `Arc`.
//!
//! ### Thread Safety
//!
//! Every bank is protected by its own `Mutex`, so a read never observes a
//! half-applied write within a bank, and writers to different banks do not
//! contend. The original simulator accessed its datastore from multiple
//! threads with no coordination; the per-bank lock fixes that race without
//! changing observable register semantics.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four register banks of a slave datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Discrete inputs (`di`)
    DiscreteInput,
    /// Coils / discrete outputs (`co`)
    Coil,
    /// Input registers (`ir`)
    InputRegister,
    /// Holding registers (`hr`)
    HoldingRegister,
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bank::DiscreteInput => "di",
            Bank::Coil => "co",
            Bank::InputRegister => "ir",
            Bank::HoldingRegister => "hr",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by register window accesses.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested window is not fully contained in the bank.
    ///
    /// Addresses are a configuration contract: the caller must only issue
    /// windows laid out in the master configuration, so hitting this error
    /// means the configuration and the running store disagree.
    #[error("register window out of range: bank `{bank}` address {address} count {count}")]
    OutOfRange {
        bank: Bank,
        address: u16,
        count: usize,
    },
}

/// Serializable image of a single bank: base address plus current values.
///
/// This is the shape shared by the static configuration layout and the
/// checkpoint snapshot document, so a checkpoint can be dropped in wherever a
/// layout is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankImage {
    /// First valid register address of the bank
    pub start_addr: u16,
    /// Register values, one per address starting at `start_addr`
    pub values: Vec<u16>,
}

/// Image of all four banks, in the order they appear in configuration and
/// checkpoint documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreImage {
    pub di: BankImage,
    pub co: BankImage,
    pub hr: BankImage,
    pub ir: BankImage,
}

/// A single register bank: contiguous values with a base address.
#[derive(Debug)]
struct RegisterBank {
    start_addr: u16,
    values: Vec<u16>,
}

impl RegisterBank {
    fn from_image(image: BankImage) -> Self {
        Self {
            start_addr: image.start_addr,
            values: image.values,
        }
    }

    fn image(&self) -> BankImage {
        BankImage {
            start_addr: self.start_addr,
            values: self.values.clone(),
        }
    }

    /// Translate an absolute address window into an index range, checking
    /// containment.
    fn window(&self, bank: Bank, address: u16, count: usize) -> Result<(usize, usize), StoreError> {
        let start = address as usize;
        let base = self.start_addr as usize;
        let end = start.checked_add(count).ok_or(StoreError::OutOfRange {
            bank,
            address,
            count,
        })?;
        if start < base || end > base + self.values.len() {
            return Err(StoreError::OutOfRange {
                bank,
                address,
                count,
            });
        }
        Ok((start - base, end - base))
    }
}

/// The shared register datastore of one simulated slave.
///
/// Created once per process from a checkpoint snapshot (or, for seeding, from
/// the static configuration layout) and shared between all tasks for the
/// process lifetime.
#[derive(Debug)]
pub struct RegisterStore {
    di: Mutex<RegisterBank>,
    co: Mutex<RegisterBank>,
    ir: Mutex<RegisterBank>,
    hr: Mutex<RegisterBank>,
}

impl RegisterStore {
    /// Build a store from a four-bank image.
    pub fn from_image(image: DatastoreImage) -> Self {
        Self {
            di: Mutex::new(RegisterBank::from_image(image.di)),
            co: Mutex::new(RegisterBank::from_image(image.co)),
            ir: Mutex::new(RegisterBank::from_image(image.ir)),
            hr: Mutex::new(RegisterBank::from_image(image.hr)),
        }
    }

    fn bank(&self, bank: Bank) -> &Mutex<RegisterBank> {
        match bank {
            Bank::DiscreteInput => &self.di,
            Bank::Coil => &self.co,
            Bank::InputRegister => &self.ir,
            Bank::HoldingRegister => &self.hr,
        }
    }

    /// Read `count` registers starting at `address`.
    ///
    /// Fails with [`StoreError::OutOfRange`] unless the whole window lies
    /// inside the bank. The copy is taken under the bank lock, so the result
    /// is always a consistent view of one committed state.
    pub fn read(&self, bank: Bank, address: u16, count: u16) -> Result<Vec<u16>, StoreError> {
        let guard = self.bank(bank).lock().unwrap();
        let (lo, hi) = guard.window(bank, address, count as usize)?;
        Ok(guard.values[lo..hi].to_vec())
    }

    /// Write `values` starting at `address`.
    ///
    /// All-or-nothing: either the whole window is committed under the bank
    /// lock or (on a range error) nothing is written.
    pub fn write(&self, bank: Bank, address: u16, values: &[u16]) -> Result<(), StoreError> {
        let mut guard = self.bank(bank).lock().unwrap();
        let (lo, hi) = guard.window(bank, address, values.len())?;
        guard.values[lo..hi].copy_from_slice(values);
        Ok(())
    }

    /// Copy out all four banks for checkpointing.
    ///
    /// Banks are copied one at a time under their own locks; the snapshot is
    /// per-bank consistent, which is all the checkpoint contract requires.
    pub fn image(&self) -> DatastoreImage {
        DatastoreImage {
            di: self.di.lock().unwrap().image(),
            co: self.co.lock().unwrap().image(),
            hr: self.hr.lock().unwrap().image(),
            ir: self.ir.lock().unwrap().image(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(start: u16, len: usize) -> BankImage {
        BankImage {
            start_addr: start,
            values: vec![0; len],
        }
    }

    fn store() -> RegisterStore {
        RegisterStore::from_image(DatastoreImage {
            di: image(1, 4),
            co: image(1, 4),
            hr: image(1, 8),
            ir: image(1, 4),
        })
    }

    #[test]
    fn read_write_round_trip() {
        let store = store();
        store
            .write(Bank::HoldingRegister, 3, &[7, 8, 9])
            .expect("write in range");
        assert_eq!(
            store.read(Bank::HoldingRegister, 3, 3).unwrap(),
            vec![7, 8, 9]
        );
        // Neighbouring registers untouched
        assert_eq!(
            store.read(Bank::HoldingRegister, 1, 8).unwrap(),
            vec![0, 0, 7, 8, 9, 0, 0, 0]
        );
    }

    #[test]
    fn rejects_window_below_base() {
        let store = store();
        assert!(matches!(
            store.read(Bank::Coil, 0, 1),
            Err(StoreError::OutOfRange { bank: Bank::Coil, .. })
        ));
    }

    #[test]
    fn rejects_window_past_end() {
        let store = store();
        assert!(store.read(Bank::Coil, 3, 2).is_ok());
        assert!(store.read(Bank::Coil, 3, 3).is_err());
        assert!(store.write(Bank::Coil, 4, &[1, 1]).is_err());
    }

    #[test]
    fn out_of_range_write_commits_nothing() {
        let store = store();
        store.write(Bank::InputRegister, 1, &[5, 5, 5, 5]).unwrap();
        assert!(store.write(Bank::InputRegister, 3, &[9, 9, 9]).is_err());
        assert_eq!(
            store.read(Bank::InputRegister, 1, 4).unwrap(),
            vec![5, 5, 5, 5]
        );
    }

    #[test]
    fn image_round_trip_is_bit_identical() {
        let store = store();
        store.write(Bank::HoldingRegister, 1, &[1, 2, 3]).unwrap();
        store.write(Bank::Coil, 2, &[1]).unwrap();
        let image = store.image();
        let restored = RegisterStore::from_image(image.clone());
        assert_eq!(restored.image(), image);
    }
}
