// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # rust_scadasim
//!
//! An industrial control network simulator for security testbeds. Each
//! simulated PLC exposes register-addressable state; behavior tasks
//! continuously vary that state according to configured variance functions,
//! an HMI-side propagator pushes actuator changes through a device
//! hierarchy, and a checkpoint manager persists the registers across
//! restarts.
//!
//! ## Subsystems
//!
//! - [`config`]: the YAML master configuration (banks, behaviors, devices)
//! - [`datastore`]: the four shared register banks with per-bank locking
//! - [`behavior`]: one periodic variance task per configured register group
//! - [`propagation`]: actuator polling and dependent-subtree signaling
//! - [`checkpoint`]: atomic state snapshots and strict startup restore
//! - [`modbus`]: thin Modbus TCP front-end over the datastore
//! - [`daemon`]: lifecycle management for all of the above

pub mod behavior;
pub mod checkpoint;
pub mod config;
pub mod daemon;
pub mod datastore;
pub mod modbus;
pub mod propagation;
