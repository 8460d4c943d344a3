// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register behavior engine
//!
//! This module turns the behavior descriptors of the master configuration
//! into the live data variance of the simulated PLC:
//!
//! - [`variance`] holds one synchronous tick function per behavior kind
//!   (linear ramps, coil-gated ramps, random noise, constant signals and the
//!   fuel-tank discharge/recharge cycle);
//! - [`engine`] wraps each descriptor in an independent periodic task with an
//!   explicit terminal state.
//!
//! Behavior tasks coordinate with the rest of the simulator exclusively
//! through the shared register datastore.

pub mod engine;
pub mod variance;

pub use engine::{run_behavior, BehaviorExit};
