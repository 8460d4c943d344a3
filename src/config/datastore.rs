// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Datastore configuration: register bank layout and behavior descriptors
//!
//! The `datastore` section lays out the four register banks of the simulated
//! slave and lists one behavior descriptor per register group. Bank values in
//! this section are *initial layout only*: at startup the actual register
//! contents come from the checkpoint snapshot, never from here (see the
//! `checkpoint` module).
//!
//! ### Example
//!
//! ```yaml
//! datastore:
//!   di: { start_addr: 1, values: [0, 0, 0, 0] }
//!   co: { start_addr: 1, values: [1, 0, 0, 0] }
//!   hr: { start_addr: 1, values: [50, 120, 40, 0] }
//!   ir: { start_addr: 1, values: [0, 0, 0, 0] }
//!   behaviors:
//!     - type: linear
//!       address: 1
//!       count: 1
//!       period_secs: 5
//!       variance: 2
//!     - type: fuel_tank
//!       address: 2
//!       count: 1
//!       min: 0
//!       max: 100
//!       coil_address: 2
//! ```

use serde::{Deserialize, Serialize};

use crate::datastore::BankImage;

/// Register bank layout plus the behavior descriptors driving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Discrete input bank layout
    pub di: BankImage,
    /// Coil bank layout
    pub co: BankImage,
    /// Holding register bank layout
    pub hr: BankImage,
    /// Input register bank layout
    pub ir: BankImage,

    /// Behavior descriptors, one scheduled task each
    #[serde(default)]
    pub behaviors: Vec<BehaviorConfig>,
}

/// One behavior descriptor: a register window, a tick period and a variance
/// function. Descriptors are immutable once loaded; each one maps to exactly
/// one scheduled task for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// First register address of the driven window
    pub address: u16,

    /// Number of registers in the window
    #[serde(default = "default_count")]
    pub count: u16,

    /// Seconds between ticks
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// The variance function and its parameters
    #[serde(flatten)]
    pub kind: BehaviorKind,
}

/// The variance function of one behavior descriptor.
///
/// All kinds except `constant` drive a holding register window; `constant`
/// drives a coil window (it asserts a steady signal on a coil group).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BehaviorKind {
    /// `values[i] += variance` every tick, unconditionally.
    Linear {
        /// Signed per-tick increment
        variance: i16,
    },

    /// Ramp toward `max` while the gating coil holds its default value,
    /// decrement otherwise. The decrement is all-or-nothing: it is skipped
    /// entirely if any register in the window would go non-positive.
    LinearCoilDependent {
        variance: i16,
        /// Upper clamp for the ramp path
        max: u16,
        /// Coil gating the ramp direction
        coil_address: u16,
        /// Coil value (0 or 1) selecting the ramp path
        default_coil_value: u16,
    },

    /// Replace the window with a single random value in `[min, max]`,
    /// broadcast to every register, discarding the prior contents.
    Random { min: u16, max: u16 },

    /// Ramp like [`BehaviorKind::LinearCoilDependent`] until the window head
    /// reaches `max`, then latch into random values in `[rand_min, rand_max]`
    /// until the coil flips away from its default and the decrement path
    /// un-latches it.
    RandomCoilDependent {
        variance: i16,
        max: u16,
        rand_min: u16,
        rand_max: u16,
        coil_address: u16,
        default_coil_value: u16,
    },

    /// Broadcast a constant value to a coil window every tick.
    Constant { num: u16 },

    /// Four-phase discharge/recharge cycle against a paired coil:
    /// drain one step per second toward `min` with the coil asserted, idle
    /// with the coil deasserted, and on every other cycle additionally refill
    /// toward `max` (coil asserted) followed by another idle.
    FuelTank {
        min: u16,
        max: u16,
        /// Coil asserted while the tank is draining or refilling
        coil_address: u16,
        /// One-per-second drain steps per cycle
        #[serde(default = "default_drain_steps")]
        drain_steps: u32,
        /// One-per-second refill steps on refill cycles
        #[serde(default = "default_refill_steps")]
        refill_steps: u32,
        /// Idle seconds after a drain phase
        #[serde(default = "default_drain_idle_secs")]
        drain_idle_secs: u64,
        /// Idle seconds after a refill phase
        #[serde(default = "default_refill_idle_secs")]
        refill_idle_secs: u64,
    },
}

impl BehaviorKind {
    /// Short name used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BehaviorKind::Linear { .. } => "linear",
            BehaviorKind::LinearCoilDependent { .. } => "linear_coil_dependent",
            BehaviorKind::Random { .. } => "random",
            BehaviorKind::RandomCoilDependent { .. } => "random_coil_dependent",
            BehaviorKind::Constant { .. } => "constant",
            BehaviorKind::FuelTank { .. } => "fuel_tank",
        }
    }

    /// The gating/paired coil address, for kinds that have one.
    pub fn coil_address(&self) -> Option<u16> {
        match self {
            BehaviorKind::LinearCoilDependent { coil_address, .. }
            | BehaviorKind::RandomCoilDependent { coil_address, .. }
            | BehaviorKind::FuelTank { coil_address, .. } => Some(*coil_address),
            _ => None,
        }
    }

    /// The bank image this behavior's window must fit in.
    pub fn target_bank_image<'a>(&self, datastore: &'a DatastoreConfig) -> &'a BankImage {
        match self {
            BehaviorKind::Constant { .. } => &datastore.co,
            _ => &datastore.hr,
        }
    }
}

fn default_count() -> u16 {
    1
}

fn default_period_secs() -> u64 {
    5
}

fn default_drain_steps() -> u32 {
    25
}

fn default_refill_steps() -> u32 {
    100
}

fn default_drain_idle_secs() -> u64 {
    875
}

fn default_refill_idle_secs() -> u64 {
    900
}
