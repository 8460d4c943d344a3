// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Checkpoint configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the checkpoint manager.
///
/// The checkpoint file is the only durable record of simulated state across
/// restarts: at startup it *replaces* the static bank values from the
/// `datastore` section, and a missing or empty file is a fatal startup
/// condition (seed one first with `--seed-checkpoint`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Path of the snapshot file
    pub path: PathBuf,

    /// Seconds between snapshots
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("checkpoint.yaml"),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1
}
