// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration module for the SCADA simulator
//!
//! The master configuration is one YAML document with a section per
//! subsystem:
//!
//! - `server`: Modbus TCP front-end (address, port, enabled)
//! - `datastore`: the four register banks and their behavior descriptors
//! - `devices`: the device tree consumed by the dependency propagator
//! - `checkpoint`: snapshot file location and persistence interval
//! - `propagation`: actuator polling interval
//!
//! The document is produced by external tooling (the testbed's configuration
//! generator); this module only loads and validates it. Sections with
//! sensible defaults may be omitted entirely.

pub mod checkpoint;
pub mod datastore;
pub mod devices;
pub mod propagation;
pub mod server;

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub use checkpoint::CheckpointConfig;
pub use datastore::{BehaviorConfig, BehaviorKind, DatastoreConfig};
pub use devices::{ActuatorRole, DeviceKind, DeviceNodeConfig, Polarity, RelationshipConfig};
pub use propagation::PropagationConfig;
pub use server::ServerConfig;

use crate::datastore::BankImage;

/// Master configuration for one simulated slave and its HMI-side tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Modbus TCP front-end settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Register bank layout and behavior descriptors
    pub datastore: DatastoreConfig,

    /// Device tree roots (controllers/HMIs with their sub-devices)
    #[serde(default)]
    pub devices: Vec<DeviceNodeConfig>,

    /// Checkpoint file and interval
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Dependency propagator settings
    #[serde(default)]
    pub propagation: PropagationConfig,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// ### Parameters
    ///
    /// * `path` - Path to the YAML configuration document
    ///
    /// ### Returns
    ///
    /// The parsed [`Config`], or an error describing the first parse or
    /// validation failure.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open configuration file {}", path.display()))?;
        let config: Config = serde_yml::from_reader(file)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate rules that the YAML structure alone cannot express.
    ///
    /// Checked here:
    ///
    /// - every behavior window must be fully contained in its target bank,
    ///   and gating coil addresses must be valid coil addresses;
    /// - device ids must be unique across the whole tree;
    /// - sensors and actuators must be leaves and carry a register address;
    /// - relational/variable actuators must reference a sensor, and
    ///   relational ones must declare a polarity.
    pub fn validate(&self) -> Result<()> {
        debug!("Performing additional configuration validation checks");

        for behavior in &self.datastore.behaviors {
            if behavior.count == 0 {
                anyhow::bail!(
                    "behavior `{}` at address {} has an empty window",
                    behavior.kind.name(),
                    behavior.address
                );
            }
            let bank = behavior.kind.target_bank_image(&self.datastore);
            check_window(bank, behavior.address, behavior.count).with_context(|| {
                format!(
                    "behavior `{}` at address {} does not fit its bank",
                    behavior.kind.name(),
                    behavior.address
                )
            })?;
            if let Some(coil_address) = behavior.kind.coil_address() {
                check_window(&self.datastore.co, coil_address, 1).with_context(|| {
                    format!(
                        "behavior `{}` references coil address {} outside the coil bank",
                        behavior.kind.name(),
                        coil_address
                    )
                })?;
            }
        }

        let mut seen = HashSet::new();
        for root in &self.devices {
            validate_device(root, &mut seen)?;
        }

        Ok(())
    }
}

fn check_window(bank: &BankImage, address: u16, count: u16) -> Result<()> {
    let start = address as usize;
    let end = start + count as usize;
    let base = bank.start_addr as usize;
    if start < base || end > base + bank.values.len() {
        anyhow::bail!(
            "window [{}, {}) outside bank [{}, {})",
            start,
            end,
            base,
            base + bank.values.len()
        );
    }
    Ok(())
}

fn validate_device(node: &DeviceNodeConfig, seen: &mut HashSet<String>) -> Result<()> {
    if !seen.insert(node.id.clone()) {
        anyhow::bail!("duplicate device id `{}`", node.id);
    }
    match node.kind {
        DeviceKind::Controller | DeviceKind::Hmi => {
            for child in &node.children {
                validate_device(child, seen)?;
            }
        }
        DeviceKind::Sensor | DeviceKind::Actuator => {
            if !node.children.is_empty() {
                anyhow::bail!("device `{}` is a leaf kind but has children", node.id);
            }
            if node.register_address.is_none() {
                anyhow::bail!("device `{}` has no register address", node.id);
            }
        }
    }
    if node.kind == DeviceKind::Actuator {
        match node.role {
            ActuatorRole::Relational => {
                let rel = node.relationship.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("relational actuator `{}` has no relationship", node.id)
                })?;
                if rel.polarity.is_none() {
                    anyhow::bail!("relational actuator `{}` has no polarity", node.id);
                }
            }
            ActuatorRole::Variable => {
                if node.relationship.is_none() {
                    anyhow::bail!("variable actuator `{}` has no relationship", node.id);
                }
            }
            ActuatorRole::Status | ActuatorRole::Generic => {}
        }
    }
    Ok(())
}
