// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device tree configuration
//!
//! The `devices` section describes the hierarchy of controllers, HMIs,
//! sensors and actuators used by the dependency propagator to resolve which
//! leaves a changed actuator affects. The tree is built and validated by the
//! external configuration tooling; the simulator consumes it read-only.
//!
//! Device kinds and actuator roles are explicit tags set at construction
//! time; the simulator never infers a device's nature from its identifier.
//!
//! ### Example
//!
//! ```yaml
//! devices:
//!   - id: dev-plant
//!     kind: controller
//!     children:
//!       - { id: act-plant-status, kind: actuator, register_address: 10, role: status }
//!       - { id: sen-flow, kind: sensor, register_address: 11 }
//!       - id: act-valve
//!         kind: actuator
//!         register_address: 12
//!         role: relational
//!         relationship: { sensor_id: sen-flow, polarity: negative }
//! ```

use serde::{Deserialize, Serialize};

/// The kind of one device tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// A controller grouping sub-devices, sensors and actuators
    Controller,
    /// An HMI gateway node (container, like a controller)
    Hmi,
    /// A sensor leaf
    Sensor,
    /// An actuator leaf
    Actuator,
}

/// Semantic role of an actuator, selecting its propagation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorRole {
    /// Plain on/off actuator with no special propagation
    #[default]
    Generic,
    /// The distinguished actuator whose 0/1/kill value gates the sleep,
    /// active or kill state of its device's entire dependent subtree
    Status,
    /// Translates its value into a signal for an associated sensor via the
    /// variable lookup table
    Variable,
    /// Translates its value into a signal for an associated sensor via the
    /// polarity-keyed relational lookup table
    Relational,
}

/// Direction of a relational actuator/sensor coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

/// Relationship between a relational/variable actuator and its sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Id of the sensor receiving this actuator's signal codes
    pub sensor_id: String,
    /// Coupling direction; required for relational actuators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polarity: Option<Polarity>,
}

/// One node of the device tree document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceNodeConfig {
    /// Unique device identifier
    pub id: String,

    /// Device kind tag
    pub kind: DeviceKind,

    /// Holding register address mirroring this device's value
    /// (required for sensor and actuator leaves)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_address: Option<u16>,

    /// Actuator role; ignored for non-actuator kinds
    #[serde(default)]
    pub role: ActuatorRole,

    /// Sensor coupling for relational/variable actuators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipConfig>,

    /// Owned sub-devices, sensors and actuators
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeviceNodeConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tree() {
        let yaml = r#"
id: dev-plant
kind: controller
children:
  - { id: act-status, kind: actuator, register_address: 10, role: status }
  - { id: sen-flow, kind: sensor, register_address: 11 }
  - id: dev-pump
    kind: controller
    children:
      - id: act-valve
        kind: actuator
        register_address: 12
        role: relational
        relationship: { sensor_id: sen-flow, polarity: negative }
"#;
        let root: DeviceNodeConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(root.kind, DeviceKind::Controller);
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0].role, ActuatorRole::Status);
        let valve = &root.children[2].children[0];
        assert_eq!(valve.role, ActuatorRole::Relational);
        assert_eq!(
            valve.relationship.as_ref().unwrap().polarity,
            Some(Polarity::Negative)
        );
    }

    #[test]
    fn role_defaults_to_generic() {
        let yaml = "{ id: act-1, kind: actuator, register_address: 5 }";
        let node: DeviceNodeConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(node.role, ActuatorRole::Generic);
    }
}
