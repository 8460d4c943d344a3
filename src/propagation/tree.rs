// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device tree resolution
//!
//! Flattens the configured device hierarchy into id-indexed nodes once at
//! startup; the tree is read-only from then on. The propagator uses it to
//! resolve, for a changed actuator, every sensor/actuator leaf in the subtree
//! of the device that owns it.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::{ActuatorRole, DeviceKind, DeviceNodeConfig, Polarity};

/// Structural errors raised while walking the device tree.
///
/// These are fatal to the current propagation pass only; the polling loop
/// logs them and continues with the next actuator.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A child or relationship id does not resolve to any known device.
    #[error("unresolved device reference `{0}` in dependency walk")]
    Unresolved(String),

    /// An actuator is not owned by any controller/HMI node.
    #[error("actuator `{0}` is not owned by any device")]
    Unowned(String),

    /// A device was expected to be a sensor but is not.
    #[error("device `{0}` is not a sensor")]
    NotASensor(String),

    /// A sensor/actuator leaf carries no register address.
    #[error("device `{0}` has no register address")]
    MissingRegister(String),
}

/// One flattened device node.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    pub id: String,
    pub kind: DeviceKind,
    pub register_address: Option<u16>,
    pub role: ActuatorRole,
    /// Target sensor and polarity for relational/variable actuators
    pub relationship: Option<(String, Option<Polarity>)>,
    /// Child ids, in configuration order
    pub children: Vec<String>,
    /// Owning device id (None for tree roots)
    pub owner: Option<String>,
}

impl DeviceNode {
    fn is_leaf(&self) -> bool {
        matches!(self.kind, DeviceKind::Sensor | DeviceKind::Actuator)
    }
}

/// The flattened, read-only device tree.
#[derive(Debug, Default)]
pub struct DeviceTree {
    nodes: HashMap<String, DeviceNode>,
    /// Actuator ids in configuration order, the propagator's polling set
    actuators: Vec<String>,
}

impl DeviceTree {
    /// Flatten the configured roots into an id-indexed tree.
    pub fn from_config(roots: &[DeviceNodeConfig]) -> Self {
        let mut tree = DeviceTree::default();
        for root in roots {
            tree.insert(root, None);
        }
        tree
    }

    fn insert(&mut self, config: &DeviceNodeConfig, owner: Option<&str>) {
        let node = DeviceNode {
            id: config.id.clone(),
            kind: config.kind,
            register_address: config.register_address,
            role: config.role,
            relationship: config
                .relationship
                .as_ref()
                .map(|r| (r.sensor_id.clone(), r.polarity)),
            children: config.children.iter().map(|c| c.id.clone()).collect(),
            owner: owner.map(str::to_owned),
        };
        if config.kind == DeviceKind::Actuator {
            self.actuators.push(config.id.clone());
        }
        self.nodes.insert(config.id.clone(), node);
        for child in &config.children {
            self.insert(child, Some(&config.id));
        }
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Result<&DeviceNode, TreeError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::Unresolved(id.to_owned()))
    }

    /// All actuator nodes, in configuration order.
    pub fn actuators(&self) -> impl Iterator<Item = &DeviceNode> {
        self.actuators.iter().map(|id| &self.nodes[id])
    }

    /// Resolve the sensor a relational/variable actuator signals to.
    pub fn related_sensor(&self, actuator: &DeviceNode) -> Result<&DeviceNode, TreeError> {
        let (sensor_id, _) = actuator
            .relationship
            .as_ref()
            .ok_or_else(|| TreeError::Unresolved(format!("{}:relationship", actuator.id)))?;
        let sensor = self.get(sensor_id)?;
        if sensor.kind != DeviceKind::Sensor {
            return Err(TreeError::NotASensor(sensor_id.clone()));
        }
        Ok(sensor)
    }

    /// Collect every sensor/actuator leaf in the subtree of the device that
    /// owns `actuator_id` (the triggering actuator itself included).
    ///
    /// The walk tolerates sparse trees: a container with no leaves yields an
    /// empty set. A child id that resolves to nothing raises
    /// [`TreeError::Unresolved`].
    pub fn dependent_leaves(&self, actuator_id: &str) -> Result<Vec<&DeviceNode>, TreeError> {
        let actuator = self.get(actuator_id)?;
        let owner_id = actuator
            .owner
            .as_deref()
            .ok_or_else(|| TreeError::Unowned(actuator_id.to_owned()))?;
        let owner = self.get(owner_id)?;
        let mut leaves = Vec::new();
        self.collect_leaves(owner, &mut leaves)?;
        Ok(leaves)
    }

    fn collect_leaves<'a>(
        &'a self,
        device: &'a DeviceNode,
        leaves: &mut Vec<&'a DeviceNode>,
    ) -> Result<(), TreeError> {
        for child_id in &device.children {
            let child = self.get(child_id)?;
            if child.is_leaf() {
                leaves.push(child);
            } else {
                self.collect_leaves(child, leaves)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DeviceTree {
        let yaml = r#"
- id: dev-plant
  kind: controller
  children:
    - { id: act-status, kind: actuator, register_address: 10, role: status }
    - { id: sen-flow, kind: sensor, register_address: 11 }
    - id: dev-pump
      kind: controller
      children:
        - { id: sen-pressure, kind: sensor, register_address: 12 }
        - id: act-valve
          kind: actuator
          register_address: 13
          role: relational
          relationship: { sensor_id: sen-pressure, polarity: negative }
"#;
        let roots: Vec<DeviceNodeConfig> = serde_yml::from_str(yaml).unwrap();
        DeviceTree::from_config(&roots)
    }

    #[test]
    fn walk_collects_all_leaves_recursively() {
        let tree = sample_tree();
        let leaves = tree.dependent_leaves("act-status").unwrap();
        let ids: Vec<&str> = leaves.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["act-status", "sen-flow", "sen-pressure", "act-valve"]);
    }

    #[test]
    fn walk_from_nested_actuator_covers_its_owner_only() {
        let tree = sample_tree();
        let leaves = tree.dependent_leaves("act-valve").unwrap();
        let ids: Vec<&str> = leaves.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["sen-pressure", "act-valve"]);
    }

    #[test]
    fn related_sensor_resolves_relationship() {
        let tree = sample_tree();
        let valve = tree.get("act-valve").unwrap();
        let sensor = tree.related_sensor(valve).unwrap();
        assert_eq!(sensor.id, "sen-pressure");
        assert_eq!(sensor.register_address, Some(12));
    }

    #[test]
    fn unresolved_reference_is_a_structural_error() {
        let yaml = r#"
- id: dev-1
  kind: controller
  children:
    - id: act-1
      kind: actuator
      register_address: 1
      role: variable
      relationship: { sensor_id: sen-ghost }
"#;
        let roots: Vec<DeviceNodeConfig> = serde_yml::from_str(yaml).unwrap();
        let tree = DeviceTree::from_config(&roots);
        let act = tree.get("act-1").unwrap();
        assert!(matches!(
            tree.related_sensor(act),
            Err(TreeError::Unresolved(_))
        ));
    }

    #[test]
    fn root_level_actuator_is_unowned() {
        let yaml = "[{ id: act-lone, kind: actuator, register_address: 1 }]";
        let roots: Vec<DeviceNodeConfig> = serde_yml::from_str(yaml).unwrap();
        let tree = DeviceTree::from_config(&roots);
        assert!(matches!(
            tree.dependent_leaves("act-lone"),
            Err(TreeError::Unowned(_))
        ));
    }
}
