// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dependency propagator
//!
//! The HMI-side polling loop that turns actuator state changes into effects
//! on dependent devices. Every pass compares each actuator's live holding
//! register against its last commanded value; on divergence the new value is
//! committed (with a fresh rolling event counter) and pushed through the
//! actuator's dependent subtree:
//!
//! - a **status** actuator going to the kill code shuts the whole subtree
//!   down non-recoverably;
//! - a **status** actuator going to 0/1 puts the subtree to sleep or wakes
//!   it, sending sensors the sleep/resume bands and actuators their
//!   role-specific values;
//! - a **relational** or **variable** actuator signals its associated sensor
//!   through the fixed code tables in [`signals`].
//!
//! Structural errors (unresolved references, orphaned actuators) abort only
//! the current actuator's pass; the loop logs them and keeps polling.

pub mod signals;
pub mod tree;

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time;

use crate::config::{ActuatorRole, DeviceKind, Polarity};
use crate::datastore::{Bank, RegisterStore, StoreError};

pub use signals::{KILL_CODE, OFF_SENSOR_BASE, ON_SENSOR_BASE};
pub use tree::{DeviceNode, DeviceTree, TreeError};

/// Errors that abort one actuator's propagation pass.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Last commanded state of one actuator.
#[derive(Debug, Clone)]
struct CommandState {
    /// Last committed value
    value: u16,
    /// Whether the live register has converged on the committed value
    complete: bool,
    /// Rolling event counter, bumped once per observed change
    counter: u8,
}

/// The dependency propagator: polls actuators and drives their subtrees.
pub struct Propagator {
    store: Arc<RegisterStore>,
    tree: Arc<DeviceTree>,
    states: HashMap<String, CommandState>,
}

impl Propagator {
    /// Build a propagator whose commanded states start out converged on the
    /// current live register values.
    ///
    /// Fails if any actuator's register window cannot be read, since that is a
    /// configuration/layout mismatch which should surface at startup, not
    /// during polling.
    pub fn new(store: Arc<RegisterStore>, tree: Arc<DeviceTree>) -> Result<Self, PropagationError> {
        let mut states = HashMap::new();
        for actuator in tree.actuators() {
            let address = register_address(actuator)?;
            let live = store.read(Bank::HoldingRegister, address, 1)?[0];
            states.insert(
                actuator.id.clone(),
                CommandState {
                    value: live,
                    complete: true,
                    counter: 0,
                },
            );
        }
        Ok(Self {
            store,
            tree,
            states,
        })
    }

    /// Run the polling loop until shutdown is requested.
    pub async fn run(mut self, poll_interval: Duration, running: Arc<AtomicBool>) {
        info!(
            "Dependency propagator polling {} actuators every {:?}",
            self.states.len(),
            poll_interval
        );
        while running.load(Ordering::SeqCst) {
            time::sleep(poll_interval).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            self.poll_once();
        }
        info!("Dependency propagator stopped");
    }

    /// One polling pass over all actuators.
    ///
    /// Per-actuator failures are contained: the pass for that actuator is
    /// abandoned, logged, and the loop moves on.
    pub fn poll_once(&mut self) {
        let tree = Arc::clone(&self.tree);
        for actuator in tree.actuators() {
            if let Err(err) = self.poll_actuator(actuator) {
                warn!(
                    "Propagation pass for actuator `{}` aborted: {}",
                    actuator.id, err
                );
            }
        }
    }

    fn poll_actuator(&mut self, actuator: &DeviceNode) -> Result<(), PropagationError> {
        let address = register_address(actuator)?;
        let live = self.store.read(Bank::HoldingRegister, address, 1)?[0];
        let state = self
            .states
            .get_mut(&actuator.id)
            .expect("state seeded for every actuator at construction");

        if live != state.value {
            state.value = live;
            state.complete = false;
            state.counter = state.counter.wrapping_add(1);
            let counter = state.counter;
            debug!(
                "Actuator `{}` changed to {:#06x} (event {})",
                actuator.id, live, counter
            );
            self.propagate(actuator, live, counter)?;
        } else if !state.complete {
            state.complete = true;
            debug!("Actuator `{}` command acknowledged", actuator.id);
        }
        Ok(())
    }

    /// Push a committed change through the actuator's dependents.
    fn propagate(
        &mut self,
        actuator: &DeviceNode,
        value: u16,
        counter: u8,
    ) -> Result<(), PropagationError> {
        let tree = Arc::clone(&self.tree);
        match actuator.role {
            ActuatorRole::Status if value == KILL_CODE => {
                let dependents = tree.dependent_leaves(&actuator.id)?;
                self.kill_walk(&dependents)
            }
            ActuatorRole::Status if value == 0 => {
                let dependents = tree.dependent_leaves(&actuator.id)?;
                self.off_walk(&dependents, counter)
            }
            ActuatorRole::Status if value == 1 => {
                let dependents = tree.dependent_leaves(&actuator.id)?;
                self.on_walk(&dependents, counter)
            }
            ActuatorRole::Relational => self.relational_walk(actuator, value, counter),
            ActuatorRole::Variable => self.variable_walk(actuator, value, counter),
            _ => {
                // Generic actuators, and status values outside {0, 1, kill},
                // commit without side effects.
                Ok(())
            }
        }
    }

    /// Propagate the non-recoverable kill code to every dependent leaf.
    fn kill_walk(&mut self, dependents: &[&DeviceNode]) -> Result<(), PropagationError> {
        for dep in dependents {
            let address = register_address(dep)?;
            match dep.kind {
                DeviceKind::Sensor => {
                    self.store
                        .write(Bank::HoldingRegister, address, &[KILL_CODE])?;
                }
                DeviceKind::Actuator => {
                    self.command(&dep.id, KILL_CODE);
                    self.store
                        .write(Bank::HoldingRegister, address, &[KILL_CODE])?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Put the subtree to sleep: sensors get the sleep band, actuators go
    /// to 0. Devices wake up unchanged once the on signal arrives.
    fn off_walk(&mut self, dependents: &[&DeviceNode], counter: u8) -> Result<(), PropagationError> {
        for dep in dependents {
            let address = register_address(dep)?;
            match dep.kind {
                DeviceKind::Sensor => {
                    let code = signals::with_counter(OFF_SENSOR_BASE, counter);
                    self.store.write(Bank::HoldingRegister, address, &[code])?;
                }
                DeviceKind::Actuator => {
                    self.command(&dep.id, 0);
                    self.store.write(Bank::HoldingRegister, address, &[0])?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Wake the subtree: sensors get the resume band, actuators their
    /// role-specific active value.
    fn on_walk(&mut self, dependents: &[&DeviceNode], counter: u8) -> Result<(), PropagationError> {
        for dep in dependents {
            let address = register_address(dep)?;
            match dep.kind {
                DeviceKind::Sensor => {
                    let code = signals::with_counter(ON_SENSOR_BASE, counter);
                    self.store.write(Bank::HoldingRegister, address, &[code])?;
                }
                DeviceKind::Actuator => {
                    let value = match dep.role {
                        ActuatorRole::Relational => 0,
                        ActuatorRole::Variable => 2,
                        _ => 1,
                    };
                    self.command(&dep.id, value);
                    self.store.write(Bank::HoldingRegister, address, &[value])?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Signal a relational actuator's sensor via the polarity-keyed table.
    fn relational_walk(
        &mut self,
        actuator: &DeviceNode,
        value: u16,
        counter: u8,
    ) -> Result<(), PropagationError> {
        let sensor = self.tree.related_sensor(actuator)?;
        let polarity = actuator
            .relationship
            .as_ref()
            .and_then(|(_, polarity)| *polarity)
            .unwrap_or(Polarity::Positive);
        let address = register_address(sensor)?;
        if let Some(base) = signals::relational_code(polarity, value) {
            let code = signals::with_counter(base, counter);
            self.store.write(Bank::HoldingRegister, address, &[code])?;
        } else {
            debug!(
                "Relational actuator `{}` value {:#06x} carries no signal",
                actuator.id, value
            );
        }
        Ok(())
    }

    /// Signal a variable actuator's sensor via the value-keyed table.
    fn variable_walk(
        &mut self,
        actuator: &DeviceNode,
        value: u16,
        counter: u8,
    ) -> Result<(), PropagationError> {
        let sensor = self.tree.related_sensor(actuator)?;
        let address = register_address(sensor)?;
        if let Some(base) = signals::variable_code(value) {
            let code = signals::with_counter(base, counter);
            self.store.write(Bank::HoldingRegister, address, &[code])?;
        } else {
            debug!(
                "Variable actuator `{}` value {:#06x} carries no signal",
                actuator.id, value
            );
        }
        Ok(())
    }

    /// Record a derived command against a dependent actuator.
    ///
    /// The commanded value is written to the register in the same pass, so
    /// the dependent converges (and is marked complete) on a later poll
    /// without triggering a propagation of its own.
    fn command(&mut self, id: &str, value: u16) {
        if let Some(state) = self.states.get_mut(id) {
            if state.value != value {
                state.value = value;
                state.complete = false;
            }
        }
    }

    /// Is the last command for `id` acknowledged? (Test and inspection hook.)
    pub fn is_complete(&self, id: &str) -> Option<bool> {
        self.states.get(id).map(|s| s.complete)
    }
}

fn register_address(node: &DeviceNode) -> Result<u16, TreeError> {
    node.register_address
        .ok_or_else(|| TreeError::MissingRegister(node.id.clone()))
}
