// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module provides functionality for running and managing the background
//! tasks of the SCADA simulator. It handles the lifecycle of:
//!
//! - One behavior task per configured register group
//! - The HMI-side dependency propagator
//! - The checkpoint manager
//! - The Modbus TCP front-end
//! - System health monitoring (heartbeat)
//!
//! ## Architecture
//!
//! The daemon uses Tokio's asynchronous runtime to manage concurrent tasks.
//! Each service runs as an independent task; coordination happens only
//! through the shared register datastore and a shared running flag that every
//! task observes at its sleep boundary.
//!
//! Startup is strict: the register datastore is restored from the last
//! checkpoint snapshot, and a missing or empty snapshot aborts the launch;
//! the simulator never synthesizes register state from the static layout.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_scadasim::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     // Create and launch daemon with all enabled services
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!
//!     // Wait for all tasks to complete
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::behavior;
use crate::checkpoint;
use crate::config::Config;
use crate::datastore::RegisterStore;
use crate::modbus::ScadaModbusServer;
use crate::propagation::{DeviceTree, Propagator};

/// Represents a daemon task manager that coordinates the simulator's
/// background services.
///
/// This structure maintains a collection of asynchronous tasks and provides
/// methods to start, stop, and monitor them.
///
/// # Fields
///
/// * `tasks` - Collection of handles to running tasks for management and cleanup
/// * `running` - Atomic flag shared between tasks to coordinate shutdown
/// * `store` - The shared register datastore, available once launched
///
/// # Thread Safety
///
/// The `running` flag is wrapped in an `Arc` to allow safe sharing between
/// tasks. Each task checks this flag at its sleep boundary to determine if it
/// should continue running or gracefully terminate.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    store: Option<Arc<RegisterStore>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// Initializes a new daemon manager with an empty task list and the
    /// running flag set to `true`.
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            store: None,
        }
    }

    /// Launch all configured tasks based on configuration
    ///
    /// Restores the register datastore from the last checkpoint snapshot and
    /// starts every configured service. Each service runs as a separate
    /// asynchronous task.
    ///
    /// # Parameters
    ///
    /// * `config` - Application configuration containing service settings
    ///
    /// # Errors
    ///
    /// This function can fail if:
    /// * The checkpoint snapshot is missing, empty or unreadable (strict
    ///   startup; exit and seed a snapshot first)
    /// * The device tree references an actuator register outside the store
    /// * The Modbus server fails to bind to the specified address/port
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        // Restore simulated state. The static datastore layout only carries
        // addresses; the values always come from the last snapshot.
        let image = checkpoint::load(&config.checkpoint.path)
            .context("Cannot restore register state from checkpoint")?;
        let store = Arc::new(RegisterStore::from_image(image));
        self.store = Some(store.clone());
        info!(
            "Register datastore restored from {}",
            config.checkpoint.path.display()
        );

        self.start_behavior_tasks(config, &store);
        self.start_propagator(config, &store)?;
        self.start_checkpoint_manager(config, &store);

        // Start modbus server if enabled
        if config.server.enabled {
            self.start_modbus_server(config, &store).await?;
        }

        // Start heartbeat task for monitoring
        self.start_heartbeat();

        Ok(())
    }

    /// Start one task per behavior descriptor.
    ///
    /// A task that hits a datastore error stops permanently and logs its
    /// terminal state; the rest of the simulation is unaffected.
    fn start_behavior_tasks(&mut self, config: &Config, store: &Arc<RegisterStore>) {
        info!(
            "Starting {} register behavior tasks",
            config.datastore.behaviors.len()
        );
        for descriptor in config.datastore.behaviors.iter().cloned() {
            let name = descriptor.kind.name();
            let address = descriptor.address;
            let store = store.clone();
            let running = self.running.clone();
            let task = tokio::spawn(async move {
                debug!("Behavior `{}` task started for address {}", name, address);
                let exit = behavior::run_behavior(descriptor, store, running).await;
                exit.log(name, address);
                Ok(())
            });
            self.tasks.push(task);
        }
    }

    /// Start the HMI-side dependency propagator.
    fn start_propagator(&mut self, config: &Config, store: &Arc<RegisterStore>) -> Result<()> {
        let tree = Arc::new(DeviceTree::from_config(&config.devices));
        let propagator = Propagator::new(store.clone(), tree)
            .context("Cannot initialize dependency propagator")?;
        let poll_interval = Duration::from_millis(config.propagation.poll_interval_ms);
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            propagator.run(poll_interval, running).await;
            Ok(())
        });
        self.tasks.push(task);
        Ok(())
    }

    /// Start the periodic checkpoint manager.
    fn start_checkpoint_manager(&mut self, config: &Config, store: &Arc<RegisterStore>) {
        let path = config.checkpoint.path.clone();
        let interval = Duration::from_secs(config.checkpoint.interval_secs);
        let store = store.clone();
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            checkpoint::run(store, path, interval, running).await;
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Launch the modbus server daemon
    ///
    /// Initializes and launches a Modbus TCP server that exposes the
    /// simulated registers to external systems. The server runs until the
    /// daemon's `running` flag is set to `false`.
    ///
    /// # Errors
    ///
    /// This function can fail if:
    /// * The socket address is invalid
    /// * The server fails to bind to the specified address/port
    async fn start_modbus_server(
        &mut self,
        config: &Config,
        store: &Arc<RegisterStore>,
    ) -> Result<()> {
        info!(
            "Starting modbus server on {}:{}",
            config.server.address, config.server.port
        );
        let socket_addr: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
            .parse()
            .context("Invalid modbus socket address")?;
        let listener = TcpListener::bind(socket_addr)
            .await
            .context("Cannot bind modbus listener")?;
        let running = self.running.clone();
        let store = store.clone();

        let task = tokio::spawn(async move {
            let server = Server::new(listener);
            let service = ScadaModbusServer::new(store);

            let on_connected = move |stream, socket_addr| {
                let service = service.clone();
                async move {
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(service.clone()))
                    })
                }
            };
            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            // Start the server in a separate task so the running flag stays
            // responsive.
            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                // Check every second if we should continue running
                time::sleep(Duration::from_secs(1)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => {
                    warn!("Modbus server shutdown timed out, forcing termination");
                }
            }

            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    ///
    /// The heartbeat task runs every 60 seconds and continues until the
    /// daemon's `running` flag is set to `false`. In a testbed deployment
    /// these messages give an external monitor a liveness signal.
    fn start_heartbeat(&mut self) {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!("Daemon heartbeat: running");
                time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Get the shared register datastore
    ///
    /// # Returns
    ///
    /// The datastore restored at launch, or `None` before `launch()` ran.
    pub fn get_store(&self) -> Option<Arc<RegisterStore>> {
        self.store.clone()
    }

    /// Stop all running tasks gracefully
    ///
    /// Signals all spawned tasks to terminate by setting the shared `running`
    /// flag to `false`. Each task checks this flag at its sleep boundary and
    /// performs a clean shutdown when the flag becomes `false`.
    ///
    /// This method only signals the tasks to stop; it does not wait for them
    /// to complete. To wait for all tasks to finish, call `join()` after this
    /// method.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        // Tasks should check the running flag and terminate gracefully
    }

    /// Wait for all tasks to complete
    ///
    /// Consumes the daemon and waits for all spawned tasks to finish
    /// execution. This method should be called after `shutdown()` to ensure a
    /// clean application exit.
    ///
    /// If any task panics, the error is logged but this method will still
    /// wait for all other tasks to complete.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(result) => {
                    if let Err(e) = result {
                        log::error!("Task panicked: {}", e);
                    }
                }
                Err(_) => {
                    // Task didn't complete within timeout
                    log::warn!("Task did not complete within timeout period, may be hung");
                }
            }
        }
        Ok(())
    }
}
