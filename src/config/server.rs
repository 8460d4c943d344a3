// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structure for configuring the Modbus TCP front-end
//! that exposes the register datastore to external clients.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP front-end.
///
/// # Example
///
/// ```
/// use rust_scadasim::config::ServerConfig;
///
/// let server_config = ServerConfig {
///     enabled: true,
///     port: 5020,
///     address: "0.0.0.0".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Flag to enable or disable the Modbus server.
    ///
    /// When disabled the datastore is still driven by the behavior engine and
    /// propagator, but nothing is reachable over the network.
    pub enabled: bool,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Default is 5020; the standard Modbus port 502 needs elevated
    /// privileges on most systems.
    pub port: u16,

    /// The network address the Modbus server will bind to.
    ///
    /// Default is "127.0.0.1". Use "0.0.0.0" to bind to all IPv4 interfaces.
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,                   // Disabled by default for safety
            port: 5020,                       // Unprivileged Modbus TCP port
            address: "127.0.0.1".to_string(), // Localhost for security
        }
    }
}
