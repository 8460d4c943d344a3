// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Real-world integration test for the simulator daemon
//!
//! This test seeds a checkpoint, launches a full daemon instance with the
//! Modbus TCP front-end enabled, and drives it like an operator tool would:
//! reading live behavior-driven registers, flipping a status actuator and
//! watching the dependency propagation land in dependent registers.

use anyhow::Result;
use rust_scadasim::{
    checkpoint, config::Config, daemon::launch_daemon::Daemon, datastore::DatastoreImage,
};
use std::time::Duration;
use tokio::time::sleep;
use tokio_modbus::client::{tcp::connect, Reader, Writer};

const CONFIG_TEMPLATE: &str = r#"
server:
  enabled: true
  address: 127.0.0.1
  port: 15502

checkpoint:
  path: __CHECKPOINT__
  interval_secs: 1

propagation:
  poll_interval_ms: 100

datastore:
  di: { start_addr: 1, values: [0, 0] }
  co: { start_addr: 1, values: [1, 0] }
  hr: { start_addr: 1, values: [50, 0, 0, 0, 1, 0, 0, 0, 0, 0] }
  ir: { start_addr: 1, values: [0, 0] }
  behaviors:
    - type: linear
      address: 1
      count: 1
      period_secs: 1
      variance: 2

devices:
  - id: dev-plant
    kind: controller
    children:
      - { id: act-plant-status, kind: actuator, register_address: 5, role: status }
      - { id: sen-line-pressure, kind: sensor, register_address: 6 }
      - id: act-feed-valve
        kind: actuator
        register_address: 7
        role: relational
        relationship: { sensor_id: sen-line-pressure, polarity: negative }
"#;

/// Integration test that starts a real daemon with Modbus enabled and checks
/// the live register plumbing end to end.
#[tokio::test]
async fn test_real_world_modbus_server() -> Result<()> {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("checkpoint.yaml");
    let yaml = CONFIG_TEMPLATE.replace("__CHECKPOINT__", &checkpoint_path.display().to_string());
    let config: Config = serde_yml::from_str(&yaml)?;
    config.validate()?;

    // Seed simulated state from the static layout, as the master tooling
    // does on first deployment.
    let layout = DatastoreImage {
        di: config.datastore.di.clone(),
        co: config.datastore.co.clone(),
        hr: config.datastore.hr.clone(),
        ir: config.datastore.ir.clone(),
    };
    assert!(checkpoint::seed(&checkpoint_path, layout)?);

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    // Give the behavior engine a few ticks and the server time to come up.
    sleep(Duration::from_millis(2500)).await;

    let socket_addr: std::net::SocketAddr = "127.0.0.1:15502".parse()?;
    let mut ctx = connect(socket_addr).await?;

    // The linear behavior must have moved register 1 off its seeded value.
    let values = ctx
        .read_holding_registers(1, 1)
        .await?
        .expect("no modbus exception");
    assert!(
        values[0] > 50 && values[0] <= 50 + 2 * 6,
        "linear register should have ticked a few times: {}",
        values[0]
    );

    // Coil bank is reachable and holds the seeded state.
    let coils = ctx.read_coils(1, 2).await?.expect("no modbus exception");
    assert_eq!(coils, vec![true, false]);

    // Flip the plant status actuator off and wait for the propagator.
    ctx.write_single_register(5, 0)
        .await?
        .expect("no modbus exception");
    sleep(Duration::from_millis(500)).await;

    let sensor = ctx
        .read_holding_registers(6, 1)
        .await?
        .expect("no modbus exception");
    assert_eq!(
        sensor[0] & 0xFF00,
        0xF700,
        "dependent sensor should carry the sleep band: {:#06x}",
        sensor[0]
    );
    let valve = ctx
        .read_holding_registers(7, 1)
        .await?
        .expect("no modbus exception");
    assert_eq!(valve[0], 0, "dependent actuator should be forced off");

    // Out-of-range windows surface as Modbus exceptions, not crashes.
    let exception = ctx.read_holding_registers(11, 2).await?;
    assert!(exception.is_err());

    daemon.shutdown();
    daemon.join().await?;

    // The shutdown checkpoint must hold the live state, not the seed.
    let restored = checkpoint::load(&checkpoint_path)?;
    assert!(restored.hr.values[0] > 50);
    assert_eq!(restored.hr.values[4], 0, "status actuator persisted as off");

    Ok(())
}

/// Launching without a seeded checkpoint is a hard startup failure: no task
/// starts and no register store is initialized.
#[tokio::test]
async fn test_missing_checkpoint_aborts_launch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("never-seeded.yaml");
    let yaml = CONFIG_TEMPLATE
        .replace("__CHECKPOINT__", &checkpoint_path.display().to_string())
        .replace("enabled: true", "enabled: false");
    let config: Config = serde_yml::from_str(&yaml)?;

    let mut daemon = Daemon::new();
    let result = daemon.launch(&config).await;
    assert!(result.is_err(), "launch must refuse to synthesize state");
    assert!(daemon.get_store().is_none());

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
