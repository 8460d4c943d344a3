// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the SCADA testbed simulator

use anyhow::Result;
use clap::Parser;
use log::info;

use std::path::PathBuf;
use tokio::signal;

use rust_scadasim::checkpoint;
use rust_scadasim::config::Config;
use rust_scadasim::daemon::launch_daemon::Daemon;
use rust_scadasim::datastore::DatastoreImage;

/// Industrial control network simulator for security testbeds
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Seed the checkpoint file from the static datastore layout and exit.
    /// Existing non-empty checkpoints are left untouched.
    #[arg(long, default_value_t = false)]
    seed_checkpoint: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&args.config)?;

    // Seed an initial checkpoint from the static layout if requested
    if args.seed_checkpoint {
        let layout = DatastoreImage {
            di: config.datastore.di.clone(),
            co: config.datastore.co.clone(),
            hr: config.datastore.hr.clone(),
            ir: config.datastore.ir.clone(),
        };
        let written = checkpoint::seed(&config.checkpoint.path, layout)?;
        if written {
            println!("Checkpoint seeded at {}", config.checkpoint.path.display());
        } else {
            println!(
                "Checkpoint {} already present, nothing to do",
                config.checkpoint.path.display()
            );
        }
        return Ok(());
    }

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();

    // Launch all configured tasks; a missing or empty checkpoint aborts here
    // with a non-zero exit code.
    daemon.launch(&config).await?;

    // Wait for termination signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, terminating daemon");
            daemon.shutdown();
            daemon.join().await?;
        }
        Err(err) => {
            eprintln!("Error waiting for shutdown signal: {}", err);
        }
    }

    Ok(())
}
