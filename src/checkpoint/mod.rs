// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Checkpoint manager
//!
//! The checkpoint file is the only durable record of simulated register
//! state across restarts. At startup the last snapshot *replaces* the static
//! configuration layout (which only describes addresses, never current
//! values); a missing or empty snapshot is a fatal startup condition, and the
//! simulator refuses to guess state. At runtime a periodic task persists all
//! four banks as one atomic snapshot, written to a temporary file in the
//! target directory and renamed into place so an interrupted write never
//! leaves a torn file behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::time;

use crate::datastore::{DatastoreImage, RegisterStore};

/// Errors raised while loading or persisting checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No snapshot file at the configured path (fatal at startup)
    #[error("checkpoint file {0} does not exist - seed one with --seed-checkpoint")]
    Missing(PathBuf),

    /// The snapshot file exists but holds nothing (fatal at startup)
    #[error("checkpoint file {0} is empty")]
    Empty(PathBuf),

    /// The snapshot file could not be parsed
    #[error("checkpoint file {path} is not a valid snapshot: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    /// Filesystem failure while reading or writing a snapshot
    #[error("checkpoint I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The on-disk snapshot document: the four banks plus a write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDocument {
    /// When this snapshot was persisted
    pub saved_at: DateTime<Utc>,
    /// The four register banks with their base addresses
    pub datastore: DatastoreImage,
}

/// Load the last snapshot, the register store's authoritative initial state.
pub fn load<P: AsRef<Path>>(path: P) -> Result<DatastoreImage, CheckpointError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CheckpointError::Missing(path.to_path_buf()),
        _ => CheckpointError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;
    if metadata.len() == 0 {
        return Err(CheckpointError::Empty(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|err| CheckpointError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    let document: CheckpointDocument =
        serde_yml::from_str(&contents).map_err(|err| CheckpointError::Parse {
            path: path.to_path_buf(),
            source: err,
        })?;
    Ok(document.datastore)
}

/// Persist one snapshot atomically (write-to-temp-then-rename).
pub fn persist<P: AsRef<Path>>(path: P, image: DatastoreImage) -> Result<(), CheckpointError> {
    let path = path.as_ref();
    let document = CheckpointDocument {
        saved_at: Utc::now(),
        datastore: image,
    };
    let serialized = serde_yml::to_string(&document).map_err(|err| CheckpointError::Parse {
        path: path.to_path_buf(),
        source: err,
    })?;

    // The temporary file must live in the target directory: rename is only
    // atomic within one filesystem.
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| CheckpointError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    tmp.write_all(serialized.as_bytes())
        .map_err(|err| CheckpointError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
    tmp.persist(path).map_err(|err| CheckpointError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Seed an initial snapshot from the static configuration layout.
///
/// Only writes when the file is missing or empty, so an existing simulation
/// state is never clobbered. Returns `true` if a snapshot was written.
pub fn seed<P: AsRef<Path>>(path: P, layout: DatastoreImage) -> Result<bool, CheckpointError> {
    let path = path.as_ref();
    match fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => {
            info!(
                "Checkpoint {} already holds state, leaving it untouched",
                path.display()
            );
            Ok(false)
        }
        Ok(_) => {
            persist(path, layout)?;
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            persist(path, layout)?;
            Ok(true)
        }
        Err(err) => Err(CheckpointError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// The periodic checkpoint task.
///
/// A failed write is logged and retried on the next interval; the rest of
/// the simulation keeps running and the only loss is the missed snapshot.
pub async fn run(
    store: Arc<RegisterStore>,
    path: PathBuf,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    info!(
        "Checkpoint manager persisting to {} every {:?}",
        path.display(),
        interval
    );
    while running.load(Ordering::SeqCst) {
        time::sleep(interval).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match persist(&path, store.image()) {
            Ok(()) => debug!("Checkpoint written to {}", path.display()),
            Err(err) => error!("Checkpoint write failed: {}", err),
        }
    }
    // One final snapshot on the way out so a clean shutdown loses nothing.
    if let Err(err) = persist(&path, store.image()) {
        error!("Final checkpoint write failed: {}", err);
    }
    info!("Checkpoint manager stopped");
}
