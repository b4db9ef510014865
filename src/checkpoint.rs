// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Durable checkpoint of the last fully synced block height.
//!
//! A single `u64` round-tripped as decimal text. The value may lag behind
//! true sync progress (writes happen once per claim cycle and a failed
//! write is retried with an equal-or-greater value next cycle) but it must
//! never run ahead of it.

use crate::error::{AutoclaimError, AutoclaimResult};
use std::path::PathBuf;

pub trait CheckpointStore: Send + Sync + 'static {
    /// Returns `Ok(None)` when no checkpoint has ever been written.
    fn read(&self) -> AutoclaimResult<Option<u64>>;
    fn write(&self, height: u64) -> AutoclaimResult<()>;
}

/// File-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> AutoclaimResult<Option<u64>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AutoclaimError::Checkpoint(format!(
                    "can't read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let height = content.trim().parse::<u64>().map_err(|e| {
            AutoclaimError::Checkpoint(format!(
                "can't parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(height))
    }

    fn write(&self, height: u64) -> AutoclaimResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AutoclaimError::Checkpoint(format!(
                    "can't create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        std::fs::write(&self.path, height.to_string()).map_err(|e| {
            AutoclaimError::Checkpoint(format!(
                "can't write {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
