// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session supervisor registry persistence (spec §4.2.5). The registry is a
//! flat snapshot of live worker processes, rewritten atomically on every
//! open/stop/crash so a crashed supervisor can find and reap orphans on its
//! next startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use gwd_core::ids::SessionId;

use crate::atomic::{load_json, save_json, AtomicFileError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub session_id: SessionId,
    pub pid: u32,
    pub started_at_ms: i64,
}

pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the snapshot left by the previous process, or an empty registry
    /// if none exists yet.
    pub fn load(&self) -> Result<Vec<RegistryEntry>, AtomicFileError> {
        Ok(load_json::<Vec<RegistryEntry>>(&self.path)?.unwrap_or_default())
    }

    /// Overwrite the registry with the current live set.
    pub fn save(&self, entries: &[RegistryEntry]) -> Result<(), AtomicFileError> {
        save_json(&self.path, &entries.to_vec())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_registry_loads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let registry = Registry::new(dir.path().join("children.json"));
        assert!(registry.load().expect("load").is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let registry = Registry::new(dir.path().join("children.json"));
        let entries = vec![RegistryEntry {
            session_id: SessionId::new("s1"),
            pid: 42,
            started_at_ms: 100,
        }];
        registry.save(&entries).expect("save");
        assert_eq!(registry.load().expect("load"), entries);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempdir().expect("tempdir");
        let registry = Registry::new(dir.path().join("children.json"));
        registry
            .save(&[RegistryEntry {
                session_id: SessionId::new("s1"),
                pid: 1,
                started_at_ms: 0,
            }])
            .expect("save");
        registry.save(&[]).expect("save empty");
        assert!(registry.load().expect("load").is_empty());
    }
}
