// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID record store (spec §3 "PID record"). Pairs a JSON record (pid, host,
//! port, started_at, cwd) with an `fs2` advisory lock on a sibling `.lock`
//! file: holding the lock is what proves "this pid is still alive", so a
//! fresh start can tell a genuinely running daemon from a stale record left
//! behind by a crash.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use gwd_core::PidRecord;

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("another gateway process already holds the PID record (pid {0})")]
    AlreadyRunning(u32),
}

/// Holds the advisory lock for the lifetime of the daemon process. Dropping
/// it releases the lock; callers should keep it alive in `main`.
pub struct PidLock {
    _file: File,
    record_path: PathBuf,
}

impl PidLock {
    /// Acquire the lock and persist `record`. Fails with
    /// [`PidFileError::AlreadyRunning`] if a live process holds it; a stale
    /// lock (owner process is gone) is acquired transparently.
    pub fn acquire(lock_path: &Path, record_path: &Path, record: &PidRecord) -> Result<Self, PidFileError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        lock_file.try_lock_exclusive().map_err(|_| {
            let stale_pid = fs::read_to_string(record_path)
                .ok()
                .and_then(|s| serde_json::from_str::<PidRecord>(&s).ok())
                .map(|r| r.pid)
                .unwrap_or(0);
            PidFileError::AlreadyRunning(stale_pid)
        })?;

        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", record.pid)?;

        crate::atomic::save_json(record_path, record)?;

        Ok(Self {
            _file: lock_file,
            record_path: record_path.to_owned(),
        })
    }

    /// Remove the persisted record. Called during graceful shutdown; the
    /// lock itself is released implicitly on drop.
    pub fn release(self) {
        let _ = fs::remove_file(&self.record_path);
    }
}

/// Load the persisted record without taking the lock, for read-only callers
/// like `status`/`stop` in the CLI.
pub fn load_record(record_path: &Path) -> Result<Option<PidRecord>, PidFileError> {
    Ok(crate::atomic::load_json(record_path)?)
}

impl From<crate::atomic::AtomicFileError> for PidFileError {
    fn from(e: crate::atomic::AtomicFileError) -> Self {
        match e {
            crate::atomic::AtomicFileError::Io(e) => PidFileError::Io(e),
            crate::atomic::AtomicFileError::Json(e) => PidFileError::Json(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(pid: u32) -> PidRecord {
        PidRecord {
            pid,
            host: "127.0.0.1".to_string(),
            port: 9000,
            started_at_ms: 0,
            cwd: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn acquire_persists_record_and_releases_on_drop() {
        let dir = tempdir().expect("tempdir");
        let lock_path = dir.path().join("gateway.lock");
        let record_path = dir.path().join("gateway.pid.json");

        let lock = PidLock::acquire(&lock_path, &record_path, &sample_record(123)).expect("acquire");
        assert_eq!(
            load_record(&record_path).expect("load").map(|r| r.pid),
            Some(123)
        );
        lock.release();
        assert!(load_record(&record_path).expect("load").is_none());
    }

    #[test]
    fn second_acquire_on_a_live_lock_fails() {
        let dir = tempdir().expect("tempdir");
        let lock_path = dir.path().join("gateway.lock");
        let record_path = dir.path().join("gateway.pid.json");

        let _first = PidLock::acquire(&lock_path, &record_path, &sample_record(1)).expect("first");
        let second = PidLock::acquire(&lock_path, &record_path, &sample_record(2));
        assert!(matches!(second, Err(PidFileError::AlreadyRunning(1))));
    }

    #[test]
    fn stale_lock_is_reclaimed_after_owner_drops_it() {
        let dir = tempdir().expect("tempdir");
        let lock_path = dir.path().join("gateway.lock");
        let record_path = dir.path().join("gateway.pid.json");

        let first = PidLock::acquire(&lock_path, &record_path, &sample_record(1)).expect("first");
        drop(first);

        let second = PidLock::acquire(&lock_path, &record_path, &sample_record(2)).expect("second");
        assert_eq!(
            load_record(&record_path).expect("load").map(|r| r.pid),
            Some(2)
        );
        second.release();
    }
}
