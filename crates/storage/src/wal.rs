// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn write-ahead-log store (spec §3 "Turn WAL record", §4.3).
//!
//! One append-only JSONL file per scope (`wal/<scope>.jsonl`). Each line is
//! a full [`WalRecord`] snapshot — a status transition re-appends the whole
//! record rather than a diff, so recovery only needs the last line seen per
//! `wal_id`. Writes are buffered and flushed in ~10ms group-commit batches,
//! mirroring the durability window used elsewhere in this daemon.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use gwd_core::turn::{WalRecord, WalStatus};
use gwd_core::ids::WalId;

use crate::atomic::rotate_bak_path;

const FLUSH_INTERVAL: Duration = Duration::from_millis(10);
const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid WAL transition: {from:?} -> {to:?}")]
    InvalidTransition { from: WalStatus, to: WalStatus },
    #[error("no such WAL record: {0}")]
    NotFound(String),
}

/// A single scope's append-only turn log, plus the in-memory index rebuilt
/// from it on open.
struct ScopeWal {
    file: File,
    path: PathBuf,
    records: HashMap<String, WalRecord>,
    write_buffer: Vec<Vec<u8>>,
    last_flush: Instant,
}

impl ScopeWal {
    fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (records, corrupt) = Self::replay(&file)?;

        if corrupt {
            let bak_path = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                recovered = records.len(),
                "corrupt turn WAL tail, quarantining and rewriting clean file",
            );
            drop(file);
            fs::rename(path, &bak_path)?;

            {
                let mut clean = File::create(path)?;
                for record in records.values() {
                    let mut line = serde_json::to_vec(record)?;
                    line.push(b'\n');
                    clean.write_all(&line)?;
                }
                clean.sync_all()?;
            }

            file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
        }

        Ok(Self {
            file,
            path: path.to_owned(),
            records,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// Replay every line, keeping the last record seen per `wal_id`. Returns
    /// `corrupt = true` if a line failed to parse (the rest of the file is
    /// still replayed up to that point, matching a truncated-write crash).
    fn replay(file: &File) -> Result<(HashMap<String, WalRecord>, bool), WalError> {
        let reader = BufReader::new(file.try_clone()?);
        let mut records = HashMap::new();
        let mut corrupt = false;

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    corrupt = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<WalRecord>(trimmed) {
                Ok(record) => {
                    records.insert(record.wal_id.as_str().to_string(), record);
                }
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        Ok((records, corrupt))
    }

    fn buffer_write(&mut self, record: &WalRecord) -> Result<(), WalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.write_buffer.push(line);
        self.records
            .insert(record.wal_id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    fn flush(&mut self) -> Result<(), WalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        for line in self.write_buffer.drain(..) {
            self.file.write_all(&line)?;
        }
        self.file.sync_all()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Rewrite the file keeping only records that are non-terminal or whose
    /// `updated_at_ms` is at or after `retain_terminal_since_ms`.
    fn compact(&mut self, retain_terminal_since_ms: i64) -> Result<(), WalError> {
        self.flush()?;

        let kept: Vec<&WalRecord> = self
            .records
            .values()
            .filter(|r| !r.status.is_terminal() || r.updated_at_ms >= retain_terminal_since_ms)
            .collect();

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp_file = File::create(&tmp_path)?;
            for record in &kept {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                tmp_file.write_all(&line)?;
            }
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.records.retain(|_, r| !r.status.is_terminal() || r.updated_at_ms >= retain_terminal_since_ms);
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }
}

/// Turn WAL store spanning every scope (spec §4.3.1). Scopes are opened
/// lazily and kept resident for the life of the process.
pub struct TurnWalStore {
    root: PathBuf,
    scopes: HashMap<String, ScopeWal>,
}

impl TurnWalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scopes: HashMap::new(),
        }
    }

    fn scope_path(&self, scope: &str) -> PathBuf {
        let file_name = scope.replace(['/', '\\'], "_");
        self.root.join(format!("{file_name}.jsonl"))
    }

    fn scope_mut(&mut self, scope: &str) -> Result<&mut ScopeWal, WalError> {
        if !self.scopes.contains_key(scope) {
            let path = self.scope_path(scope);
            let wal = ScopeWal::open(&path)?;
            self.scopes.insert(scope.to_string(), wal);
        }
        Ok(self.scopes.get_mut(scope).expect("just inserted"))
    }

    /// Append a fresh record in `Pending` status. If `dedupe_key` collides
    /// with a non-terminal record already in the scope, that existing record
    /// is returned unchanged instead of creating a duplicate (spec §4.3.1
    /// dedupe semantics).
    pub fn append_pending(&mut self, record: WalRecord) -> Result<WalRecord, WalError> {
        let scope = record.scope.clone();
        let dedupe_key = record.dedupe_key.clone();
        let wal = self.scope_mut(&scope)?;

        if let Some(key) = dedupe_key.as_deref() {
            if let Some(existing) = wal
                .records
                .values()
                .find(|r| !r.status.is_terminal() && r.dedupe_key.as_deref() == Some(key))
            {
                return Ok(existing.clone());
            }
        }

        wal.buffer_write(&record)?;
        Ok(record)
    }

    fn transition(
        &mut self,
        scope: &str,
        wal_id: &WalId,
        next: WalStatus,
        now_ms: i64,
        error: Option<String>,
    ) -> Result<WalRecord, WalError> {
        let wal = self.scope_mut(scope)?;
        let mut record = wal
            .records
            .get(wal_id.as_str())
            .cloned()
            .ok_or_else(|| WalError::NotFound(wal_id.as_str().to_string()))?;

        if !record.status.can_transition_to(next) {
            return Err(WalError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        record.updated_at_ms = now_ms;
        if error.is_some() {
            record.error = error;
        }
        wal.buffer_write(&record)?;
        Ok(record)
    }

    pub fn mark_inflight(
        &mut self,
        scope: &str,
        wal_id: &WalId,
        now_ms: i64,
    ) -> Result<WalRecord, WalError> {
        self.transition(scope, wal_id, WalStatus::Inflight, now_ms, None)
    }

    pub fn mark_done(
        &mut self,
        scope: &str,
        wal_id: &WalId,
        now_ms: i64,
    ) -> Result<WalRecord, WalError> {
        self.transition(scope, wal_id, WalStatus::Done, now_ms, None)
    }

    pub fn mark_failed(
        &mut self,
        scope: &str,
        wal_id: &WalId,
        now_ms: i64,
        error: String,
    ) -> Result<WalRecord, WalError> {
        self.transition(scope, wal_id, WalStatus::Failed, now_ms, Some(error))
    }

    pub fn mark_expired(
        &mut self,
        scope: &str,
        wal_id: &WalId,
        now_ms: i64,
    ) -> Result<WalRecord, WalError> {
        self.transition(scope, wal_id, WalStatus::Expired, now_ms, None)
    }

    /// All `Pending` records in a scope, used for crash recovery (§4.3.2) and
    /// TTL sweeps.
    pub fn list_pending(&self, scope: &str) -> Vec<WalRecord> {
        match self.scopes.get(scope) {
            Some(wal) => wal
                .records
                .values()
                .filter(|r| r.status == WalStatus::Pending)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// All non-terminal records across every resident scope, for recovery on
    /// startup after all scopes relevant to a session have been opened.
    pub fn list_inflight(&self, scope: &str) -> Vec<WalRecord> {
        match self.scopes.get(scope) {
            Some(wal) => wal
                .records
                .values()
                .filter(|r| r.status == WalStatus::Inflight)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn needs_flush(&self) -> bool {
        self.scopes.values().any(ScopeWal::needs_flush)
    }

    pub fn flush_all(&mut self) -> Result<(), WalError> {
        for wal in self.scopes.values_mut() {
            wal.flush()?;
        }
        Ok(())
    }

    pub fn compact(&mut self, scope: &str, retain_terminal_since_ms: i64) -> Result<(), WalError> {
        self.scope_mut(scope)?.compact(retain_terminal_since_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::ids::{SessionId, TurnId};
    use gwd_core::turn::{TurnEnvelope, TurnSource};
    use std::collections::HashMap as Map;
    use tempfile::tempdir;

    fn sample(wal_id: &str, scope: &str, dedupe_key: Option<&str>) -> WalRecord {
        WalRecord {
            wal_id: WalId::new(wal_id),
            scope: scope.to_string(),
            turn_envelope: TurnEnvelope {
                session_id: SessionId::new("s1"),
                turn_id: TurnId::new("t1"),
                channel: None,
                conversation_id: None,
                parts: vec!["hi".to_string()],
                meta: Map::new(),
                timestamp_ms: 0,
            },
            source: TurnSource::Gateway,
            status: WalStatus::Pending,
            created_at_ms: 0,
            updated_at_ms: 0,
            ttl_ms: None,
            dedupe_key: dedupe_key.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn append_then_flush_persists_and_reopen_recovers() {
        let dir = tempdir().expect("tempdir");
        let mut store = TurnWalStore::new(dir.path());
        store
            .append_pending(sample("w1", "gateway", None))
            .expect("append");
        store.flush_all().expect("flush");

        let mut reopened = TurnWalStore::new(dir.path());
        assert_eq!(reopened.list_pending("gateway").len(), 1);
        reopened
            .mark_inflight("gateway", &WalId::new("w1"), 10)
            .expect("inflight");
        assert_eq!(reopened.list_inflight("gateway").len(), 1);
    }

    #[test]
    fn dedupe_key_collision_returns_existing_record() {
        let dir = tempdir().expect("tempdir");
        let mut store = TurnWalStore::new(dir.path());
        let first = store
            .append_pending(sample("w1", "gateway", Some("dk")))
            .expect("append");
        let second = store
            .append_pending(sample("w2", "gateway", Some("dk")))
            .expect("append");
        assert_eq!(first.wal_id, second.wal_id);
        assert_eq!(store.list_pending("gateway").len(), 1);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut store = TurnWalStore::new(dir.path());
        store
            .append_pending(sample("w1", "gateway", None))
            .expect("append");
        store
            .mark_done("gateway", &WalId::new("w1"), 5)
            .expect_err("pending -> done is not a valid edge");
    }

    #[test]
    fn compact_drops_old_terminal_records() {
        let dir = tempdir().expect("tempdir");
        let mut store = TurnWalStore::new(dir.path());
        store
            .append_pending(sample("w1", "gateway", None))
            .expect("append");
        store
            .mark_inflight("gateway", &WalId::new("w1"), 1)
            .expect("inflight");
        store
            .mark_done("gateway", &WalId::new("w1"), 2)
            .expect("done");
        store.compact("gateway", 100).expect("compact");
        assert!(store.list_pending("gateway").is_empty());
        assert!(store.list_inflight("gateway").is_empty());
    }
}
