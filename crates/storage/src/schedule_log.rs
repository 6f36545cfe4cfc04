// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only schedule-intent event log (spec §4.5.1). Pure event sourcing:
//! the log is the only writable surface, and `ScheduleIntent` state is a
//! projection computed by replaying it (see `gwd-scheduler::projection`).

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use gwd_core::intent::ScheduleEvent;

use crate::atomic::rotate_bak_path;

#[derive(Debug, Error)]
pub enum ScheduleLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSONL append log of [`ScheduleEvent`]s, with a monotonic sequence counter
/// assigned at append time (the tie-breaker for same-millisecond events,
/// spec §9 Open Questions).
pub struct ScheduleLog {
    file: File,
    path: PathBuf,
    next_seq: u64,
}

impl ScheduleLog {
    pub fn open(path: &Path) -> Result<Self, ScheduleLogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (max_seq, corrupt, valid_lines) = Self::scan(&file)?;

        if corrupt {
            let bak_path = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                valid_entries = valid_lines.len(),
                "corrupt schedule event log tail, quarantining and rewriting clean file",
            );
            drop(file);
            fs::rename(path, &bak_path)?;

            {
                let mut clean = File::create(path)?;
                for line in &valid_lines {
                    clean.write_all(line.as_bytes())?;
                    clean.write_all(b"\n")?;
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
            next_seq: max_seq + 1,
        })
    }

    fn scan(file: &File) -> Result<(u64, bool, Vec<String>), ScheduleLogError> {
        let reader = BufReader::new(file.try_clone()?);
        let mut max_seq = 0u64;
        let mut corrupt = false;
        let mut valid_lines = Vec::new();

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
            match serde_json::from_str::<ScheduleEvent>(trimmed) {
                Ok(event) => {
                    max_seq = max_seq.max(event.seq);
                    valid_lines.push(trimmed.to_string());
                }
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        Ok((max_seq, corrupt, valid_lines))
    }

    /// Append `event` with its `seq` assigned from this log's counter,
    /// ignoring whatever `seq` the caller set. Flushes immediately — schedule
    /// events are low-volume compared to turn WAL traffic, so group commit
    /// buys little here.
    pub fn append(&mut self, mut event: ScheduleEvent) -> Result<ScheduleEvent, ScheduleLogError> {
        event.seq = self.next_seq;
        self.next_seq += 1;

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        Ok(event)
    }

    /// Replay every event in the log, in append order.
    pub fn replay_all(&self) -> Result<Vec<ScheduleEvent>, ScheduleLogError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            events.push(serde_json::from_str(trimmed)?);
        }
        events.sort_by_key(|e: &ScheduleEvent| e.seq);
        Ok(events)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::ids::{IntentId, SessionId};
    use gwd_core::intent::{ContinuityMode, ConvergenceCondition, IntentSchedule, ScheduleEventKind};
    use tempfile::tempdir;

    fn created_event() -> ScheduleEvent {
        ScheduleEvent {
            seq: 0,
            intent_id: IntentId::new("i1"),
            parent_session_id: SessionId::new("s1"),
            ts_ms: 0,
            kind: ScheduleEventKind::IntentCreated {
                reason: "demo".to_string(),
                continuity_mode: ContinuityMode::Fresh,
                schedule: IntentSchedule::RunAt { run_at_ms: 1_000 },
                max_runs: None,
                convergence_condition: ConvergenceCondition::None,
            },
        }
    }

    #[test]
    fn append_assigns_increasing_sequence_numbers() {
        let dir = tempdir().expect("tempdir");
        let mut log = ScheduleLog::open(&dir.path().join("events.jsonl")).expect("open");
        let first = log.append(created_event()).expect("append");
        let second = log.append(created_event()).expect("append");
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[test]
    fn reopen_resumes_sequence_counter_and_replays() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        {
            let mut log = ScheduleLog::open(&path).expect("open");
            log.append(created_event()).expect("append");
            log.append(created_event()).expect("append");
        }
        let log = ScheduleLog::open(&path).expect("reopen");
        assert_eq!(log.next_seq(), 3);
        assert_eq!(log.replay_all().expect("replay").len(), 2);
    }
}
