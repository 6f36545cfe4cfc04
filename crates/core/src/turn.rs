// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn write-ahead-log record types (spec §3 "Turn WAL record", §4.3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{SessionId, TurnId, WalId};

/// Where a turn originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSource {
    Gateway,
    Heartbeat,
    Channel,
}

/// Non-terminal/terminal status of a WAL record. Transitions form the DAG in
/// §3: `pending -> {inflight, failed, expired}`, `inflight -> {done, failed,
/// expired}`. `done`/`failed`/`expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalStatus {
    Pending,
    Inflight,
    Done,
    Failed,
    Expired,
}

impl WalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WalStatus::Done | WalStatus::Failed | WalStatus::Expired)
    }

    /// Whether `self -> next` is an edge of the transition DAG.
    pub fn can_transition_to(self, next: WalStatus) -> bool {
        use WalStatus::*;
        matches!(
            (self, next),
            (Pending, Inflight) | (Pending, Failed) | (Pending, Expired)
                | (Inflight, Done) | (Inflight, Failed) | (Inflight, Expired)
        )
    }
}

/// The prompt envelope carried by a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEnvelope {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub parts: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    pub timestamp_ms: i64,
}

impl TurnEnvelope {
    /// Concatenated prompt text, as used by WAL recovery handlers (§4.3.2).
    pub fn prompt_text(&self) -> String {
        self.parts.join("")
    }
}

/// A single turn WAL record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub wal_id: WalId,
    pub scope: String,
    pub turn_envelope: TurnEnvelope,
    pub source: TurnSource,
    pub status: WalStatus,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WalRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms.saturating_sub(self.created_at_ms) >= ttl as i64,
            None => false,
        }
    }
}
