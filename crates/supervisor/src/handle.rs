// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory handle the supervisor keeps per live session (spec §3
//! "Session worker handle").

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::actor::{SessionActivity, SessionCommand};
use crate::admission::Reservation;

pub struct SessionHandle {
    pub pid: u32,
    pub started_at_ms: i64,
    pub agent_session_id: Option<String>,
    pub command_tx: mpsc::Sender<SessionCommand>,
    pub activity: Arc<SessionActivity>,
    pub task: JoinHandle<String>,
    /// Held for the session's lifetime; dropping it releases the worker
    /// slot back to the admission pool.
    pub reservation: Reservation,
}

impl SessionHandle {
    pub fn is_idle(&self, now_ms: i64, idle_ttl_ms: i64) -> bool {
        let last_activity = self
            .activity
            .last_activity_at_ms
            .load(std::sync::atomic::Ordering::Relaxed);
        now_ms.saturating_sub(last_activity) >= idle_ttl_ms
    }
}
