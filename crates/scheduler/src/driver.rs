// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler's only dependency on the session supervisor: two narrow
//! callback traits instead of a direct crate dependency, so `gwd-scheduler`
//! never needs to know how a session is actually opened or driven (spec §9
//! "Cyclic references" — the same unidirectional-ownership shape the
//! gateway uses for the supervisor's event callback, applied one layer
//! further out).

use async_trait::async_trait;

use gwd_core::ids::SessionId;
use gwd_core::intent::ScheduleIntent;

/// What a heartbeat or intent firing needs from the session supervisor.
/// The gateway binary implements this over its live `Supervisor` handle;
/// tests implement it over an in-memory fake.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Idempotently ensure `session_id` has a live worker.
    async fn open_session(&self, session_id: &SessionId) -> Result<(), String>;

    /// Send a prompt and, when `wait_for_completion` is set, await the
    /// turn's result before returning.
    async fn send_prompt(
        &self,
        session_id: &SessionId,
        prompt: &str,
        wait_for_completion: bool,
    ) -> Result<(), String>;

    /// Close a session (used for heartbeat cleanup-candidate sessions,
    /// spec §4.4.1).
    async fn stop_session(&self, session_id: &SessionId, reason: &str) -> Result<(), String>;
}

/// Outcome of executing a due schedule intent (spec §4.5.4).
#[derive(Debug, Clone)]
pub enum IntentExecutionOutcome {
    Ok {
        evaluation_session_id: Option<SessionId>,
    },
    Err {
        error: String,
    },
}

/// Optional execution hook for due intents. Without one, the intent
/// scheduler still replays, catches up, and emits events — it just does no
/// side effects (spec §4.5.4: `execution_enabled=false`).
#[async_trait]
pub trait IntentExecutor: Send + Sync {
    async fn execute_intent(&self, intent: &ScheduleIntent) -> IntentExecutionOutcome;
}
