// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the schedulers' narrow `SessionDriver`/`IntentExecutor` callbacks
//! (spec §9 "Cyclic references") onto a live `Supervisor` handle. This is
//! the gateway's unique responsibility: it is the only crate allowed to
//! depend on both `gwd-supervisor` and `gwd-scheduler`.

use std::sync::Arc;

use async_trait::async_trait;

use gwd_core::ids::{SessionId, TurnId};
use gwd_core::intent::{ContinuityMode, ScheduleIntent};
use gwd_core::Clock;
use gwd_scheduler::{IntentExecutionOutcome, IntentExecutor, SessionDriver};
use gwd_supervisor::{OpenSessionRequest, Supervisor};
use gwd_worker::WorkerAdapter;

pub struct SupervisorDriver<W: WorkerAdapter, C: Clock> {
    supervisor: Arc<Supervisor<W, C>>,
}

impl<W: WorkerAdapter, C: Clock + 'static> SupervisorDriver<W, C> {
    pub fn new(supervisor: Arc<Supervisor<W, C>>) -> Self {
        Self { supervisor }
    }

    /// The session a fired intent should run in: the parent session when
    /// `inherit`, or a new deterministic per-run session id when `fresh`
    /// (spec §4.5.4, §3 "Schedule intent" `continuity_mode`).
    fn target_session(&self, intent: &ScheduleIntent) -> SessionId {
        match intent.continuity_mode {
            ContinuityMode::Inherit => intent.parent_session_id.clone(),
            ContinuityMode::Fresh => SessionId::new(format!(
                "intent:{}:{}",
                intent.intent_id.as_str(),
                intent.run_count
            )),
        }
    }
}

#[async_trait]
impl<W: WorkerAdapter, C: Clock + 'static> SessionDriver for SupervisorDriver<W, C> {
    async fn open_session(&self, session_id: &SessionId) -> Result<(), String> {
        self.supervisor
            .open_session(OpenSessionRequest {
                session_id: Some(session_id.clone()),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// `wait_for_completion` is not distinguished: `Supervisor::send_prompt`
    /// already awaits the worker actor's acknowledgement that the turn was
    /// appended and dispatched before returning.
    async fn send_prompt(&self, session_id: &SessionId, prompt: &str, _wait_for_completion: bool) -> Result<(), String> {
        let turn_id = TurnId::new(uuid::Uuid::new_v4().to_string());
        self.supervisor
            .send_prompt(session_id, turn_id, prompt.to_string())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn stop_session(&self, session_id: &SessionId, reason: &str) -> Result<(), String> {
        self.supervisor
            .stop_session(session_id, reason)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl<W: WorkerAdapter, C: Clock + 'static> IntentExecutor for SupervisorDriver<W, C> {
    async fn execute_intent(&self, intent: &ScheduleIntent) -> IntentExecutionOutcome {
        let session_id = self.target_session(intent);

        if let Err(e) = SessionDriver::open_session(self, &session_id).await {
            return IntentExecutionOutcome::Err { error: e };
        }

        match SessionDriver::send_prompt(self, &session_id, &intent.reason, false).await {
            Ok(()) => IntentExecutionOutcome::Ok {
                evaluation_session_id: Some(session_id),
            },
            Err(e) => IntentExecutionOutcome::Err { error: e },
        }
    }
}
