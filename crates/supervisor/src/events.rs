// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events the supervisor emits outward, for the gateway's event fan-out
//! (spec §4.1.4) to pick up and deliver to subscribed connections.

use serde_json::Value;

use gwd_core::ids::{SessionId, TurnId};

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A worker finished bridging up and is ready to accept turns.
    SessionReady {
        session_id: SessionId,
        agent_session_id: String,
    },
    /// A worker-emitted progress/diagnostic event forwarded verbatim.
    WorkerEvent {
        session_id: SessionId,
        event: String,
        payload: Value,
    },
    /// A worker log line, forwarded at its original level.
    WorkerLog {
        session_id: SessionId,
        level: String,
        message: String,
    },
    /// A turn reached a terminal state.
    TurnResult {
        session_id: SessionId,
        turn_id: TurnId,
        ok: bool,
        payload: Option<Value>,
        error: Option<String>,
    },
    /// The worker process exited or was stopped.
    SessionClosed {
        session_id: SessionId,
        reason: String,
    },
}
