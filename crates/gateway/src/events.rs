// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pumps [`SupervisorEvent`]s onto the connection table as wire events
//! (spec §4.1.4), generalizing the teacher's `event_bus` fan-out from a
//! durable WAL-backed bus into a direct in-memory relay.

use serde_json::json;
use tokio::sync::mpsc;

use gwd_supervisor::SupervisorEvent;

use crate::connections::Connections;

/// Drain `events_rx` forever, translating each [`SupervisorEvent`] into the
/// matching session-scoped wire event and delivering it to subscribers.
/// Exits once the supervisor drops its sender.
pub async fn run(connections: &Connections, mut events_rx: mpsc::Receiver<SupervisorEvent>) {
    while let Some(event) = events_rx.recv().await {
        match event {
            SupervisorEvent::SessionReady { session_id, agent_session_id } => {
                connections.deliver_to_session(
                    &session_id,
                    "session.turn.start",
                    json!({ "sessionId": session_id.as_str(), "agentSessionId": agent_session_id, "kind": "ready" }),
                );
            }
            SupervisorEvent::WorkerEvent { session_id, event, payload } => {
                connections.deliver_to_session(
                    &session_id,
                    "session.turn.chunk",
                    json!({ "sessionId": session_id.as_str(), "kind": event, "payload": payload }),
                );
            }
            SupervisorEvent::WorkerLog { session_id, level, message } => {
                connections.deliver_to_session(
                    &session_id,
                    "session.turn.chunk",
                    json!({ "sessionId": session_id.as_str(), "kind": "log", "level": level, "message": message }),
                );
            }
            SupervisorEvent::TurnResult { session_id, turn_id, ok, payload, error } => {
                let event_name = if ok { "session.turn.end" } else { "session.turn.error" };
                connections.deliver_to_session(
                    &session_id,
                    event_name,
                    json!({
                        "sessionId": session_id.as_str(),
                        "turnId": turn_id.as_str(),
                        "ok": ok,
                        "payload": payload,
                        "error": error,
                    }),
                );
            }
            SupervisorEvent::SessionClosed { session_id, reason } => {
                connections.deliver_to_session(
                    &session_id,
                    "session.turn.end",
                    json!({ "sessionId": session_id.as_str(), "kind": "closed", "reason": reason }),
                );
            }
        }
    }
}
