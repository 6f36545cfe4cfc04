// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent<->worker bridge wire protocol (spec §4.2.2). Frames are exchanged
//! over the worker child's stdin/stdout using the same length-prefixed JSON
//! framing as the gateway's client connections (`gwd_core::framing`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gwd_core::ids::{RequestId, SessionId, TurnId};

/// A message sent from the supervisor to a worker child.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParentMessage {
    /// First message sent after spawn. `payload` carries the resolved
    /// session config (cwd, model, agent_id, parent_pid, ...).
    Init {
        request_id: RequestId,
        payload: Value,
    },
    Send {
        request_id: RequestId,
        prompt: String,
        turn_id: TurnId,
    },
    Abort { request_id: RequestId },
    Shutdown {
        request_id: RequestId,
        reason: String,
    },
    #[serde(rename = "bridge.ping")]
    BridgePing { ts_ms: i64 },
}

impl ParentMessage {
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            ParentMessage::Init { request_id, .. }
            | ParentMessage::Send { request_id, .. }
            | ParentMessage::Abort { request_id }
            | ParentMessage::Shutdown { request_id, .. } => Some(request_id),
            ParentMessage::BridgePing { .. } => None,
        }
    }
}

/// Readiness payload carried by [`WorkerMessage::Ready`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub requested_session_id: Option<SessionId>,
    pub agent_session_id: String,
}

/// A message sent from a worker child to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready {
        request_id: RequestId,
        #[serde(flatten)]
        payload: ReadyPayload,
    },
    Result {
        request_id: RequestId,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    Event {
        event: String,
        payload: Value,
    },
    Log {
        level: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },
    #[serde(rename = "bridge.heartbeat")]
    BridgeHeartbeat { ts_ms: i64 },
}

impl WorkerMessage {
    /// `session_busy` is surfaced as a typed session-state error rather
    /// than a generic RPC failure (spec §4.2.2).
    pub fn is_session_busy(&self) -> bool {
        matches!(
            self,
            WorkerMessage::Result { error_code: Some(code), .. } if code == "session_busy"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_message_round_trips_through_json() {
        let msg = ParentMessage::Send {
            request_id: RequestId::new("r1"),
            prompt: "hi".to_string(),
            turn_id: TurnId::new("t1"),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["kind"], "send");
        let back: ParentMessage = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.request_id(), Some(&RequestId::new("r1")));
    }

    #[test]
    fn bridge_ping_has_no_request_id() {
        let msg = ParentMessage::BridgePing { ts_ms: 42 };
        assert_eq!(msg.request_id(), None);
    }

    #[test]
    fn ready_payload_flattens_into_the_ready_frame() {
        let msg = WorkerMessage::Ready {
            request_id: RequestId::new("r1"),
            payload: ReadyPayload {
                requested_session_id: Some(SessionId::new("s1")),
                agent_session_id: "agent-abc".to_string(),
            },
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["agent_session_id"], "agent-abc");
        assert_eq!(json["requested_session_id"], "s1");
    }

    #[test]
    fn session_busy_result_is_detected() {
        let msg = WorkerMessage::Result {
            request_id: RequestId::new("r1"),
            ok: false,
            payload: None,
            error: Some("busy".to_string()),
            error_code: Some("session_busy".to_string()),
        };
        assert!(msg.is_session_busy());
    }

    #[test]
    fn worker_message_tags_are_snake_case() {
        let msg = WorkerMessage::Log {
            level: "warn".to_string(),
            message: "uh oh".to_string(),
            fields: None,
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["kind"], "log");
    }
}
