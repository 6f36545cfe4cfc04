// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frame shapes (spec §4.1.1, §6.2): request, response, and event,
//! exchanged as length-prefixed JSON via `gwd_core::framing`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gwd_core::error::GatewayError;

/// Bumped whenever a method/event/payload shape changes incompatibly.
pub const PROTOCOL_VERSION: &str = "1";

/// Methods requiring no prior authentication.
pub const UNAUTHENTICATED_METHODS: &[&str] = &["connect"];

pub const ADMIN_METHODS: &[&str] = &[
    "health",
    "status.deep",
    "heartbeat.reload",
    "gateway.rotate-token",
    "gateway.stop",
];

pub const SESSION_METHODS: &[&str] = &[
    "sessions.open",
    "sessions.send",
    "sessions.subscribe",
    "sessions.unsubscribe",
    "sessions.abort",
    "sessions.close",
];

/// The full supported method set, advertised in `hello-ok` (§4.1.2).
pub fn all_methods() -> Vec<&'static str> {
    let mut methods = vec!["connect"];
    methods.extend_from_slice(ADMIN_METHODS);
    methods.extend_from_slice(SESSION_METHODS);
    methods
}

pub const BROADCAST_EVENTS: &[&str] = &["tick", "shutdown", "heartbeat.fired", "connect.challenge"];

pub const SESSION_SCOPED_EVENTS: &[&str] = &[
    "session.turn.start",
    "session.turn.chunk",
    "session.turn.end",
    "session.turn.error",
];

pub fn all_events() -> Vec<&'static str> {
    let mut events = BROADCAST_EVENTS.to_vec();
    events.extend_from_slice(SESSION_SCOPED_EVENTS);
    events
}

/// `{type:"req", id, method, params, traceId?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "traceId", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// `{type:"res", id, traceId?, ok, payload?, error?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: Value,
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

impl ResponseFrame {
    pub fn ok(id: Value, trace_id: Option<String>, payload: Value) -> Self {
        Self {
            id,
            trace_id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: Value, trace_id: Option<String>, error: GatewayError) -> Self {
        Self {
            id,
            trace_id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// `{type:"event", event, payload, seq}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub payload: Value,
    pub seq: u64,
}

/// Discriminated wrapper so a decoded frame carries its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutgoingFrame {
    #[serde(rename = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
}

/// What the writer task does with one item off a connection's outbound
/// queue: write a frame, or flush and terminate the socket (used to force
/// a connection closed after a token rotation revokes it, spec §4.1.5).
#[derive(Debug, Clone)]
pub enum ConnCommand {
    Frame(OutgoingFrame),
    Close,
}

impl From<OutgoingFrame> for ConnCommand {
    fn from(frame: OutgoingFrame) -> Self {
        ConnCommand::Frame(frame)
    }
}

/// A request id is echoed back verbatim, but a missing/blank/non-string id
/// is still answered with a synthesized one (§4.1.1).
pub fn normalize_request_id(id: &Option<Value>) -> Value {
    match id {
        Some(Value::String(s)) if !s.trim().is_empty() => Value::String(s.clone()),
        Some(other) if !other.is_null() => other.clone(),
        _ => Value::String(uuid::Uuid::new_v4().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_id_is_synthesized() {
        let id = normalize_request_id(&Some(Value::String("  ".to_string())));
        assert!(matches!(id, Value::String(s) if !s.trim().is_empty()));
    }

    #[test]
    fn missing_id_is_synthesized() {
        let id = normalize_request_id(&None);
        assert!(matches!(id, Value::String(_)));
    }

    #[test]
    fn present_id_is_echoed_verbatim() {
        let id = normalize_request_id(&Some(Value::String("abc".to_string())));
        assert_eq!(id, Value::String("abc".to_string()));
    }

    #[test]
    fn all_methods_include_connect_and_session_methods() {
        let methods = all_methods();
        assert!(methods.contains(&"connect"));
        assert!(methods.contains(&"sessions.open"));
        assert!(methods.contains(&"gateway.stop"));
    }
}
