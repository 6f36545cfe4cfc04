// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine types (spec §3 "Connection", §4.1.2).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ids::{ConnId, SessionId};

/// The connection state machine's phases. A connection never transitions
/// backward out of `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnPhase {
    Connected,
    Authenticating,
    Authenticated,
    Closing,
}

impl ConnPhase {
    /// Only `connect` is permitted before authentication.
    pub fn requires_connect_first(self) -> bool {
        matches!(self, ConnPhase::Connected | ConnPhase::Authenticating)
    }
}

/// Client-supplied identification sent with `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Server-side connection record.
#[derive(Debug, Clone)]
pub struct Connection {
    pub conn_id: ConnId,
    pub phase: ConnPhase,
    pub challenge_nonce: String,
    pub authenticated_token: Option<String>,
    pub subscribed_sessions: HashSet<SessionId>,
    pub client_descriptor: Option<ClientDescriptor>,
    pub connected_at_ms: i64,
    pub last_seen_at_ms: i64,
}

impl Connection {
    pub fn new(conn_id: ConnId, challenge_nonce: String, now_ms: i64) -> Self {
        Self {
            conn_id,
            phase: ConnPhase::Connected,
            challenge_nonce,
            authenticated_token: None,
            subscribed_sessions: HashSet::new(),
            client_descriptor: None,
            connected_at_ms: now_ms,
            last_seen_at_ms: now_ms,
        }
    }

    /// Whether this connection may currently dispatch any method other than
    /// `connect`: it must be authenticated and its stored token must still
    /// equal the daemon's current token.
    pub fn is_authorized(&self, current_token: &str) -> bool {
        self.phase == ConnPhase::Authenticated
            && self
                .authenticated_token
                .as_deref()
                .map(|t| constant_time_eq(t.as_bytes(), current_token.as_bytes()))
                .unwrap_or(false)
    }

    /// Subscribe to a session; returns whether membership actually changed.
    pub fn subscribe(&mut self, session_id: SessionId) -> bool {
        self.subscribed_sessions.insert(session_id)
    }

    /// Unsubscribe from a session; returns whether membership actually changed.
    pub fn unsubscribe(&mut self, session_id: &SessionId) -> bool {
        self.subscribed_sessions.remove(session_id)
    }
}

/// Constant-time byte comparison, used for the auth token check (§4.6) so
/// timing does not leak how many leading bytes matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_connection_is_never_authorized() {
        let conn = Connection::new(ConnId::new("c1"), "nonce".to_string(), 0);
        assert!(!conn.is_authorized("token"));
    }

    #[test]
    fn authorized_requires_matching_token() {
        let mut conn = Connection::new(ConnId::new("c1"), "nonce".to_string(), 0);
        conn.phase = ConnPhase::Authenticated;
        conn.authenticated_token = Some("old".to_string());
        assert!(!conn.is_authorized("new"));
        conn.authenticated_token = Some("new".to_string());
        assert!(conn.is_authorized("new"));
    }

    #[test]
    fn subscribe_and_unsubscribe_report_whether_state_changed() {
        let mut conn = Connection::new(ConnId::new("c1"), "nonce".to_string(), 0);
        let sid = SessionId::new("s1");
        assert!(conn.subscribe(sid.clone()));
        assert!(!conn.subscribe(sid.clone()));
        assert!(conn.unsubscribe(&sid));
        assert!(!conn.unsubscribe(&sid));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_lengths() {
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
    }
}
