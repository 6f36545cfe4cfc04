// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection table and event fan-out (spec §4.1.2, §4.1.4). Sequence
//! numbers are assigned under the same lock that appends to a connection's
//! outbound queue, so the two can never drift apart — mirroring the
//! teacher's `EventBus` pairing of WAL-append and sequence assignment
//! under one mutex in `daemon/src/event_bus.rs`, generalized from "append
//! to the durable WAL" to "enqueue onto every subscribed connection".

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use gwd_core::connection::Connection;
use gwd_core::ids::{ConnId, SessionId};

use crate::protocol::{ConnCommand, EventFrame, OutgoingFrame, ResponseFrame};

struct ConnEntry {
    conn: Connection,
    outbound: mpsc::Sender<ConnCommand>,
}

struct ConnectionsState {
    seq: u64,
    entries: HashMap<ConnId, ConnEntry>,
}

pub struct Connections {
    state: Mutex<ConnectionsState>,
}

impl Connections {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionsState {
                seq: 0,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn register(&self, conn: Connection, outbound: mpsc::Sender<ConnCommand>) {
        let conn_id = conn.conn_id.clone();
        self.state.lock().entries.insert(conn_id, ConnEntry { conn, outbound });
    }

    pub fn remove(&self, conn_id: &ConnId) {
        self.state.lock().entries.remove(conn_id);
    }

    pub fn snapshot(&self, conn_id: &ConnId) -> Option<Connection> {
        self.state.lock().entries.get(conn_id).map(|e| e.conn.clone())
    }

    /// Mutate a connection's record in place (phase transitions, token,
    /// subscriptions). Returns `None` if the connection already vanished.
    pub fn update<R>(&self, conn_id: &ConnId, f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
        let mut state = self.state.lock();
        state.entries.get_mut(conn_id).map(|e| f(&mut e.conn))
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Send a response frame to exactly one connection. Silently dropped if
    /// the connection is gone or its outbound queue is saturated (§4.1.5).
    pub fn send_response(&self, conn_id: &ConnId, response: ResponseFrame) {
        let state = self.state.lock();
        if let Some(entry) = state.entries.get(conn_id) {
            let _ = entry.outbound.try_send(ConnCommand::Frame(OutgoingFrame::Response(response)));
        }
    }

    /// Broadcast an event to every connection regardless of subscription
    /// (§4.1.4 broadcast events: `tick`, `shutdown`, `heartbeat.fired`,
    /// `connect.challenge`).
    pub fn broadcast(&self, event: &str, payload: Value) {
        let mut state = self.state.lock();
        let seq = next_seq(&mut state);
        let command = ConnCommand::Frame(OutgoingFrame::Event(EventFrame {
            event: event.to_string(),
            payload,
            seq,
        }));
        for entry in state.entries.values() {
            let _ = entry.outbound.try_send(command.clone());
        }
    }

    /// Deliver a session-scoped event only to connections subscribed to
    /// `session_id` (§4.1.4). Caller is responsible for dropping events with
    /// no resolvable session id before calling this.
    pub fn deliver_to_session(&self, session_id: &SessionId, event: &str, payload: Value) {
        let mut state = self.state.lock();
        let seq = next_seq(&mut state);
        let command = ConnCommand::Frame(OutgoingFrame::Event(EventFrame {
            event: event.to_string(),
            payload,
            seq,
        }));
        for entry in state.entries.values() {
            if entry.conn.subscribed_sessions.contains(session_id) {
                let _ = entry.outbound.try_send(command.clone());
            }
        }
    }

    /// Send an event to exactly one connection regardless of its
    /// subscriptions, e.g. the per-connection `connect.challenge` sent
    /// right after accept (§4.1.2).
    pub fn send_event_to(&self, conn_id: &ConnId, event: &str, payload: Value) {
        let mut state = self.state.lock();
        let seq = next_seq(&mut state);
        if let Some(entry) = state.entries.get(conn_id) {
            let _ = entry.outbound.try_send(ConnCommand::Frame(OutgoingFrame::Event(EventFrame {
                event: event.to_string(),
                payload,
                seq,
            })));
        }
    }

    /// Connections whose stored auth token equals `old_token` — used by
    /// `gateway.rotate-token` to force-close every connection authenticated
    /// under the token being replaced (§4.1.3, §4.1.5).
    pub fn ids_with_token(&self, old_token: &str) -> Vec<ConnId> {
        let state = self.state.lock();
        state
            .entries
            .values()
            .filter(|e| e.conn.authenticated_token.as_deref() == Some(old_token))
            .map(|e| e.conn.conn_id.clone())
            .collect()
    }

    /// Outbound sender for `conn_id`.
    pub fn outbound(&self, conn_id: &ConnId) -> Option<mpsc::Sender<ConnCommand>> {
        self.state.lock().entries.get(conn_id).map(|e| e.outbound.clone())
    }

    /// Mark `conn_id` closing and ask its writer task to flush and
    /// terminate the socket.
    pub fn close(&self, conn_id: &ConnId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(conn_id) {
            entry.conn.phase = gwd_core::connection::ConnPhase::Closing;
            let _ = entry.outbound.try_send(ConnCommand::Close);
        }
    }
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

fn next_seq(state: &mut ConnectionsState) -> u64 {
    state.seq += 1;
    state.seq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_conn(id: &str) -> Connection {
        Connection::new(ConnId::new(id), "nonce".to_string(), 0)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection() {
        let connections = Connections::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        connections.register(sample_conn("c1"), tx1);
        connections.register(sample_conn("c2"), tx2);

        connections.broadcast("tick", serde_json::json!({}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn session_scoped_event_only_reaches_subscribers() {
        let connections = Connections::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        connections.register(sample_conn("c1"), tx1);
        connections.register(sample_conn("c2"), tx2);

        let session_id = SessionId::new("s1");
        connections.update(&ConnId::new("c1"), |c| c.subscribe(session_id.clone()));

        connections.deliver_to_session(&session_id, "session.turn.start", serde_json::json!({}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn sequence_numbers_are_strictly_monotonic_across_calls() {
        let connections = Connections::new();
        let (tx, mut rx) = mpsc::channel(8);
        connections.register(sample_conn("c1"), tx);

        connections.broadcast("tick", serde_json::json!({}));
        connections.broadcast("tick", serde_json::json!({}));

        let ConnCommand::Frame(OutgoingFrame::Event(first)) = rx.try_recv().unwrap() else {
            panic!("expected event")
        };
        let ConnCommand::Frame(OutgoingFrame::Event(second)) = rx.try_recv().unwrap() else {
            panic!("expected event")
        };
        assert_eq!(second.seq, first.seq + 1);
    }
}
