// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype identifiers used across the gateway, supervisor, and schedulers.

crate::define_id! {
    /// Unique identifier for a client connection to the gateway.
    pub struct ConnId;
}

crate::define_id! {
    /// Identifies a logical agent conversation, backed by at most one live
    /// worker child process.
    pub struct SessionId;
}

crate::define_id! {
    /// Identifies one prompt-in/response-out cycle within a session.
    pub struct TurnId;
}

crate::define_id! {
    /// Identifies a turn write-ahead-log record.
    pub struct WalId;
}

crate::define_id! {
    /// Identifies a heartbeat policy rule.
    pub struct RuleId;
}

crate::define_id! {
    /// Identifies a schedule intent projected from the event log.
    pub struct IntentId;
}

crate::define_id! {
    /// Identifies a parent<->worker RPC request for multiplexing.
    pub struct RequestId;
}

impl ConnId {
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl WalId {
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl IntentId {
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_distinct() {
        assert_ne!(ConnId::generate(), ConnId::generate());
        assert_ne!(WalId::generate(), WalId::generate());
    }

    #[test]
    fn session_id_compares_with_str() {
        let id = SessionId::new("s1");
        assert_eq!(id, "s1");
    }
}
