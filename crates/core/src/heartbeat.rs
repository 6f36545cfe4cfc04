// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat policy rule types (spec §3 "Heartbeat rule", §4.4).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::{RuleId, SessionId};

/// A single heartbeat rule as loaded from the policy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRule {
    pub rule_id: RuleId,
    pub prompt: String,
    pub interval_ms: u64,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl HeartbeatRule {
    /// The session id this rule fires against: the explicit `session_id` if
    /// set, otherwise the default form `heartbeat:<rule_id>`.
    pub fn effective_session_id(&self) -> SessionId {
        self.session_id
            .clone()
            .unwrap_or_else(|| Self::default_session_id(&self.rule_id))
    }

    pub fn default_session_id(rule_id: &RuleId) -> SessionId {
        SessionId::new(format!("heartbeat:{rule_id}"))
    }

    /// Whether `session_id` is the rule's own default-form session (and thus
    /// eligible for cleanup when the rule is removed or rebound).
    pub fn owns_default_session(&self, session_id: &SessionId) -> bool {
        self.session_id.is_none() && *session_id == Self::default_session_id(&self.rule_id)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// An immutable, fully-validated policy snapshot produced by `reload()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPolicy {
    pub rules: Vec<HeartbeatRule>,
}

impl HeartbeatPolicy {
    pub fn rule(&self, rule_id: &RuleId) -> Option<&HeartbeatRule> {
        self.rules.iter().find(|r| &r.rule_id == rule_id)
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &HeartbeatRule> {
        self.rules.iter().filter(|r| r.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, session: Option<&str>) -> HeartbeatRule {
        HeartbeatRule {
            rule_id: RuleId::new(id),
            prompt: "check in".to_string(),
            interval_ms: 60_000,
            session_id: session.map(SessionId::new),
            enabled: true,
        }
    }

    #[test]
    fn default_session_id_is_derived_from_rule_id() {
        let r = rule("daily", None);
        assert_eq!(r.effective_session_id(), SessionId::new("heartbeat:daily"));
        assert!(r.owns_default_session(&SessionId::new("heartbeat:daily")));
    }

    #[test]
    fn explicit_session_id_is_not_a_cleanup_candidate() {
        let r = rule("daily", Some("explicit"));
        assert_eq!(r.effective_session_id(), SessionId::new("explicit"));
        assert!(!r.owns_default_session(&SessionId::new("explicit")));
    }
}
