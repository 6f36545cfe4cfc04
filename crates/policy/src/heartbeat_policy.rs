// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat policy file parser (spec §4.4.1). The policy file is plain
//! Markdown (`HEARTBEAT.md` by default) so it reads like documentation, with
//! the actual rule table embedded as a single fenced `toml` code block:
//!
//! ```text
//! # Heartbeat rules
//!
//! Runs a daily check-in against the default session.
//!
//! ```toml
//! [[rule]]
//! rule_id = "daily-checkin"
//! prompt = "Anything blocked? Summarize status."
//! interval_ms = 86400000
//! enabled = true
//! ```
//! ```
//!
//! Every `reload()` call re-parses the whole file into a brand new
//! [`HeartbeatPolicy`] snapshot; nothing is ever mutated in place (spec §9,
//! "long-lived policy files").

use std::path::Path;
use thiserror::Error;

use gwd_core::heartbeat::{HeartbeatPolicy, HeartbeatRule};
use gwd_core::ids::{RuleId, SessionId};

/// Minimum heartbeat interval granularity (spec §3 "Heartbeat rule").
const MIN_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no fenced ```toml block found in policy file")]
    NoTomlBlock,
    #[error("malformed rule table: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("duplicate rule_id {0:?}")]
    DuplicateRuleId(String),
    #[error("rule {rule_id:?} has empty prompt")]
    EmptyPrompt { rule_id: String },
    #[error("rule {rule_id:?} interval_ms {interval_ms} is below the {min}ms minimum")]
    IntervalTooSmall {
        rule_id: String,
        interval_ms: u64,
        min: u64,
    },
}

#[derive(serde::Deserialize)]
struct RawPolicy {
    #[serde(default, rename = "rule")]
    rules: Vec<RawRule>,
}

#[derive(serde::Deserialize)]
struct RawRule {
    rule_id: String,
    prompt: String,
    interval_ms: u64,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Extract the contents of the first fenced ```toml ... ``` block.
fn extract_toml_block(source: &str) -> Option<&str> {
    let fence_start = source.find("```toml")?;
    let body_start = source[fence_start..].find('\n')? + fence_start + 1;
    let fence_end = source[body_start..].find("```")? + body_start;
    Some(&source[body_start..fence_end])
}

/// Parse a policy file's contents into a validated snapshot.
pub fn parse(source: &str) -> Result<HeartbeatPolicy, PolicyError> {
    let toml_block = extract_toml_block(source).ok_or(PolicyError::NoTomlBlock)?;
    let raw: RawPolicy = toml::from_str(toml_block)?;

    let mut seen = std::collections::HashSet::new();
    let mut rules = Vec::with_capacity(raw.rules.len());

    for r in raw.rules {
        if !seen.insert(r.rule_id.clone()) {
            return Err(PolicyError::DuplicateRuleId(r.rule_id));
        }
        if r.prompt.trim().is_empty() {
            return Err(PolicyError::EmptyPrompt { rule_id: r.rule_id });
        }
        if r.interval_ms < MIN_INTERVAL_MS {
            return Err(PolicyError::IntervalTooSmall {
                rule_id: r.rule_id,
                interval_ms: r.interval_ms,
                min: MIN_INTERVAL_MS,
            });
        }

        rules.push(HeartbeatRule {
            rule_id: RuleId::new(r.rule_id),
            prompt: r.prompt,
            interval_ms: r.interval_ms,
            session_id: r.session_id.map(SessionId::new),
            enabled: r.enabled,
        });
    }

    Ok(HeartbeatPolicy { rules })
}

/// Load and parse a policy file from disk.
pub fn load(path: &Path) -> Result<HeartbeatPolicy, PolicyError> {
    let source = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!("# Heartbeat rules\n\n```toml\n{body}\n```\n")
    }

    #[test]
    fn parses_a_minimal_rule() {
        let policy = parse(&doc(
            r#"
            [[rule]]
            rule_id = "daily"
            prompt = "check in"
            interval_ms = 86400000
            "#,
        ))
        .expect("parse");
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].rule_id, RuleId::new("daily"));
        assert!(policy.rules[0].enabled);
    }

    #[test]
    fn rejects_missing_toml_block() {
        let err = parse("# no rules here\n").unwrap_err();
        assert!(matches!(err, PolicyError::NoTomlBlock));
    }

    #[test]
    fn rejects_duplicate_rule_ids() {
        let err = parse(&doc(
            r#"
            [[rule]]
            rule_id = "daily"
            prompt = "a"
            interval_ms = 60000

            [[rule]]
            rule_id = "daily"
            prompt = "b"
            interval_ms = 60000
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateRuleId(id) if id == "daily"));
    }

    #[test]
    fn rejects_interval_below_one_second() {
        let err = parse(&doc(
            r#"
            [[rule]]
            rule_id = "fast"
            prompt = "too fast"
            interval_ms = 500
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, PolicyError::IntervalTooSmall { .. }));
    }

    #[test]
    fn rejects_empty_prompt() {
        let err = parse(&doc(
            r#"
            [[rule]]
            rule_id = "blank"
            prompt = "   "
            interval_ms = 60000
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, PolicyError::EmptyPrompt { .. }));
    }

    #[test]
    fn explicit_session_id_round_trips() {
        let policy = parse(&doc(
            r#"
            [[rule]]
            rule_id = "daily"
            prompt = "check in"
            interval_ms = 60000
            session_id = "pinned"
            enabled = false
            "#,
        ))
        .expect("parse");
        assert_eq!(
            policy.rules[0].session_id,
            Some(SessionId::new("pinned"))
        );
        assert!(!policy.rules[0].enabled);
    }
}
