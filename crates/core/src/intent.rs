// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule intent types: the projected state (spec §3 "Schedule intent")
//! and the append-only event log that produces it (spec §4.5.1).

use serde::{Deserialize, Serialize};

use crate::ids::{IntentId, SessionId};

/// How a fresh session should relate to the intent's parent when fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityMode {
    Inherit,
    Fresh,
}

/// Either an absolute one-shot fire time or a recurring cron expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentSchedule {
    RunAt {
        run_at_ms: i64,
    },
    Cron {
        expression: String,
        #[serde(default)]
        time_zone: Option<String>,
    },
}

/// The predicate that converges (terminates) an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergenceCondition {
    TruthResolved { fact_id: String },
    TaskDone,
    Custom { evaluator_id: String },
    None,
}

impl Default for ConvergenceCondition {
    fn default() -> Self {
        ConvergenceCondition::None
    }
}

/// Lifecycle status of a projected intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Active,
    Converged,
    Cancelled,
    Error,
}

/// The state of a schedule intent, projected from the event log (never
/// written to directly — see `gwd-scheduler::projection`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleIntent {
    pub intent_id: IntentId,
    pub parent_session_id: SessionId,
    pub reason: String,
    pub continuity_mode: ContinuityMode,
    pub schedule: IntentSchedule,
    pub max_runs: Option<u32>,
    pub run_count: u32,
    pub status: IntentStatus,
    pub next_run_at_ms: Option<i64>,
    pub last_fired_at_ms: Option<i64>,
    pub last_evaluation_session_id: Option<SessionId>,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub convergence_condition: ConvergenceCondition,
}

impl ScheduleIntent {
    pub fn runs_exhausted(&self) -> bool {
        matches!(self.max_runs, Some(max) if self.run_count >= max)
    }
}

/// Discriminator for a `schedule_event` (spec §4.5.1). Each carries the
/// intent id, parent session id, and kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleEventKind {
    IntentCreated {
        reason: String,
        continuity_mode: ContinuityMode,
        schedule: IntentSchedule,
        max_runs: Option<u32>,
        convergence_condition: ConvergenceCondition,
    },
    IntentUpdated {
        #[serde(default)]
        max_runs: Option<Option<u32>>,
        #[serde(default)]
        schedule: Option<IntentSchedule>,
        #[serde(default)]
        reason: Option<String>,
    },
    IntentCancelled {
        reason: String,
    },
    IntentFired {
        #[serde(default)]
        evaluation_session_id: Option<SessionId>,
        #[serde(default)]
        error: Option<String>,
    },
    IntentConverged,
    RecoveryDeferred {
        deferred_to_ms: i64,
    },
    RecoverySummary {
        due: u32,
        fired: u32,
        deferred: u32,
    },
}

/// One entry in the append-only schedule event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub seq: u64,
    pub intent_id: IntentId,
    pub parent_session_id: SessionId,
    pub ts_ms: i64,
    pub kind: ScheduleEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_exhausted_respects_max_runs() {
        let mut intent = sample();
        intent.max_runs = Some(2);
        intent.run_count = 1;
        assert!(!intent.runs_exhausted());
        intent.run_count = 2;
        assert!(intent.runs_exhausted());
    }

    #[test]
    fn unlimited_runs_never_exhaust() {
        let intent = sample();
        assert!(!intent.runs_exhausted());
    }

    fn sample() -> ScheduleIntent {
        ScheduleIntent {
            intent_id: IntentId::new("i1"),
            parent_session_id: SessionId::new("s1"),
            reason: "demo".to_string(),
            continuity_mode: ContinuityMode::Fresh,
            schedule: IntentSchedule::RunAt { run_at_ms: 0 },
            max_runs: None,
            run_count: 0,
            status: IntentStatus::Active,
            next_run_at_ms: Some(0),
            last_fired_at_ms: None,
            last_evaluation_session_id: None,
            consecutive_errors: 0,
            last_error: None,
            convergence_condition: ConvergenceCondition::None,
        }
    }
}
