// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure replay of the schedule event log into the projected `ScheduleIntent`
//! rows (spec §4.5.2). No I/O and no wall-clock reads: every timestamp used
//! here comes from the event itself, so replaying the same ordered event
//! slice twice always yields the same map (spec §8.2 `Recovery(Recovery(s))`
//! idempotence).

use std::collections::HashMap;

use thiserror::Error;

use gwd_core::ids::IntentId;
use gwd_core::intent::{
    IntentSchedule, IntentStatus, ScheduleEvent, ScheduleEventKind, ScheduleIntent,
};
use gwd_policy::next_fire_at_ms;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("intent id already exists: {0}")]
    IntentIdAlreadyExists(IntentId),
    #[error("intent not found: {0}")]
    IntentNotFound(IntentId),
}

/// Replay every event in append order into a fresh projection. Events are
/// assumed already ordered by `seq` (see `ScheduleLog::replay_all`).
pub fn replay(events: &[ScheduleEvent]) -> HashMap<IntentId, ScheduleIntent> {
    let mut state = HashMap::new();
    for event in events {
        // A log can only contain events that passed `apply` when they were
        // appended, so a rejection here means the log itself diverged from
        // the projection rules; skip it rather than abort the whole replay.
        let _ = apply(&mut state, event);
    }
    state
}

/// Apply one event to `state` in place per the §4.5.2 projection table.
pub fn apply(
    state: &mut HashMap<IntentId, ScheduleIntent>,
    event: &ScheduleEvent,
) -> Result<(), ProjectionError> {
    match &event.kind {
        ScheduleEventKind::IntentCreated {
            reason,
            continuity_mode,
            schedule,
            max_runs,
            convergence_condition,
        } => {
            if state.contains_key(&event.intent_id) {
                return Err(ProjectionError::IntentIdAlreadyExists(event.intent_id.clone()));
            }
            let next_run_at_ms = initial_next_run_at(schedule, event.ts_ms);
            state.insert(
                event.intent_id.clone(),
                ScheduleIntent {
                    intent_id: event.intent_id.clone(),
                    parent_session_id: event.parent_session_id.clone(),
                    reason: reason.clone(),
                    continuity_mode: *continuity_mode,
                    schedule: schedule.clone(),
                    max_runs: *max_runs,
                    run_count: 0,
                    status: IntentStatus::Active,
                    next_run_at_ms,
                    last_fired_at_ms: None,
                    last_evaluation_session_id: None,
                    consecutive_errors: 0,
                    last_error: None,
                    convergence_condition: convergence_condition.clone(),
                },
            );
        }
        ScheduleEventKind::IntentUpdated {
            max_runs,
            schedule,
            reason,
        } => {
            let intent = state
                .get_mut(&event.intent_id)
                .ok_or_else(|| ProjectionError::IntentNotFound(event.intent_id.clone()))?;
            let previous_max_runs = intent.max_runs;
            let was_converged = intent.status == IntentStatus::Converged;

            if let Some(reason) = reason {
                intent.reason = reason.clone();
            }
            if let Some(max_runs) = max_runs {
                intent.max_runs = *max_runs;
            }
            if let Some(schedule) = schedule {
                intent.schedule = schedule.clone();
            }

            let max_runs_increased = match (intent.max_runs, previous_max_runs) {
                (Some(new), Some(old)) => new > old,
                (Some(_), None) => false,
                (None, _) => true,
            };

            if was_converged && max_runs_increased {
                intent.status = IntentStatus::Active;
                intent.next_run_at_ms = initial_next_run_at(&intent.schedule, event.ts_ms);
            } else if schedule.is_some() && intent.status == IntentStatus::Active {
                intent.next_run_at_ms = initial_next_run_at(&intent.schedule, event.ts_ms);
            }
        }
        ScheduleEventKind::IntentCancelled { .. } => {
            let intent = state
                .get_mut(&event.intent_id)
                .ok_or_else(|| ProjectionError::IntentNotFound(event.intent_id.clone()))?;
            intent.status = IntentStatus::Cancelled;
            intent.next_run_at_ms = None;
        }
        ScheduleEventKind::IntentFired {
            evaluation_session_id,
            error,
        } => {
            let intent = state
                .get_mut(&event.intent_id)
                .ok_or_else(|| ProjectionError::IntentNotFound(event.intent_id.clone()))?;
            match error {
                None => {
                    intent.run_count += 1;
                    intent.last_fired_at_ms = Some(event.ts_ms);
                    intent.last_evaluation_session_id = evaluation_session_id.clone();
                    intent.consecutive_errors = 0;
                    intent.last_error = None;
                }
                Some(message) => {
                    intent.consecutive_errors += 1;
                    intent.last_error = Some(message.clone());
                }
            }
            advance_or_converge(intent, event.ts_ms);
        }
        ScheduleEventKind::IntentConverged => {
            let intent = state
                .get_mut(&event.intent_id)
                .ok_or_else(|| ProjectionError::IntentNotFound(event.intent_id.clone()))?;
            intent.status = IntentStatus::Converged;
            intent.next_run_at_ms = None;
        }
        ScheduleEventKind::RecoveryDeferred { deferred_to_ms } => {
            if let Some(intent) = state.get_mut(&event.intent_id) {
                intent.next_run_at_ms = Some(*deferred_to_ms);
            }
        }
        // Informational only; no row carries session-level aggregate state.
        ScheduleEventKind::RecoverySummary { .. } => {}
    }
    Ok(())
}

/// A `run_at` schedule only ever fires once, so it converges the instant it
/// does — regardless of `max_runs`. A `cron` schedule recomputes its next
/// occurrence and converges only once `max_runs` is reached.
fn advance_or_converge(intent: &mut ScheduleIntent, ts_ms: i64) {
    match &intent.schedule {
        IntentSchedule::RunAt { .. } => {
            intent.status = IntentStatus::Converged;
            intent.next_run_at_ms = None;
        }
        IntentSchedule::Cron { .. } => {
            if intent.runs_exhausted() {
                intent.status = IntentStatus::Converged;
                intent.next_run_at_ms = None;
            } else {
                intent.next_run_at_ms = next_fire_at_ms(&intent.schedule, ts_ms).unwrap_or(None);
            }
        }
    }
}

fn initial_next_run_at(schedule: &IntentSchedule, ts_ms: i64) -> Option<i64> {
    match schedule {
        IntentSchedule::RunAt { run_at_ms } => Some(*run_at_ms),
        IntentSchedule::Cron { .. } => next_fire_at_ms(schedule, ts_ms).unwrap_or(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::ids::SessionId;
    use gwd_core::intent::{ContinuityMode, ConvergenceCondition};

    fn created(intent_id: &str, schedule: IntentSchedule, max_runs: Option<u32>, ts_ms: i64) -> ScheduleEvent {
        ScheduleEvent {
            seq: 0,
            intent_id: IntentId::new(intent_id),
            parent_session_id: SessionId::new("s1"),
            ts_ms,
            kind: ScheduleEventKind::IntentCreated {
                reason: "demo".to_string(),
                continuity_mode: ContinuityMode::Fresh,
                schedule,
                max_runs,
                convergence_condition: ConvergenceCondition::None,
            },
        }
    }

    fn fired(intent_id: &str, ts_ms: i64, error: Option<&str>) -> ScheduleEvent {
        ScheduleEvent {
            seq: 0,
            intent_id: IntentId::new(intent_id),
            parent_session_id: SessionId::new("s1"),
            ts_ms,
            kind: ScheduleEventKind::IntentFired {
                evaluation_session_id: None,
                error: error.map(str::to_string),
            },
        }
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut state = HashMap::new();
        let schedule = IntentSchedule::RunAt { run_at_ms: 1_000 };
        apply(&mut state, &created("i1", schedule.clone(), None, 0)).unwrap();
        let err = apply(&mut state, &created("i1", schedule, None, 0)).unwrap_err();
        assert_eq!(err, ProjectionError::IntentIdAlreadyExists(IntentId::new("i1")));
    }

    #[test]
    fn run_at_converges_after_firing_once() {
        let mut state = HashMap::new();
        let schedule = IntentSchedule::RunAt { run_at_ms: 1_000 };
        apply(&mut state, &created("i1", schedule, None, 0)).unwrap();
        apply(&mut state, &fired("i1", 1_000, None)).unwrap();
        let intent = &state[&IntentId::new("i1")];
        assert_eq!(intent.status, IntentStatus::Converged);
        assert_eq!(intent.next_run_at_ms, None);
        assert_eq!(intent.run_count, 1);
    }

    #[test]
    fn cron_recomputes_next_run_at_after_firing() {
        let mut state = HashMap::new();
        let schedule = IntentSchedule::Cron {
            expression: "0 0 * * * *".to_string(),
            time_zone: None,
        };
        apply(&mut state, &created("i1", schedule, None, 0)).unwrap();
        let before = state[&IntentId::new("i1")].next_run_at_ms;
        apply(&mut state, &fired("i1", before.unwrap(), None)).unwrap();
        let intent = &state[&IntentId::new("i1")];
        assert_eq!(intent.status, IntentStatus::Active);
        assert!(intent.next_run_at_ms.unwrap() > before.unwrap());
    }

    #[test]
    fn errored_fire_increments_consecutive_errors() {
        let mut state = HashMap::new();
        let schedule = IntentSchedule::Cron {
            expression: "0 0 * * * *".to_string(),
            time_zone: None,
        };
        apply(&mut state, &created("i1", schedule, None, 0)).unwrap();
        apply(&mut state, &fired("i1", 0, Some("boom"))).unwrap();
        let intent = &state[&IntentId::new("i1")];
        assert_eq!(intent.consecutive_errors, 1);
        assert_eq!(intent.last_error.as_deref(), Some("boom"));
        assert_eq!(intent.run_count, 0);
    }

    #[test]
    fn cancelling_clears_next_run_at() {
        let mut state = HashMap::new();
        let schedule = IntentSchedule::RunAt { run_at_ms: 1_000 };
        apply(&mut state, &created("i1", schedule, None, 0)).unwrap();
        apply(
            &mut state,
            &ScheduleEvent {
                seq: 0,
                intent_id: IntentId::new("i1"),
                parent_session_id: SessionId::new("s1"),
                ts_ms: 0,
                kind: ScheduleEventKind::IntentCancelled {
                    reason: "done".to_string(),
                },
            },
        )
        .unwrap();
        let intent = &state[&IntentId::new("i1")];
        assert_eq!(intent.status, IntentStatus::Cancelled);
        assert_eq!(intent.next_run_at_ms, None);
    }

    #[test]
    fn replay_is_idempotent() {
        let schedule = IntentSchedule::RunAt { run_at_ms: 1_000 };
        let events = vec![created("i1", schedule, None, 0), fired("i1", 1_000, None)];
        let first = replay(&events);
        let second = replay(&events);
        assert_eq!(first, second);
    }
}
