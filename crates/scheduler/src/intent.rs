// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The intent scheduler: durable schedule intents driven exclusively
//! through the append-only event log, with an in-memory projection kept in
//! lockstep (spec §4.5).

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use gwd_core::clock::Clock;
use gwd_core::ids::{IntentId, SessionId};
use gwd_core::intent::{
    ContinuityMode, ConvergenceCondition, IntentSchedule, IntentStatus, ScheduleEvent,
    ScheduleEventKind, ScheduleIntent,
};
use gwd_storage::ScheduleLog;

use crate::config::IntentSchedulerConfig;
use crate::driver::{IntentExecutionOutcome, IntentExecutor};
use crate::error::SchedulerError;
use crate::projection;

/// Report for one `recover()` pass (spec §4.5.3). One of these conceptually
/// backs each per-session `recovery_summary` event emitted to the log.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub due: usize,
    pub fired: usize,
    pub deferred: usize,
    pub execution_enabled: bool,
}

struct SessionTally {
    representative: IntentId,
    due: u32,
    fired: u32,
    deferred: u32,
}

pub struct IntentScheduler {
    config: IntentSchedulerConfig,
    log: Mutex<ScheduleLog>,
    state: Mutex<HashMap<IntentId, ScheduleIntent>>,
    clock: Arc<dyn Clock>,
}

impl IntentScheduler {
    /// Open the event log at `path`, replaying it into the initial
    /// projection.
    pub fn open(
        path: impl AsRef<Path>,
        config: IntentSchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let log = ScheduleLog::open(path.as_ref())?;
        let events = log.replay_all()?;
        let state = projection::replay(&events);
        Ok(Self {
            config,
            log: Mutex::new(log),
            state: Mutex::new(state),
            clock,
        })
    }

    pub fn get(&self, intent_id: &IntentId) -> Option<ScheduleIntent> {
        self.state.lock().get(intent_id).cloned()
    }

    pub fn list_active(&self) -> Vec<ScheduleIntent> {
        self.state
            .lock()
            .values()
            .filter(|i| i.status == IntentStatus::Active)
            .cloned()
            .collect()
    }

    fn active_count_for_session(&self, session_id: &SessionId) -> usize {
        self.state
            .lock()
            .values()
            .filter(|i| i.status == IntentStatus::Active && &i.parent_session_id == session_id)
            .count()
    }

    fn active_count_global(&self) -> usize {
        self.state
            .lock()
            .values()
            .filter(|i| i.status == IntentStatus::Active)
            .count()
    }

    fn append(&self, intent_id: IntentId, parent_session_id: SessionId, kind: ScheduleEventKind) -> Result<(), SchedulerError> {
        let ts_ms = self.clock.now_ms();
        let event = ScheduleEvent {
            seq: 0,
            intent_id,
            parent_session_id,
            ts_ms,
            kind,
        };
        let appended = self.log.lock().append(event)?;
        projection::apply(&mut self.state.lock(), &appended)?;
        Ok(())
    }

    /// Create a new intent (spec §4.5.1 `intent_created`, §4.5.5 limits).
    #[allow(clippy::too_many_arguments)]
    pub fn create_intent(
        &self,
        intent_id: IntentId,
        parent_session_id: SessionId,
        reason: String,
        continuity_mode: ContinuityMode,
        schedule: IntentSchedule,
        max_runs: Option<u32>,
        convergence_condition: ConvergenceCondition,
    ) -> Result<ScheduleIntent, SchedulerError> {
        gwd_policy::validate_schedule(&schedule)?;

        if self.state.lock().contains_key(&intent_id) {
            return Err(SchedulerError::IntentIdAlreadyExists(intent_id));
        }

        let per_session = self.active_count_for_session(&parent_session_id);
        if per_session >= self.config.max_active_intents_per_session {
            return Err(SchedulerError::MaxActiveIntentsPerSession {
                current: per_session,
                max: self.config.max_active_intents_per_session,
            });
        }
        let global = self.active_count_global();
        if global >= self.config.max_active_intents_global {
            return Err(SchedulerError::MaxActiveIntentsGlobal {
                current: global,
                max: self.config.max_active_intents_global,
            });
        }

        self.append(
            intent_id.clone(),
            parent_session_id.clone(),
            ScheduleEventKind::IntentCreated {
                reason,
                continuity_mode,
                schedule,
                max_runs,
                convergence_condition,
            },
        )?;

        self.get(&intent_id).ok_or(SchedulerError::IntentNotFound(intent_id))
    }

    /// Update fields on an existing intent (spec §4.5.1 `intent_updated`).
    pub fn update_intent(
        &self,
        intent_id: &IntentId,
        max_runs: Option<Option<u32>>,
        schedule: Option<IntentSchedule>,
        reason: Option<String>,
    ) -> Result<ScheduleIntent, SchedulerError> {
        if let Some(schedule) = &schedule {
            gwd_policy::validate_schedule(schedule)?;
        }
        let parent_session_id = self
            .get(intent_id)
            .ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))?
            .parent_session_id;

        self.append(
            intent_id.clone(),
            parent_session_id,
            ScheduleEventKind::IntentUpdated {
                max_runs,
                schedule,
                reason,
            },
        )?;
        self.get(intent_id).ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))
    }

    /// Cancel an intent (spec §4.5.1 `intent_cancelled`).
    pub fn cancel_intent(&self, intent_id: &IntentId, reason: String) -> Result<ScheduleIntent, SchedulerError> {
        let parent_session_id = self
            .get(intent_id)
            .ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))?
            .parent_session_id;
        self.append(
            intent_id.clone(),
            parent_session_id,
            ScheduleEventKind::IntentCancelled { reason },
        )?;
        self.get(intent_id).ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))
    }

    /// Mark an intent converged directly, e.g. once a caller observes its
    /// convergence condition is satisfied (spec §4.5.4).
    pub fn converge_intent(&self, intent_id: &IntentId) -> Result<ScheduleIntent, SchedulerError> {
        let parent_session_id = self
            .get(intent_id)
            .ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))?
            .parent_session_id;
        self.append(intent_id.clone(), parent_session_id, ScheduleEventKind::IntentConverged)?;
        self.get(intent_id).ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))
    }

    /// Record the outcome of firing `intent_id`, applying the §4.5.2
    /// circuit-breaker rule: after `max_consecutive_errors` straight
    /// failures, auto-cancel with reason `circuit_open:<error>`.
    fn record_fired(
        &self,
        intent_id: &IntentId,
        evaluation_session_id: Option<SessionId>,
        error: Option<String>,
    ) -> Result<ScheduleIntent, SchedulerError> {
        let parent_session_id = self
            .get(intent_id)
            .ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))?
            .parent_session_id;

        self.append(
            intent_id.clone(),
            parent_session_id.clone(),
            ScheduleEventKind::IntentFired {
                evaluation_session_id,
                error: error.clone(),
            },
        )?;

        if error.is_some() {
            let consecutive_errors = self.get(intent_id).map(|i| i.consecutive_errors).unwrap_or(0);
            if consecutive_errors >= self.config.max_consecutive_errors {
                let reason = format!("circuit_open:{}", error.unwrap_or_default());
                self.append(intent_id.clone(), parent_session_id, ScheduleEventKind::IntentCancelled { reason })?;
            }
        }

        self.get(intent_id).ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))
    }

    fn defer(&self, intent_id: &IntentId, deferred_to_ms: i64) -> Result<(), SchedulerError> {
        let parent_session_id = self
            .get(intent_id)
            .ok_or_else(|| SchedulerError::IntentNotFound(intent_id.clone()))?
            .parent_session_id;
        self.append(
            intent_id.clone(),
            parent_session_id,
            ScheduleEventKind::RecoveryDeferred { deferred_to_ms },
        )
    }

    fn emit_recovery_summary(&self, parent_session_id: SessionId, representative: IntentId, tally: &SessionTally) -> Result<(), SchedulerError> {
        self.append(
            representative,
            parent_session_id,
            ScheduleEventKind::RecoverySummary {
                due: tally.due,
                fired: tally.fired,
                deferred: tally.deferred,
            },
        )
    }

    async fn fire_one(&self, intent_id: &IntentId, executor: Option<&dyn IntentExecutor>) -> Result<bool, SchedulerError> {
        let Some(intent) = self.get(intent_id) else {
            return Ok(false);
        };
        let (evaluation_session_id, error) = match executor {
            Some(executor) => match executor.execute_intent(&intent).await {
                IntentExecutionOutcome::Ok { evaluation_session_id } => (evaluation_session_id, None),
                IntentExecutionOutcome::Err { error } => (None, Some(error)),
            },
            None => (None, None),
        };
        self.record_fired(intent_id, evaluation_session_id, error)?;
        Ok(true)
    }

    /// Fire every currently-due active intent once, in no particular order.
    /// Used for ordinary ticking, where a steady cadence means the backlog
    /// never builds up enough to need the recovery catch-up's fairness
    /// scheme.
    pub async fn tick(&self, executor: Option<&dyn IntentExecutor>) -> Result<usize, SchedulerError> {
        let now_ms = self.clock.now_ms();
        let due: Vec<IntentId> = self
            .state
            .lock()
            .values()
            .filter(|i| i.status == IntentStatus::Active && i.next_run_at_ms.map(|t| t <= now_ms).unwrap_or(false))
            .map(|i| i.intent_id.clone())
            .collect();
        let mut fired = 0;
        for intent_id in due {
            if self.fire_one(&intent_id, executor).await? {
                fired += 1;
            }
        }
        Ok(fired)
    }

    /// Catch up on a backlog of due intents after a restart (spec §4.5.3).
    /// Groups due intents by `parent_session_id` and round-robins across
    /// sessions, firing at most `max_recovery_catch_ups` intents total;
    /// anything left over is deferred to `now + min_interval_ms`.
    pub async fn recover(&self, executor: Option<&dyn IntentExecutor>) -> Result<HashMap<SessionId, RecoveryReport>, SchedulerError> {
        let now_ms = self.clock.now_ms();
        let mut due: Vec<ScheduleIntent> = self
            .state
            .lock()
            .values()
            .filter(|i| i.status == IntentStatus::Active && i.next_run_at_ms.map(|t| t <= now_ms).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.parent_session_id
                .as_str()
                .cmp(b.parent_session_id.as_str())
                .then(a.intent_id.as_str().cmp(b.intent_id.as_str()))
        });

        let mut order: Vec<SessionId> = Vec::new();
        let mut groups: HashMap<SessionId, VecDeque<IntentId>> = HashMap::new();
        let mut tallies: HashMap<SessionId, SessionTally> = HashMap::new();
        for intent in &due {
            let sid = intent.parent_session_id.clone();
            if !groups.contains_key(&sid) {
                order.push(sid.clone());
                groups.insert(sid.clone(), VecDeque::new());
                tallies.insert(
                    sid.clone(),
                    SessionTally {
                        representative: intent.intent_id.clone(),
                        due: 0,
                        fired: 0,
                        deferred: 0,
                    },
                );
            }
            groups.get_mut(&sid).unwrap().push_back(intent.intent_id.clone());
            tallies.get_mut(&sid).unwrap().due += 1;
        }

        let mut fired_total = 0usize;
        let mut remaining: VecDeque<SessionId> = order.iter().cloned().collect();
        while fired_total < self.config.max_recovery_catch_ups && !remaining.is_empty() {
            let mut next_round = VecDeque::new();
            let mut progressed = false;
            for sid in remaining.drain(..) {
                if fired_total >= self.config.max_recovery_catch_ups {
                    next_round.push_back(sid);
                    continue;
                }
                let queue = groups.get_mut(&sid).expect("group exists for tracked session");
                if let Some(intent_id) = queue.pop_front() {
                    self.fire_one(&intent_id, executor).await?;
                    fired_total += 1;
                    progressed = true;
                    tallies.get_mut(&sid).expect("tally exists for tracked session").fired += 1;
                    if !queue.is_empty() {
                        next_round.push_back(sid);
                    }
                }
            }
            remaining = next_round;
            if !progressed {
                break;
            }
        }

        let deferred_to_ms = now_ms + self.config.min_interval_ms;
        for sid in &order {
            let queue = groups.get_mut(sid).expect("group exists for tracked session");
            for intent_id in queue.drain(..) {
                self.defer(&intent_id, deferred_to_ms)?;
                tallies.get_mut(sid).expect("tally exists for tracked session").deferred += 1;
            }
        }

        let mut reports = HashMap::new();
        for sid in order {
            let tally = tallies.remove(&sid).expect("tally exists for tracked session");
            self.emit_recovery_summary(sid.clone(), tally.representative.clone(), &tally)?;
            reports.insert(
                sid,
                RecoveryReport {
                    due: tally.due as usize,
                    fired: tally.fired as usize,
                    deferred: tally.deferred as usize,
                    execution_enabled: executor.is_some(),
                },
            );
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::clock::FakeClock;
    use tempfile::tempdir;

    fn scheduler(clock: Arc<FakeClock>) -> IntentScheduler {
        let dir = tempdir().unwrap();
        IntentScheduler::open(dir.path().join("events.jsonl"), IntentSchedulerConfig::default(), clock).unwrap()
    }

    fn run_at_schedule(ms: i64) -> IntentSchedule {
        IntentSchedule::RunAt { run_at_ms: ms }
    }

    #[test]
    fn create_then_duplicate_id_rejected() {
        let clock = Arc::new(FakeClock::new(0));
        let scheduler = scheduler(clock);
        let intent_id = IntentId::new("i1");
        scheduler
            .create_intent(
                intent_id.clone(),
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                run_at_schedule(1_000),
                None,
                ConvergenceCondition::None,
            )
            .unwrap();
        let err = scheduler
            .create_intent(
                intent_id,
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                run_at_schedule(2_000),
                None,
                ConvergenceCondition::None,
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::IntentIdAlreadyExists(_)));
    }

    #[test]
    fn per_session_limit_is_enforced() {
        let clock = Arc::new(FakeClock::new(0));
        let mut config = IntentSchedulerConfig::default();
        config.max_active_intents_per_session = 1;
        let dir = tempdir().unwrap();
        let scheduler = IntentScheduler::open(dir.path().join("events.jsonl"), config, clock).unwrap();
        scheduler
            .create_intent(
                IntentId::new("i1"),
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                run_at_schedule(1_000),
                None,
                ConvergenceCondition::None,
            )
            .unwrap();
        let err = scheduler
            .create_intent(
                IntentId::new("i2"),
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                run_at_schedule(1_000),
                None,
                ConvergenceCondition::None,
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MaxActiveIntentsPerSession { .. }));
    }

    #[tokio::test]
    async fn tick_fires_due_intent_and_converges_run_at() {
        let clock = Arc::new(FakeClock::new(0));
        let scheduler = scheduler(clock.clone());
        scheduler
            .create_intent(
                IntentId::new("i1"),
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                run_at_schedule(1_000),
                None,
                ConvergenceCondition::None,
            )
            .unwrap();

        clock.set_ms(1_000);
        let fired = scheduler.tick(None).await.unwrap();
        assert_eq!(fired, 1);
        let intent = scheduler.get(&IntentId::new("i1")).unwrap();
        assert_eq!(intent.status, IntentStatus::Converged);
    }

    #[tokio::test]
    async fn circuit_breaker_cancels_after_repeated_errors() {
        struct FailingExecutor;
        #[async_trait::async_trait]
        impl IntentExecutor for FailingExecutor {
            async fn execute_intent(&self, _intent: &ScheduleIntent) -> IntentExecutionOutcome {
                IntentExecutionOutcome::Err {
                    error: "boom".to_string(),
                }
            }
        }

        let clock = Arc::new(FakeClock::new(0));
        let mut config = IntentSchedulerConfig::default();
        config.max_consecutive_errors = 2;
        let dir = tempdir().unwrap();
        let scheduler = IntentScheduler::open(dir.path().join("events.jsonl"), config, clock.clone()).unwrap();
        scheduler
            .create_intent(
                IntentId::new("i1"),
                SessionId::new("s1"),
                "demo".to_string(),
                ContinuityMode::Fresh,
                IntentSchedule::Cron {
                    expression: "* * * * * *".to_string(),
                    time_zone: None,
                },
                None,
                ConvergenceCondition::None,
            )
            .unwrap();

        let executor = FailingExecutor;
        clock.advance_ms(1_000);
        scheduler.tick(Some(&executor)).await.unwrap();
        clock.advance_ms(1_000);
        scheduler.tick(Some(&executor)).await.unwrap();

        let intent = scheduler.get(&IntentId::new("i1")).unwrap();
        assert_eq!(intent.status, IntentStatus::Cancelled);
        assert!(intent.consecutive_errors >= 2);
    }

    #[tokio::test]
    async fn recover_round_robins_across_sessions_up_to_the_cap() {
        let clock = Arc::new(FakeClock::new(0));
        let mut config = IntentSchedulerConfig::default();
        config.max_recovery_catch_ups = 2;
        config.min_interval_ms = 5_000;
        let dir = tempdir().unwrap();
        let scheduler = IntentScheduler::open(dir.path().join("events.jsonl"), config, clock.clone()).unwrap();

        for (sid, n) in [("s1", 2), ("s2", 2)] {
            for i in 0..n {
                scheduler
                    .create_intent(
                        IntentId::new(format!("{sid}-{i}")),
                        SessionId::new(sid),
                        "demo".to_string(),
                        ContinuityMode::Fresh,
                        run_at_schedule(0),
                        None,
                        ConvergenceCondition::None,
                    )
                    .unwrap();
            }
        }

        let reports = scheduler.recover(None).await.unwrap();
        let total_fired: usize = reports.values().map(|r| r.fired).sum();
        let total_deferred: usize = reports.values().map(|r| r.deferred).sum();
        assert_eq!(total_fired, 2);
        assert_eq!(total_deferred, 2);
        // fairness: each session got exactly one firing before the cap hit.
        for report in reports.values() {
            assert_eq!(report.fired, 1);
        }
    }
}
