// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The heartbeat scheduler: reloads a policy file and fires recurring
//! prompts against sessions via a `SessionDriver` (spec §4.4).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use gwd_core::clock::Clock;
use gwd_core::heartbeat::{HeartbeatPolicy, HeartbeatRule};
use gwd_core::ids::{RuleId, SessionId};

use crate::config::HeartbeatSchedulerConfig;
use crate::driver::SessionDriver;
use crate::error::SchedulerError;

/// Result of a single policy `reload()` (spec §4.4.1).
#[derive(Debug, Clone, Default)]
pub struct ReloadReport {
    pub rule_count: usize,
    pub closed_sessions: Vec<SessionId>,
}

/// One rule firing, ready to be broadcast as `heartbeat.fired` by the
/// gateway (spec §4.4.2).
#[derive(Debug, Clone)]
pub struct HeartbeatFireOutcome {
    pub rule_id: RuleId,
    pub session_id: SessionId,
    pub ts_ms: i64,
    pub has_result: bool,
}

pub struct HeartbeatScheduler {
    config: HeartbeatSchedulerConfig,
    policy_path: PathBuf,
    policy: Mutex<HeartbeatPolicy>,
    /// `rule_id -> (session_id, was_default_form)` as of the last
    /// successful reload, used to detect removed or rebound rules whose
    /// session was never explicitly named.
    tracked_sessions: Mutex<HashMap<RuleId, (SessionId, bool)>>,
    last_fire_at: Mutex<HashMap<RuleId, i64>>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatScheduler {
    pub fn load(
        policy_path: impl AsRef<Path>,
        config: HeartbeatSchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let policy_path = policy_path.as_ref().to_owned();
        let policy = gwd_policy::load_heartbeat_policy(&policy_path)?;
        let tracked_sessions = policy
            .rules
            .iter()
            .map(|r| (r.rule_id.clone(), (r.effective_session_id(), r.session_id.is_none())))
            .collect();
        Ok(Self {
            config,
            policy_path,
            policy: Mutex::new(policy),
            tracked_sessions: Mutex::new(tracked_sessions),
            last_fire_at: Mutex::new(HashMap::new()),
            clock,
        })
    }

    pub fn policy(&self) -> HeartbeatPolicy {
        self.policy.lock().clone()
    }

    /// Re-read the policy file, close cleanup-candidate sessions whose rule
    /// vanished or was rebound to a different session (spec §4.4.1).
    pub async fn reload(&self, driver: &dyn SessionDriver) -> Result<ReloadReport, SchedulerError> {
        let new_policy = gwd_policy::load_heartbeat_policy(&self.policy_path)?;
        let new_sessions: HashMap<RuleId, SessionId> = new_policy
            .rules
            .iter()
            .map(|r| (r.rule_id.clone(), r.effective_session_id()))
            .collect();

        let previous = self.tracked_sessions.lock().clone();
        let mut cleanup_candidates = Vec::new();
        for (rule_id, (old_session, was_default)) in &previous {
            let still_bound_here = match new_sessions.get(rule_id) {
                None => false,
                Some(new_session) => new_session == old_session,
            };
            if !still_bound_here && *was_default {
                cleanup_candidates.push(old_session.clone());
            }
        }

        let still_mapped: HashSet<&SessionId> = new_sessions.values().collect();
        let mut closed_sessions = Vec::new();
        for candidate in cleanup_candidates {
            if still_mapped.contains(&candidate) {
                continue;
            }
            match driver.stop_session(&candidate, "heartbeat_rule_removed").await {
                Ok(()) => closed_sessions.push(candidate),
                Err(error) => {
                    warn!(session_id = %candidate, %error, "failed to close cleanup-candidate heartbeat session");
                }
            }
        }

        let rule_count = new_policy.rules.len();
        let new_tracked = new_policy
            .rules
            .iter()
            .map(|r| (r.rule_id.clone(), (r.effective_session_id(), r.session_id.is_none())))
            .collect();
        self.last_fire_at
            .lock()
            .retain(|rule_id, _| new_policy.rule(rule_id).is_some());
        *self.tracked_sessions.lock() = new_tracked;
        *self.policy.lock() = new_policy;

        Ok(ReloadReport {
            rule_count,
            closed_sessions,
        })
    }

    /// Fire every enabled rule whose interval has elapsed (spec §4.4.2).
    /// Failures are logged at warn and recorded as `has_result: false`;
    /// they never stop the tick from reaching the remaining rules.
    pub async fn tick(&self, driver: &dyn SessionDriver) -> Vec<HeartbeatFireOutcome> {
        let now_ms = self.clock.now_ms();
        let due_rules: Vec<HeartbeatRule> = {
            let policy = self.policy.lock();
            let last_fire_at = self.last_fire_at.lock();
            policy
                .enabled_rules()
                .filter(|rule| match last_fire_at.get(&rule.rule_id) {
                    Some(last) => now_ms.saturating_sub(*last) as u64 >= rule.interval_ms,
                    None => true,
                })
                .cloned()
                .collect()
        };

        let mut outcomes = Vec::with_capacity(due_rules.len());
        for rule in due_rules {
            let session_id = rule.effective_session_id();
            let has_result = self.fire_rule(driver, &rule, &session_id).await;
            self.last_fire_at.lock().insert(rule.rule_id.clone(), now_ms);
            outcomes.push(HeartbeatFireOutcome {
                rule_id: rule.rule_id,
                session_id,
                ts_ms: now_ms,
                has_result,
            });
        }
        outcomes
    }

    async fn fire_rule(&self, driver: &dyn SessionDriver, rule: &HeartbeatRule, session_id: &SessionId) -> bool {
        if let Err(error) = driver.open_session(session_id).await {
            warn!(rule_id = %rule.rule_id, %session_id, %error, "heartbeat open_session failed");
            return false;
        }
        match driver.send_prompt(session_id, &rule.prompt, true).await {
            Ok(()) => true,
            Err(error) => {
                warn!(rule_id = %rule.rule_id, %session_id, %error, "heartbeat send_prompt failed");
                false
            }
        }
    }

    /// Spawn a task that ticks on `config.tick_interval`, invoking
    /// `on_fired` once per rule firing.
    pub fn spawn_tick_loop(
        self: Arc<Self>,
        driver: Arc<dyn SessionDriver>,
        on_fired: impl Fn(HeartbeatFireOutcome) + Send + Sync + 'static,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for outcome in self.tick(driver.as_ref()).await {
                    on_fired(outcome);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gwd_core::clock::FakeClock;
    use parking_lot::Mutex as PMutex;
    use tempfile::tempdir;

    fn write_policy(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("HEARTBEAT.md");
        std::fs::write(&path, body).unwrap();
        path
    }

    struct RecordingDriver {
        opened: PMutex<Vec<SessionId>>,
        prompted: PMutex<Vec<(SessionId, String)>>,
        stopped: PMutex<Vec<(SessionId, String)>>,
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self {
                opened: PMutex::new(Vec::new()),
                prompted: PMutex::new(Vec::new()),
                stopped: PMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SessionDriver for RecordingDriver {
        async fn open_session(&self, session_id: &SessionId) -> Result<(), String> {
            self.opened.lock().push(session_id.clone());
            Ok(())
        }

        async fn send_prompt(&self, session_id: &SessionId, prompt: &str, _wait: bool) -> Result<(), String> {
            self.prompted.lock().push((session_id.clone(), prompt.to_string()));
            Ok(())
        }

        async fn stop_session(&self, session_id: &SessionId, reason: &str) -> Result<(), String> {
            self.stopped.lock().push((session_id.clone(), reason.to_string()));
            Ok(())
        }
    }

    fn sample_policy_body() -> &'static str {
        "# heartbeat policy\n\n```toml\n[[rule]]\nrule_id = \"daily\"\nprompt = \"check in\"\ninterval_ms = 1000\n```\n"
    }

    #[tokio::test]
    async fn due_rule_fires_and_records_last_fire_at() {
        let dir = tempdir().unwrap();
        let path = write_policy(dir.path(), sample_policy_body());
        let clock = Arc::new(FakeClock::new(0));
        let scheduler = HeartbeatScheduler::load(&path, HeartbeatSchedulerConfig::default(), clock.clone()).unwrap();
        let driver = RecordingDriver::new();

        let outcomes = scheduler.tick(&driver).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].has_result);
        assert_eq!(driver.opened.lock().len(), 1);

        // Not due yet: no time has passed.
        let outcomes = scheduler.tick(&driver).await;
        assert!(outcomes.is_empty());

        clock.advance_ms(1_000);
        let outcomes = scheduler.tick(&driver).await;
        assert_eq!(outcomes.len(), 1);
    }

    #[tokio::test]
    async fn reload_closes_default_session_for_removed_rule() {
        let dir = tempdir().unwrap();
        let path = write_policy(dir.path(), sample_policy_body());
        let clock = Arc::new(FakeClock::new(0));
        let scheduler = HeartbeatScheduler::load(&path, HeartbeatSchedulerConfig::default(), clock).unwrap();
        let driver = RecordingDriver::new();

        std::fs::write(&path, "# heartbeat policy\n\n```toml\n```\n").unwrap();
        let report = scheduler.reload(&driver).await.unwrap();

        assert_eq!(report.rule_count, 0);
        assert_eq!(report.closed_sessions, vec![SessionId::new("heartbeat:daily")]);
        assert_eq!(driver.stopped.lock().len(), 1);
    }

    #[tokio::test]
    async fn reload_keeps_session_alive_when_another_rule_still_maps_to_it() {
        let dir = tempdir().unwrap();
        let body = "# heartbeat policy\n\n```toml\n[[rule]]\nrule_id = \"daily\"\nprompt = \"check in\"\ninterval_ms = 1000\n\n[[rule]]\nrule_id = \"other\"\nprompt = \"check in\"\ninterval_ms = 1000\nsession_id = \"heartbeat:daily\"\n```\n";
        let path = write_policy(dir.path(), body);
        let clock = Arc::new(FakeClock::new(0));
        let scheduler = HeartbeatScheduler::load(&path, HeartbeatSchedulerConfig::default(), clock).unwrap();
        let driver = RecordingDriver::new();

        // "daily" (the owner of the default-form session) is removed, but
        // "other" still explicitly points at "heartbeat:daily" — the
        // session must not be closed.
        let body = "# heartbeat policy\n\n```toml\n[[rule]]\nrule_id = \"other\"\nprompt = \"check in\"\ninterval_ms = 1000\nsession_id = \"heartbeat:daily\"\n```\n";
        std::fs::write(&path, body).unwrap();
        let report = scheduler.reload(&driver).await.unwrap();
        assert!(report.closed_sessions.is_empty());
    }
}
