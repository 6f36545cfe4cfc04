// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tuning knobs (spec §4.4, §4.5.5).

use std::time::Duration;

/// Heartbeat tick cadence. The policy's own per-rule `interval_ms` governs
/// how often a given rule fires; this is just how often the scheduler
/// checks which rules are due (spec §4.4.2: "a timer ticks at the
/// configured interval (≥1s)").
#[derive(Debug, Clone)]
pub struct HeartbeatSchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for HeartbeatSchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentSchedulerConfig {
    pub max_active_intents_per_session: usize,
    pub max_active_intents_global: usize,
    pub min_interval_ms: i64,
    pub max_consecutive_errors: u32,
    pub max_recovery_catch_ups: usize,
    pub tick_interval: Duration,
}

impl Default for IntentSchedulerConfig {
    fn default() -> Self {
        Self {
            max_active_intents_per_session: 50,
            max_active_intents_global: 500,
            min_interval_ms: 1_000,
            max_consecutive_errors: 5,
            max_recovery_catch_ups: 25,
            tick_interval: Duration::from_secs(1),
        }
    }
}
