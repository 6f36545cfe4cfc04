// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gwd-scheduler: the heartbeat scheduler and the intent scheduler (spec
//! §4.4, §4.5). Both drive the session supervisor through the narrow
//! `SessionDriver`/`IntentExecutor` callbacks in [`driver`] rather than
//! depending on `gwd-supervisor` directly.

pub mod config;
pub mod driver;
pub mod error;
pub mod heartbeat;
pub mod intent;
pub mod projection;

pub use config::{HeartbeatSchedulerConfig, IntentSchedulerConfig};
pub use driver::{IntentExecutionOutcome, IntentExecutor, SessionDriver};
pub use error::SchedulerError;
pub use heartbeat::{HeartbeatFireOutcome, HeartbeatScheduler, ReloadReport};
pub use intent::{IntentScheduler, RecoveryReport};
