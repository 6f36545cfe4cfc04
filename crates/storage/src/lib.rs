// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for the agent gateway daemon: the turn WAL, the
//! schedule-intent event log, and the small atomic-file-backed stores
//! (auth token, PID record, registry snapshot).

pub mod atomic;
pub mod logger;
pub mod pidfile;
pub mod registry;
pub mod schedule_log;
pub mod token;
pub mod wal;

pub use atomic::{load_json, save_json, AtomicFileError};
pub use pidfile::{PidFileError, PidLock};
pub use registry::{Registry, RegistryEntry};
pub use schedule_log::{ScheduleLog, ScheduleLogError};
pub use token::{TokenStore, TokenStoreError};
pub use wal::{TurnWalStore, WalError};
