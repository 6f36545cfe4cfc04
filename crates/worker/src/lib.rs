// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The worker bridge: spawning a session's child process and speaking the
//! parent<->worker wire protocol over its stdio (spec §4.2.2).

pub mod adapter;
pub mod bridge;
pub mod spawn;
pub mod subprocess;

pub use adapter::{ChildWorkerAdapter, WorkerAdapter};
pub use bridge::{ParentMessage, ReadyPayload, WorkerMessage};
pub use spawn::{spawn_child, WorkerError, WorkerProcess, WorkerSpawnConfig};
pub use subprocess::{kill_pid, process_exists};

#[cfg(any(test, feature = "test-support"))]
pub use adapter::FakeWorkerAdapter;
