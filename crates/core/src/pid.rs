// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID record type (spec §3 "PID record").

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted JSON record identifying the running daemon process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub started_at_ms: i64,
    pub cwd: PathBuf,
}
