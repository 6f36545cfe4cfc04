// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logger setup (spec §4.7). Byte-size rotation happens once at
//! startup (before the subscriber is installed); `tracing-appender`'s
//! non-blocking writer handles the rest of the process lifetime.

use std::path::Path;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rotate the log file once it exceeds this size (10 MiB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Keep this many rotated copies (`.1`, `.2`, `.3`) alongside the live file.
const MAX_ROTATED_LOGS: u32 = 3;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log path has no parent directory or file name: {0}")]
    InvalidPath(std::path::PathBuf),
}

/// Rotate `log_path` if it has grown past [`MAX_LOG_SIZE`]. Best-effort:
/// failures to stat or rename are swallowed, since a rotation failure should
/// never prevent the daemon from starting.
pub fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Install the global `tracing` subscriber: a non-blocking file writer, with
/// an optional stdout mirror for interactive/foreground runs. Returns the
/// `WorkerGuard`(s) that must be kept alive for the life of the process —
/// dropping them flushes any buffered log lines.
pub fn setup_logging(
    log_path: &Path,
    mirror_stdout: bool,
) -> Result<Vec<tracing_appender::non_blocking::WorkerGuard>, LoggerError> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = log_path
        .parent()
        .ok_or_else(|| LoggerError::InvalidPath(log_path.to_owned()))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| LoggerError::InvalidPath(log_path.to_owned()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let mut guards = vec![file_guard];

    if mirror_stdout {
        let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(stdout_guard);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(non_blocking))
            .with(fmt::layer().with_writer(stdout_writer).with_ansi(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(non_blocking))
            .init();
    }

    Ok(guards)
}

/// Startup marker prefix. The CLI's `logs` subcommand uses this to find
/// where the current run begins when tailing the log file.
const STARTUP_MARKER_PREFIX: &str = "--- gatewayd: starting (pid: ";

/// Write the startup marker synchronously, before the tracing subscriber is
/// installed, so it survives even if the process fails to start cleanly.
pub fn write_startup_marker(log_path: &Path) -> Result<(), LoggerError> {
    use std::io::Write;

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}
