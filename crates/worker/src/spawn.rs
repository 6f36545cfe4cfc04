// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning a worker child process and speaking the bridge protocol over its
//! stdio (spec §4.2.2, §4.2.3 `open_session`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;

use gwd_core::framing::{self, FramingError};
use gwd_core::ids::SessionId;

use crate::bridge::{ParentMessage, WorkerMessage};
use crate::subprocess::{terminate_then_kill, TERM_GRACE};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("spawn failed: {0}")]
    SpawnFailed(std::io::Error),
    #[error("bridge framing error: {0}")]
    Framing(#[from] FramingError),
}

/// Parameters resolved by the supervisor before spawning a worker child
/// (spec §3 "Session worker handle").
#[derive(Debug, Clone)]
pub struct WorkerSpawnConfig {
    /// Executable and arguments for the worker child process.
    pub command: Vec<String>,
    pub session_id: SessionId,
    pub cwd: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub agent_id: Option<String>,
    pub enable_extensions: bool,
    pub parent_pid: u32,
    pub max_payload_bytes: usize,
}

/// A live worker child process with its bridge stdio attached.
pub struct WorkerProcess {
    pid: u32,
    child: Option<Child>,
    reader: BufReader<Box<dyn AsyncRead + Unpin + Send>>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    max_payload_bytes: usize,
}

impl WorkerProcess {
    /// Wrap an already-open duplex pair (used by the real child spawner and
    /// by test doubles that hand back an in-memory pipe instead of a real
    /// process).
    pub fn new(
        pid: u32,
        child: Option<Child>,
        reader: Box<dyn AsyncRead + Unpin + Send>,
        writer: Box<dyn AsyncWrite + Unpin + Send>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            pid,
            child,
            reader: BufReader::new(reader),
            writer,
            max_payload_bytes,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub async fn write_message(&mut self, msg: &ParentMessage) -> Result<(), WorkerError> {
        let payload = framing::encode(msg, self.max_payload_bytes)?;
        framing::write_frame(&mut self.writer, &payload, self.max_payload_bytes).await?;
        Ok(())
    }

    pub async fn read_message(&mut self) -> Result<WorkerMessage, WorkerError> {
        let payload = framing::read_frame(&mut self.reader, self.max_payload_bytes).await?;
        Ok(framing::decode(&payload)?)
    }

    pub async fn read_message_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<WorkerMessage, WorkerError> {
        let payload =
            framing::read_frame_timeout(&mut self.reader, self.max_payload_bytes, timeout).await?;
        Ok(framing::decode(&payload)?)
    }

    /// Terminate the child: SIGTERM, wait [`TERM_GRACE`], then SIGKILL if
    /// still alive. A no-op for test doubles with no real process attached.
    pub async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            terminate_then_kill(child, TERM_GRACE).await;
        }
    }
}

/// Spawn a real worker child process, wiring its stdio into the bridge
/// framing protocol and forwarding its stderr lines to the tracing log.
pub async fn spawn_child(config: &WorkerSpawnConfig) -> Result<WorkerProcess, WorkerError> {
    let (program, args) = config
        .command
        .split_first()
        .expect("worker command must be non-empty");

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(config_path) = &config.config_path {
        cmd.env("GWD_WORKER_CONFIG_PATH", config_path);
    }
    if let Some(model) = &config.model {
        cmd.env("GWD_WORKER_MODEL", model);
    }
    if let Some(agent_id) = &config.agent_id {
        cmd.env("GWD_WORKER_AGENT_ID", agent_id);
    }
    cmd.env("GWD_WORKER_SESSION_ID", config.session_id.as_str());
    cmd.env("GWD_WORKER_PARENT_PID", config.parent_pid.to_string());
    cmd.env(
        "GWD_WORKER_ENABLE_EXTENSIONS",
        if config.enable_extensions { "1" } else { "0" },
    );
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(WorkerError::SpawnFailed)?;
    let pid = child.id().unwrap_or(0);

    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let session_id = config.session_id.clone();
    tokio::spawn(forward_stderr(stderr, session_id));

    Ok(WorkerProcess::new(
        pid,
        Some(child),
        Box::new(stdout),
        Box::new(stdin),
        config.max_payload_bytes,
    ))
}

async fn forward_stderr(stderr: tokio::process::ChildStderr, session_id: SessionId) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(%session_id, worker_stderr = %line, "worker child stderr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_child_writes_frames_to_a_live_process() {
        let config = WorkerSpawnConfig {
            command: vec!["cat".to_string()],
            session_id: SessionId::new("s1"),
            cwd: None,
            config_path: None,
            model: None,
            agent_id: None,
            enable_extensions: false,
            parent_pid: std::process::id(),
            max_payload_bytes: 1 << 20,
        };
        let mut process = spawn_child(&config).await.expect("spawn");
        assert!(process.pid() > 0);
        process
            .write_message(&ParentMessage::BridgePing { ts_ms: 1 })
            .await
            .expect("write");
        // `cat` echoes the exact bytes back; since both message enums use
        // `kind = "bridge.ping"`/`"bridge.heartbeat"` as distinct tags this
        // would fail to decode as a `WorkerMessage`, so just confirm the
        // child is alive and reapable rather than decoding the echo.
        process.kill().await;
    }
}
