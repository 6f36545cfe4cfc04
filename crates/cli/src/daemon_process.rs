// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning and probing the `gatewayd` binary for `start --detach`.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::client::{self, ClientError};

/// Spawn `gatewayd` as a detached background process.
pub fn spawn_background(config_overrides: &[(&str, String)]) -> Result<Child, ClientError> {
    let binary = find_gatewayd_binary();
    let mut command = Command::new(&binary);
    for (key, value) in config_overrides {
        command.env(key, value);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClientError::StartFailed(format!("failed to spawn {}: {e}", binary.display())))
}

/// Locate the `gatewayd` binary: `$GATEWAY_DAEMON_BIN`, else a sibling of
/// the running CLI binary, else bare `gatewayd` resolved via `PATH`.
fn find_gatewayd_binary() -> PathBuf {
    if let Ok(path) = std::env::var("GATEWAY_DAEMON_BIN") {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("gatewayd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("gatewayd")
}

/// Poll until the gateway accepts a TCP connection, an early-exited child
/// is detected, or `timeout` elapses.
pub async fn wait_until_reachable(host: &str, port: u16, mut child: Child, timeout: Duration) -> Result<(), ClientError> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(ClientError::StartFailed(format!("gatewayd exited with {status}")));
        }
        if client::probe(host, port, Duration::from_millis(100)).await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(ClientError::StartTimeout)
}

/// Check if a process with the given pid is alive (signal 0).
pub fn process_exists(pid: u32) -> bool {
    send_signal(pid, "-0")
}

/// Send SIGTERM to a pid.
pub fn terminate(pid: u32) -> bool {
    send_signal(pid, "-15")
}

/// Send SIGKILL to a pid.
pub fn force_kill(pid: u32) -> bool {
    send_signal(pid, "-9")
}

fn send_signal(pid: u32, signal: &str) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
