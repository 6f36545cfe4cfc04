// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess termination helpers shared by the worker bridge and the
//! session supervisor's orphan cleanup (spec §4.2.3, §4.2.5).

use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Grace period between SIGTERM and SIGKILL when stopping a worker child.
pub const TERM_GRACE: Duration = Duration::from_secs(3);

/// Send SIGTERM to a pid via the `kill` binary, matching the shell-out used
/// throughout the daemon's own process management rather than a signal FFI
/// dependency.
async fn send_term(pid: u32) {
    let _ = Command::new("kill")
        .args(["-15", &pid.to_string()])
        .output()
        .await;
}

/// Ask a child to exit via SIGTERM, escalating to `Child::kill` (SIGKILL) if
/// it has not exited within `grace`.
pub async fn terminate_then_kill(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        send_term(pid).await;
    }

    if timeout(grace, child.wait()).await.is_ok() {
        return;
    }

    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Whether a pid is still alive, via `kill -0`.
pub async fn process_exists(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// SIGTERM-then-SIGKILL a pid we don't own a `Child` handle for, used by the
/// supervisor's startup orphan reclaim (spec §4.2.5) where only the pid
/// persisted in the registry snapshot survives a crash.
pub async fn kill_pid(pid: u32, grace: Duration) {
    send_term(pid).await;
    tokio::time::sleep(grace).await;
    if process_exists(pid).await {
        let _ = Command::new("kill")
            .args(["-9", &pid.to_string()])
            .output()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminate_then_kill_reaps_a_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("pid");
        terminate_then_kill(&mut child, Duration::from_millis(200)).await;
        let status = child.try_wait().expect("try_wait");
        assert!(status.is_some());
        assert!(!process_exists(pid).await);
    }

    #[tokio::test]
    async fn process_exists_is_true_for_the_current_process() {
        assert!(process_exists(std::process::id()).await);
    }

    #[tokio::test]
    async fn kill_pid_reaps_an_orphaned_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("pid");
        kill_pid(pid, Duration::from_millis(200)).await;
        let _ = child.wait().await;
        assert!(!process_exists(pid).await);
    }
}
