// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor tunables (spec §4.2.1, §4.2.2, §4.2.4).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum concurrently-live worker child processes.
    pub max_workers: usize,
    /// Maximum number of `open_session` callers allowed to wait for a slot
    /// once `max_workers` is saturated.
    pub max_open_queue: usize,
    /// How long a worker has to send its `ready` frame after spawn.
    pub ready_timeout: Duration,
    /// How long a `send`/`abort`/`shutdown` RPC waits for its `result`.
    pub rpc_timeout: Duration,
    /// Interval between `bridge.ping` frames sent to a live worker.
    pub bridge_ping_interval: Duration,
    /// How long without a `bridge.heartbeat` before a worker is considered
    /// wedged and stopped.
    pub bridge_heartbeat_timeout: Duration,
    /// A session idle this long (no activity) is eligible for reaping.
    pub session_idle_ttl: Duration,
    /// Worker command line, e.g. `["gwd-worker-agent"]`.
    pub worker_command: Vec<String>,
    pub max_payload_bytes: usize,
}

impl SupervisorConfig {
    /// Idle-reap sweep interval per spec §4.2.4: `min(30s, ttl/2)`.
    pub fn reap_interval(&self) -> Duration {
        std::cmp::min(Duration::from_secs(30), self.session_idle_ttl / 2)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_open_queue: 16,
            ready_timeout: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(300),
            bridge_ping_interval: Duration::from_secs(4),
            bridge_heartbeat_timeout: Duration::from_secs(20),
            session_idle_ttl: Duration::from_secs(1800),
            worker_command: vec!["gwd-worker-agent".to_string()],
            max_payload_bytes: 8 << 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reap_interval_is_capped_at_30s() {
        let mut config = SupervisorConfig::default();
        config.session_idle_ttl = Duration::from_secs(3600);
        assert_eq!(config.reap_interval(), Duration::from_secs(30));
    }

    #[test]
    fn reap_interval_follows_short_ttl() {
        let mut config = SupervisorConfig::default();
        config.session_idle_ttl = Duration::from_secs(20);
        assert_eq!(config.reap_interval(), Duration::from_secs(10));
    }
}
