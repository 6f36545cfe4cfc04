// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration (spec §6.1, §6.4, §6.5). Layering is CLI flags >
//! `GATEWAY_*` environment variables > these defaults, resolved once by the
//! CLI before it either runs the daemon in-process (`--foreground`) or
//! spawns `gatewayd` (`--detach`), mirroring the teacher's `GATEWAY_*`/
//! `OJ_*` environment-variable convention in `daemon/src/env.rs`.

use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Set on worker children so they never mistake themselves for the parent
/// gateway process (spec §6.5); must not be propagated when a worker spawns
/// further children of its own.
pub const WORKER_ENV_VAR: &str = "GATEWAY_WORKER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("host {host:?} does not resolve to a loopback address")]
    NotLoopback { host: String },
    #[error("failed to resolve host {host:?}: {source}")]
    Resolve { host: String, source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub state_dir: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub token_file: PathBuf,
    pub heartbeat_policy_path: PathBuf,
    pub children_registry_path: PathBuf,
    pub turn_wal_dir: PathBuf,
    pub schedule_log_path: PathBuf,
    pub cwd: Option<PathBuf>,
    pub worker_config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub enable_extensions: bool,
    pub tick_interval_ms: u64,
    pub session_idle_ms: u64,
    pub max_workers: usize,
    pub max_open_queue: usize,
    pub max_payload_bytes: usize,
    pub wait_ms: u64,
    pub mirror_stdout: bool,
}

impl Config {
    /// Build a config rooted at `state_dir`, applying every other default
    /// from §6.4's persisted-state layout.
    pub fn with_state_dir(state_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4777,
            pid_file: state_dir.join("gateway.pid.json"),
            log_file: state_dir.join("gateway.log"),
            token_file: state_dir.join("gateway.token"),
            heartbeat_policy_path: state_dir.join("HEARTBEAT.md"),
            children_registry_path: state_dir.join("children.json"),
            turn_wal_dir: state_dir.join("wal"),
            schedule_log_path: state_dir.join("schedule").join("events.jsonl"),
            cwd: None,
            worker_config_path: None,
            model: None,
            enable_extensions: false,
            tick_interval_ms: 1_000,
            session_idle_ms: 1_800_000,
            max_workers: 8,
            max_open_queue: 16,
            max_payload_bytes: 8 << 20,
            wait_ms: 2_000,
            mirror_stdout: false,
            state_dir,
        }
    }

    /// Default state directory: `$GATEWAY_STATE_DIR`, else `~/.gateway`.
    pub fn default_state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("GATEWAY_STATE_DIR") {
            return PathBuf::from(dir);
        }
        dirs_home().join(".gateway")
    }

    /// Load defaults, then apply `GATEWAY_*` environment overrides. CLI
    /// flags are applied on top by the caller (`gwd-cli`).
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::with_state_dir(Self::default_state_dir());

        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(model) = std::env::var("GATEWAY_MODEL") {
            config.model = Some(model);
        }
        if std::env::var("GATEWAY_ENABLE_EXTENSIONS").is_ok() {
            config.enable_extensions = true;
        }

        config.validate_loopback()?;
        Ok(config)
    }

    /// Reject any host that does not resolve to a loopback address (spec
    /// §4.1, §6.2: "only loopback hosts are permitted").
    pub fn validate_loopback(&self) -> Result<(), ConfigError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| ConfigError::Resolve {
                host: self.host.clone(),
                source,
            })?;
        for addr in addrs {
            if !addr.ip().is_loopback() {
                return Err(ConfigError::NotLoopback {
                    host: self.host.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_millis(self.session_idle_ms)
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_host_validates() {
        let config = Config::with_state_dir(PathBuf::from("/tmp/gwtest"));
        config.validate_loopback().expect("loopback ok");
    }

    #[test]
    fn non_loopback_host_is_rejected() {
        let mut config = Config::with_state_dir(PathBuf::from("/tmp/gwtest"));
        config.host = "8.8.8.8".to_string();
        assert!(matches!(config.validate_loopback(), Err(ConfigError::NotLoopback { .. })));
    }

    #[test]
    fn state_dir_derives_every_persisted_path() {
        let config = Config::with_state_dir(PathBuf::from("/tmp/gwtest"));
        assert_eq!(config.pid_file, PathBuf::from("/tmp/gwtest/gateway.pid.json"));
        assert_eq!(config.token_file, PathBuf::from("/tmp/gwtest/gateway.token"));
    }
}
