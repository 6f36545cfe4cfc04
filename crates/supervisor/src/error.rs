// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types surfaced by the session supervisor (spec §4.2).

use thiserror::Error;

use gwd_core::error::GatewayError;

/// Admission-control failure detail (spec §4.2.1).
#[derive(Debug, Clone)]
pub struct AdmissionDetails {
    pub max_workers: usize,
    pub current_workers: usize,
    pub queue_depth: usize,
    pub max_queue_depth: usize,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("worker capacity exhausted ({current}/{max} workers, queue {depth}/{max_depth})")]
    WorkerLimit {
        max: usize,
        current: usize,
        depth: usize,
        max_depth: usize,
    },
    #[error("open queue full ({depth}/{max_depth})")]
    OpenQueueFull { depth: usize, max_depth: usize },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("turn id already active on this worker: {0}")]
    DuplicateActiveTurnId(String),
    #[error("worker spawn failed: {0}")]
    SpawnFailed(String),
    #[error("worker did not become ready: {0}")]
    ReadyFailed(String),
    #[error("worker RPC timed out")]
    RpcTimeout,
    #[error("worker exited: {0}")]
    WorkerExited(String),
    #[error("session is busy")]
    SessionBusy,
    #[error("admission wait was cancelled")]
    AdmissionCancelled,
}

impl SupervisorError {
    /// Map to the closed wire error taxonomy for the gateway (spec §4.1.3).
    /// `worker_limit` is retryable; the others that can reach a client are
    /// not.
    pub fn to_gateway_error(&self) -> GatewayError {
        match self {
            SupervisorError::WorkerLimit {
                max,
                current,
                depth,
                max_depth,
            } => GatewayError::bad_state("worker_limit", self.to_string()).with_details(
                serde_json::json!({
                    "kind": "worker_limit",
                    "max_workers": max,
                    "current_workers": current,
                    "queue_depth": depth,
                    "max_queue_depth": max_depth,
                }),
            ).with_retryable(true),
            SupervisorError::OpenQueueFull { depth, max_depth } => {
                GatewayError::bad_state("open_queue_full", self.to_string()).with_details(
                    serde_json::json!({
                        "kind": "open_queue_full",
                        "queue_depth": depth,
                        "max_queue_depth": max_depth,
                    }),
                )
            }
            SupervisorError::SessionNotFound(_) => {
                GatewayError::bad_state("session_not_found", self.to_string())
            }
            SupervisorError::DuplicateActiveTurnId(_) => {
                GatewayError::bad_state("duplicate_active_turn_id", self.to_string())
            }
            SupervisorError::SessionBusy => {
                GatewayError::bad_state("session_busy", self.to_string())
            }
            other => GatewayError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_limit_is_retryable() {
        let err = SupervisorError::WorkerLimit {
            max: 4,
            current: 4,
            depth: 0,
            max_depth: 0,
        };
        let gw = err.to_gateway_error();
        assert_eq!(gw.retryable, Some(true));
        assert_eq!(gw.details.unwrap()["kind"], "worker_limit");
    }

    #[test]
    fn open_queue_full_is_not_marked_retryable() {
        let err = SupervisorError::OpenQueueFull {
            depth: 2,
            max_depth: 2,
        };
        let gw = err.to_gateway_error();
        assert_eq!(gw.retryable, None);
    }
}
