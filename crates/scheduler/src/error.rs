// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types surfaced by the heartbeat and intent schedulers (spec §4.4,
//! §4.5).

use thiserror::Error;

use gwd_core::error::GatewayError;
use gwd_core::ids::IntentId;
use gwd_policy::{PolicyError, ScheduleValidationError};
use gwd_storage::ScheduleLogError;

use crate::projection::ProjectionError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("intent id already exists: {0}")]
    IntentIdAlreadyExists(IntentId),
    #[error("intent not found: {0}")]
    IntentNotFound(IntentId),
    #[error("max active intents per session reached ({current}/{max})")]
    MaxActiveIntentsPerSession { current: usize, max: usize },
    #[error("max active intents globally reached ({current}/{max})")]
    MaxActiveIntentsGlobal { current: usize, max: usize },
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleValidationError),
    #[error("schedule event log error: {0}")]
    Log(#[from] ScheduleLogError),
    #[error("heartbeat policy error: {0}")]
    Policy(#[from] PolicyError),
}

impl From<ProjectionError> for SchedulerError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::IntentIdAlreadyExists(id) => SchedulerError::IntentIdAlreadyExists(id),
            ProjectionError::IntentNotFound(id) => SchedulerError::IntentNotFound(id),
        }
    }
}

impl SchedulerError {
    /// Map to the closed wire error taxonomy for the gateway (spec §4.1.3,
    /// §4.5.5).
    pub fn to_gateway_error(&self) -> GatewayError {
        match self {
            SchedulerError::IntentIdAlreadyExists(_) => {
                GatewayError::bad_state("intent_id_already_exists", self.to_string())
            }
            SchedulerError::IntentNotFound(_) => {
                GatewayError::bad_state("intent_not_found", self.to_string())
            }
            SchedulerError::MaxActiveIntentsPerSession { .. } => {
                GatewayError::bad_state("max_active_intents_per_session", self.to_string())
                    .with_retryable(true)
            }
            SchedulerError::MaxActiveIntentsGlobal { .. } => {
                GatewayError::bad_state("max_active_intents_global", self.to_string())
                    .with_retryable(true)
            }
            SchedulerError::InvalidSchedule(ScheduleValidationError::InvalidCron { .. }) => {
                GatewayError::invalid_request(self.to_string())
                    .with_details(serde_json::json!({ "kind": "invalid_cron" }))
            }
            SchedulerError::InvalidSchedule(ScheduleValidationError::UnknownTimeZone(_)) => {
                GatewayError::invalid_request(self.to_string())
                    .with_details(serde_json::json!({ "kind": "invalid_time_zone" }))
            }
            other => GatewayError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_intent_id_is_bad_state() {
        let err = SchedulerError::IntentIdAlreadyExists(IntentId::new("i1"));
        let gw = err.to_gateway_error();
        assert_eq!(gw.details.unwrap()["kind"], "intent_id_already_exists");
    }

    #[test]
    fn limit_errors_are_retryable() {
        let err = SchedulerError::MaxActiveIntentsGlobal { current: 5, max: 5 };
        assert_eq!(err.to_gateway_error().retryable, Some(true));
    }
}
