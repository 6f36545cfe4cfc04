// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed wire error taxonomy (spec §6.3) shared by every crate that can
//! surface a failure to a gateway client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of wire-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    MethodNotFound,
    Unauthorized,
    BadState,
    Internal,
}

/// A structured gateway-facing error: `{code, message, retryable?, details?}`.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: None,
            details: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("unknown method: {method}"))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// `BAD_STATE` with a `details.kind` discriminator, as used throughout
    /// §4.1.3/§4.2/§4.3 for capacity and state-precondition failures.
    pub fn bad_state(kind: &str, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadState,
            message: message.into(),
            retryable: None,
            details: Some(serde_json::json!({ "kind": kind })),
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_state_carries_kind_in_details() {
        let err = GatewayError::bad_state("worker_limit", "at capacity").with_retryable(true);
        assert_eq!(err.code, ErrorCode::BadState);
        assert_eq!(err.retryable, Some(true));
        assert_eq!(err.details.unwrap()["kind"], "worker_limit");
    }

    #[test]
    fn serializes_with_screaming_snake_code() {
        let err = GatewayError::invalid_request("bad");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INVALID_REQUEST");
    }
}
