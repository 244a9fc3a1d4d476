//! Stable, machine-readable error taxonomy shared across the workspace.
//!
//! Every fallible operation in the orchestration nucleus resolves to one of
//! the kinds below. The mapping from kind to HTTP status and to event
//! payload (`operation.failed { reason }`) lives here so callers never have
//! to invent their own.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::BTreeMap;

/// Error category. Mirrors the taxonomy kinds, not Rust type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    TransientIo,
    ChainIntegrity,
    PolicyDeny,
    Cancellation,
    Internal,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::TransientIo => "transient_io",
            ErrorCategory::ChainIntegrity => "chain_integrity",
            ErrorCategory::PolicyDeny => "policy_deny",
            ErrorCategory::Cancellation => "cancellation",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the orchestration nucleus.
#[derive(Debug, thiserror::Error)]
pub enum HiveForgeError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        context: BTreeMap<String, String>,
    },

    #[error("not found: {what} {id}")]
    NotFound { what: &'static str, id: String },

    #[error("transient I/O failure: {message}")]
    TransientIo {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("chain integrity violation on stream {stream_id}: {message}")]
    ChainIntegrity { stream_id: String, message: String },

    #[error("policy denied: {reason}")]
    PolicyDeny { reason: String },

    #[error("cancelled: {reason}")]
    Cancellation { reason: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HiveForgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        HiveForgeError::Validation {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn validation_with_context(
        message: impl Into<String>,
        context: BTreeMap<String, String>,
    ) -> Self {
        HiveForgeError::Validation {
            message: message.into(),
            context,
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        HiveForgeError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        HiveForgeError::TransientIo {
            message: message.into(),
            source: None,
        }
    }

    pub fn chain_integrity(stream_id: impl Into<String>, message: impl Into<String>) -> Self {
        HiveForgeError::ChainIntegrity {
            stream_id: stream_id.into(),
            message: message.into(),
        }
    }

    pub fn policy_deny(reason: impl Into<String>) -> Self {
        HiveForgeError::PolicyDeny {
            reason: reason.into(),
        }
    }

    pub fn cancellation(reason: impl Into<String>) -> Self {
        HiveForgeError::Cancellation {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HiveForgeError::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            HiveForgeError::Validation { .. } => ErrorCategory::Validation,
            HiveForgeError::NotFound { .. } => ErrorCategory::NotFound,
            HiveForgeError::TransientIo { .. } => ErrorCategory::TransientIo,
            HiveForgeError::ChainIntegrity { .. } => ErrorCategory::ChainIntegrity,
            HiveForgeError::PolicyDeny { .. } => ErrorCategory::PolicyDeny,
            HiveForgeError::Cancellation { .. } => ErrorCategory::Cancellation,
            HiveForgeError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code, e.g. for log correlation and for the
    /// `reason` field of `operation.failed` event payloads.
    pub fn code(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "HF-VALIDATION",
            ErrorCategory::NotFound => "HF-NOT-FOUND",
            ErrorCategory::TransientIo => "HF-TRANSIENT-IO",
            ErrorCategory::ChainIntegrity => "HF-CHAIN-INTEGRITY",
            ErrorCategory::PolicyDeny => "HF-POLICY-DENY",
            ErrorCategory::Cancellation => "HF-CANCELLATION",
            ErrorCategory::Internal => "HF-INTERNAL",
        }
    }

    /// Whether the retry policy in `hf-retry` should consider this
    /// retryable. Only transient I/O qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::TransientIo)
    }

    fn http_status(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::TransientIo => StatusCode::BAD_REQUEST,
            ErrorCategory::ChainIntegrity => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::PolicyDeny => StatusCode::BAD_REQUEST,
            ErrorCategory::Cancellation => StatusCode::BAD_REQUEST,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human message safe to return over the wire. Never includes
    /// source chains or internal detail — those go to `tracing` only.
    fn public_detail(&self) -> String {
        match self.category() {
            ErrorCategory::Internal => "internal error".to_string(),
            ErrorCategory::ChainIntegrity => {
                format!("chain integrity violation: {self}")
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for HiveForgeError {
    fn into_response(self) -> Response {
        if matches!(self.category(), ErrorCategory::Internal) {
            tracing::error!(error = %self, code = self.code(), "internal error");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request error");
        }
        let status = self.http_status();
        let body = ErrorBody {
            detail: self.public_detail(),
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HiveForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_expected_codes() {
        assert_eq!(HiveForgeError::validation("x").code(), "HF-VALIDATION");
        assert_eq!(
            HiveForgeError::not_found("run", "abc").code(),
            "HF-NOT-FOUND"
        );
        assert_eq!(
            HiveForgeError::chain_integrity("s1", "bad").code(),
            "HF-CHAIN-INTEGRITY"
        );
    }

    #[test]
    fn only_transient_io_is_retryable() {
        assert!(HiveForgeError::transient_io("blip").is_retryable());
        assert!(!HiveForgeError::validation("bad").is_retryable());
        assert!(!HiveForgeError::cancellation("stop").is_retryable());
    }

    #[test]
    fn internal_detail_never_leaks_message() {
        let err = HiveForgeError::internal("sensitive stack detail");
        assert_eq!(err.public_detail(), "internal error");
    }
}
