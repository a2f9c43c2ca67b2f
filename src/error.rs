//! Gateway error taxonomy and its HTTP mapping

use crate::backend::{BackendError, BackendRole};
use crate::cache::CacheError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Admission denied; no backend was called
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Malformed or incomplete payload
    #[error("{0}")]
    BadRequest(String),

    /// A single backend call failed or ran past its deadline
    #[error("{role} backend failed: {source}")]
    BackendFailure {
        role: BackendRole,
        #[source]
        source: BackendError,
    },

    /// Primary and fallback both failed; terminal for the request
    #[error("Detection service unavailable")]
    DetectionUnavailable {
        primary: BackendError,
        fallback: BackendError,
    },

    /// Side-cache write failed; logged, never returned to a caller
    #[error("cache write failed: {0}")]
    CacheWriteFailure(#[from] CacheError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::BackendFailure { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::DetectionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::CacheWriteFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `status` label of the request counter
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::RateLimited => "rate_limited",
            GatewayError::BadRequest(_) => "bad_request",
            _ => "error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            GatewayError::BadRequest("user_id is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );

        let unavailable = GatewayError::DetectionUnavailable {
            primary: BackendError::Timeout { after_ms: 100 },
            fallback: BackendError::Status { status: 503 },
        };
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.to_string(), "Detection service unavailable");
        assert_eq!(unavailable.outcome(), "error");
    }

    #[test]
    fn test_cache_error_converts_to_absorbed_failure() {
        let err = GatewayError::from(CacheError::Store("connection refused".into()));
        assert!(matches!(err, GatewayError::CacheWriteFailure(_)));
        assert_eq!(
            err.to_string(),
            "cache write failed: cache store error: connection refused"
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_backend_failure_names_role() {
        let err = GatewayError::BackendFailure {
            role: BackendRole::Primary,
            source: BackendError::Timeout { after_ms: 100 },
        };
        assert_eq!(
            err.to_string(),
            "primary backend failed: backend did not answer within 100 ms"
        );
    }
}
