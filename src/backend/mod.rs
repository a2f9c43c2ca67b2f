//! Scoring backends the gateway dispatches to.
//!
//! Both backends are opaque scoring oracles behind [`ScoringBackend`]. The
//! dispatcher only decides call order; it never looks at which concrete
//! implementation it is holding.

pub mod fallback;
pub mod primary;
pub mod transport;

pub use fallback::FallbackEngine;
pub use primary::PrimaryDetector;
pub use transport::{HttpTransport, TransportConfig};

use crate::types::{DetectionRequest, DetectionResponse};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Position of a backend in the failover order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendRole {
    Primary,
    Fallback,
}

impl BackendRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendRole::Primary => "primary",
            BackendRole::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a backend could not produce a verdict
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("backend did not answer within {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("connection to backend failed: {0}")]
    Connection(String),

    #[error("backend answered with HTTP {status}")]
    Status { status: u16 },

    #[error("malformed backend reply: {0}")]
    Malformed(String),

    #[error("backend transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout { .. } => "timeout",
            BackendError::Connection(_) => "connection",
            BackendError::Status { .. } => "status",
            BackendError::Malformed(_) => "malformed",
            BackendError::Transport(_) => "transport",
        }
    }
}

/// Scores a detection request within a time budget.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Produce a verdict for `request`, or fail.
    ///
    /// A failure is always reported as an error, never as a zeroed verdict.
    async fn score(
        &self,
        request: &DetectionRequest,
        deadline: Duration,
    ) -> Result<DetectionResponse, BackendError>;
}

/// Check the numeric fields every backend reply must satisfy
pub(crate) fn check_verdict(response: &DetectionResponse) -> Result<(), BackendError> {
    if !response.risk_score.is_finite() {
        return Err(BackendError::Malformed(format!(
            "risk_score is not finite: {}",
            response.risk_score
        )));
    }
    if !(0.0..=1.0).contains(&response.fraud_probability) {
        return Err(BackendError::Malformed(format!(
            "fraud_probability out of range: {}",
            response.fraud_probability
        )));
    }
    Ok(())
}
