//! Detection response data structures

use crate::backend::BackendRole;
use serde::{Deserialize, Serialize};

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Whether a verdict at this level counts as detected fraud.
    ///
    /// HIGH and CRITICAL are fraud; the probability field plays no part.
    pub fn is_fraud(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict returned to the caller of `/api/v1/detect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    /// Echo of the request's user id
    pub user_id: String,

    /// Combined risk score (conventionally 0.0 - 1.0)
    pub risk_score: f64,

    /// Risk level classification
    pub risk_level: RiskLevel,

    /// Fraud probability (0.0 - 1.0)
    pub fraud_probability: f64,

    /// Pattern labels, in the order the backend reported them
    #[serde(default)]
    pub detected_patterns: Vec<String>,

    /// Indices of the defense layers that fired
    #[serde(default)]
    pub defense_layers: Vec<u8>,

    /// Verdict timestamp (seconds since epoch)
    #[serde(default)]
    pub timestamp: f64,

    /// Round trip measured by the gateway, in milliseconds
    #[serde(default)]
    pub response_time_ms: f64,

    /// Which backend role produced the verdict
    #[serde(default)]
    pub processed_by: String,
}

impl DetectionResponse {
    /// Create a new response with empty pattern and layer lists
    pub fn new(
        user_id: impl Into<String>,
        risk_score: f64,
        risk_level: RiskLevel,
        fraud_probability: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            risk_score,
            risk_level,
            fraud_probability,
            detected_patterns: Vec::new(),
            defense_layers: Vec::new(),
            timestamp: 0.0,
            response_time_ms: 0.0,
            processed_by: String::new(),
        }
    }

    /// Add detected patterns to the response
    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.detected_patterns = patterns;
        self
    }

    /// Add triggered defense layers to the response
    pub fn with_defense_layers(mut self, layers: Vec<u8>) -> Self {
        self.defense_layers = layers;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Stamp the producing role and the gateway-measured latency.
    ///
    /// Whatever latency or producer the backend reported is replaced.
    pub fn finalize(mut self, role: BackendRole, response_time_ms: f64) -> Self {
        self.processed_by = role.as_str().to_string();
        self.response_time_ms = response_time_ms;
        self
    }

    /// Whether this verdict counts as detected fraud
    pub fn is_fraud(&self) -> bool {
        self.risk_level.is_fraud()
    }
}
