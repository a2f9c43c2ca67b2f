//! Detection request data structures

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action assumed when the caller does not name one
pub const DEFAULT_ACTION: &str = "purchase";

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

/// Event to be scored for fraud risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// Subject of the event (required, non-empty)
    pub user_id: String,

    /// Item the action refers to
    #[serde(default)]
    pub item_id: String,

    /// Monetary amount
    #[serde(default)]
    pub amount: f64,

    /// Event time in seconds since epoch; 0 means "now"
    #[serde(default)]
    pub timestamp: f64,

    /// Originating address; empty means "the caller's address"
    #[serde(default)]
    pub ip: String,

    /// Device fingerprint
    #[serde(default)]
    pub device_id: String,

    /// Action label (purchase, login, ...)
    #[serde(default = "default_action")]
    pub action: String,

    /// Open-ended feature mapping forwarded untouched to the backends
    #[serde(default)]
    pub features: Map<String, Value>,
}

impl DetectionRequest {
    /// Create a new request with required fields
    pub fn new(user_id: impl Into<String>, amount: f64) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: String::new(),
            amount,
            timestamp: 0.0,
            ip: String::new(),
            device_id: String::new(),
            action: default_action(),
            features: Map::new(),
        }
    }

    /// Parse and validate a request body
    pub fn from_slice(body: &[u8]) -> Result<Self, String> {
        let request: Self = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id is required".to_string());
        }
        Ok(())
    }

    /// Fill in the timestamp and address when the caller left them empty.
    ///
    /// `now` is whole seconds since epoch, `peer` the transport address.
    pub fn with_defaults(mut self, now: i64, peer: Option<&str>) -> Self {
        if self.timestamp == 0.0 {
            self.timestamp = now as f64;
        }
        if self.ip.is_empty() {
            if let Some(peer) = peer {
                self.ip = peer.to_string();
            }
        }
        self
    }
}
