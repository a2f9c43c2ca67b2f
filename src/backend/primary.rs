//! Low-latency detector, tried first for every request.

use super::transport::{HttpTransport, TransportConfig};
use super::{check_verdict, BackendError, ScoringBackend};
use crate::types::{DetectionRequest, DetectionResponse, RiskLevel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body understood by the detector: scalar fields only, no feature map
#[derive(Debug, Serialize)]
struct DetectorPayload<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    item_id: &'a str,
    amount: f64,
    timestamp: f64,
    #[serde(skip_serializing_if = "str::is_empty")]
    ip: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    device_id: &'a str,
    action: &'a str,
}

impl<'a> From<&'a DetectionRequest> for DetectorPayload<'a> {
    fn from(request: &'a DetectionRequest) -> Self {
        Self {
            user_id: &request.user_id,
            item_id: &request.item_id,
            amount: request.amount,
            timestamp: request.timestamp,
            ip: &request.ip,
            device_id: &request.device_id,
            action: &request.action,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectorReply {
    risk_score: f64,
    risk_level: RiskLevel,
    fraud_probability: f64,
    #[serde(default)]
    detected_patterns: Vec<String>,
    #[serde(default)]
    defense_layers: Vec<u8>,
    /// Echo of the request time; the request's own value when absent
    #[serde(default)]
    timestamp: Option<f64>,
}

/// Client for the in-memory model detector
pub struct PrimaryDetector {
    transport: HttpTransport,
}

impl PrimaryDetector {
    pub fn new(config: TransportConfig) -> Result<Self, BackendError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

#[async_trait]
impl ScoringBackend for PrimaryDetector {
    async fn score(
        &self,
        request: &DetectionRequest,
        deadline: Duration,
    ) -> Result<DetectionResponse, BackendError> {
        let reply: DetectorReply = self
            .transport
            .post_detect(&DetectorPayload::from(request), deadline)
            .await?;

        let response = DetectionResponse::new(
            request.user_id.clone(),
            reply.risk_score,
            reply.risk_level,
            reply.fraud_probability,
        )
        .with_patterns(reply.detected_patterns)
        .with_defense_layers(reply.defense_layers)
        .with_timestamp(reply.timestamp.unwrap_or(request.timestamp));

        check_verdict(&response)?;
        Ok(response)
    }
}
