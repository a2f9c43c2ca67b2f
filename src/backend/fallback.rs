//! Full analysis engine, consulted when the primary detector fails.
//!
//! The engine answers 503 while its models are still loading; that surfaces
//! as [`BackendError::Status`] like any other non-success reply.

use super::transport::{HttpTransport, TransportConfig};
use super::{check_verdict, BackendError, ScoringBackend};
use crate::types::{DetectionRequest, DetectionResponse, RiskLevel};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EngineReply {
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
    #[serde(default)]
    vpn_detected: bool,
    #[serde(default)]
    vpn_type: Option<String>,
}

/// Client for the analysis engine
pub struct FallbackEngine {
    transport: HttpTransport,
}

impl FallbackEngine {
    pub fn new(config: TransportConfig) -> Result<Self, BackendError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

#[async_trait]
impl ScoringBackend for FallbackEngine {
    async fn score(
        &self,
        request: &DetectionRequest,
        deadline: Duration,
    ) -> Result<DetectionResponse, BackendError> {
        // The engine consumes the whole request, feature map included.
        let reply: EngineReply = self.transport.post_detect(request, deadline).await?;

        if reply.vpn_detected {
            debug!(
                user_id = %request.user_id,
                vpn_type = reply.vpn_type.as_deref().unwrap_or("unknown"),
                "Engine flagged VPN usage"
            );
        }

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
