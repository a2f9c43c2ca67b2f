//! HTTP surface of the gateway.
//!
//! | Route | Behaviour |
//! |---|---|
//! | `POST /api/v1/detect` | admission, then parse, then dispatch |
//! | `GET /api/v1/stats` | [`StatsSnapshot`](crate::stats::StatsSnapshot) |
//! | `GET /api/v1/health` | 200 when the side cache answers PING, 503 otherwise |
//! | `GET /metrics` | Prometheus text exposition |

use crate::backend::{FallbackEngine, PrimaryDetector, TransportConfig};
use crate::cache::{CacheSettings, RedisStore, ResultCache};
use crate::config::AppConfig;
use crate::dispatcher::{Deadlines, Dispatcher};
use crate::error::GatewayError;
use crate::limiter::RateLimiter;
use crate::metrics::{GatewayMetrics, DETECT_ENDPOINT};
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::types::{DetectionRequest, DetectionResponse};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Owns the dispatcher and everything it shares for the process lifetime
pub struct Gateway {
    dispatcher: Dispatcher,
    probe_timeout: Duration,
}

impl Gateway {
    pub fn new(dispatcher: Dispatcher, probe_timeout: Duration) -> Self {
        Self {
            dispatcher,
            probe_timeout,
        }
    }

    /// Wire up backends, cache, limiter and metrics from configuration.
    ///
    /// Spawns the cache writer, so it must run inside a Tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let primary = PrimaryDetector::new(TransportConfig::with_base_url(
            config.backends.primary.url.clone(),
        ))
        .context("Invalid primary backend configuration")?;
        let fallback = FallbackEngine::new(TransportConfig::with_base_url(
            config.backends.fallback.url.clone(),
        ))
        .context("Invalid fallback backend configuration")?;

        let store = RedisStore::new(&config.cache.redis_addr)
            .context("Invalid Redis address")?;
        let cache = ResultCache::spawn(
            Arc::new(store),
            CacheSettings {
                ttl: Duration::from_secs(config.cache.ttl_secs),
                queue_capacity: config.cache.queue_capacity,
            },
        );

        let metrics = GatewayMetrics::new().context("Failed to register metrics")?;

        let dispatcher = Dispatcher::new(
            RateLimiter::new(config.admission.max_qps),
            Arc::new(primary),
            Arc::new(fallback),
            Arc::new(StatsAggregator::new()),
            Arc::new(cache),
            metrics,
            Deadlines {
                primary: config.backends.primary.timeout(),
                fallback: config.backends.fallback.timeout(),
            },
        );

        info!(
            max_qps = config.admission.max_qps,
            "Gateway initialized"
        );

        Ok(Self::new(
            dispatcher,
            Duration::from_millis(config.cache.probe_timeout_ms),
        ))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle a raw `/detect` body, keeping the request metrics.
    ///
    /// Admission is decided before the body is parsed.
    pub async fn detect(
        &self,
        body: &[u8],
        peer: Option<String>,
    ) -> Result<DetectionResponse, GatewayError> {
        let metrics = self.dispatcher.metrics();
        let _active = metrics.track_active();
        let started = Instant::now();

        let result = async {
            self.dispatcher.admit()?;
            let request = DetectionRequest::from_slice(body).map_err(GatewayError::BadRequest)?;
            self.dispatcher.process(request, peer.as_deref()).await
        }
        .await;

        match &result {
            Ok(_) => {
                metrics.observe_duration(DETECT_ENDPOINT, started.elapsed());
                metrics.record_outcome(DETECT_ENDPOINT, "success");
            }
            Err(e) => metrics.record_outcome(DETECT_ENDPOINT, e.outcome()),
        }

        result
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats().snapshot()
    }

    pub async fn is_healthy(&self) -> bool {
        self.dispatcher.cache().is_healthy(self.probe_timeout).await
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/api/v1/detect", post(detect_handler))
            .route("/api/v1/stats", get(stats_handler))
            .route("/api/v1/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

async fn detect_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Result<Json<DetectionResponse>, GatewayError> {
    let span = info_span!("detect", request_id = %Uuid::new_v4());
    let peer = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let response = gateway.detect(&body, peer).instrument(span).await?;
    Ok(Json(response))
}

async fn stats_handler(State(gateway): State<Arc<Gateway>>) -> Json<StatsSnapshot> {
    Json(gateway.stats())
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    if gateway.is_healthy().await {
        (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "redis": "up" })),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "redis": "down" })),
        )
            .into_response()
    }
}

async fn metrics_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    match gateway.dispatcher().metrics().encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
