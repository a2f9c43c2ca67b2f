//! Per-request orchestration: admission, primary call, single failover hop,
//! then stats and cache hand-off.
//!
//! No retry beyond the one primary → fallback hop and no circuit breaker.
//! Every request tries the primary first, so a flapping primary costs each
//! request its timeout before the fallback is consulted.

use crate::backend::{BackendError, BackendRole, ScoringBackend};
use crate::cache::ResultCache;
use crate::error::GatewayError;
use crate::limiter::RateLimiter;
use crate::metrics::GatewayMetrics;
use crate::stats::StatsAggregator;
use crate::types::{DetectionRequest, DetectionResponse};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Per-call budgets for the two backends
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub primary: Duration,
    pub fallback: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            primary: Duration::from_millis(100),
            fallback: Duration::from_millis(100),
        }
    }
}

pub struct Dispatcher {
    limiter: RateLimiter,
    primary: Arc<dyn ScoringBackend>,
    fallback: Arc<dyn ScoringBackend>,
    stats: Arc<StatsAggregator>,
    cache: Arc<ResultCache>,
    metrics: GatewayMetrics,
    deadlines: Deadlines,
}

impl Dispatcher {
    pub fn new(
        limiter: RateLimiter,
        primary: Arc<dyn ScoringBackend>,
        fallback: Arc<dyn ScoringBackend>,
        stats: Arc<StatsAggregator>,
        cache: Arc<ResultCache>,
        metrics: GatewayMetrics,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            limiter,
            primary,
            fallback,
            stats,
            cache,
            metrics,
            deadlines,
        }
    }

    /// Run the full pipeline for one request
    pub async fn handle(
        &self,
        request: DetectionRequest,
        peer: Option<&str>,
    ) -> Result<DetectionResponse, GatewayError> {
        self.admit()?;
        self.process(request, peer).await
    }

    /// Admission check. Rejection is immediate.
    pub fn admit(&self) -> Result<(), GatewayError> {
        if self.limiter.allow() {
            Ok(())
        } else {
            Err(GatewayError::RateLimited)
        }
    }

    /// Everything after admission: defaulting, scoring, recording
    pub async fn process(
        &self,
        request: DetectionRequest,
        peer: Option<&str>,
    ) -> Result<DetectionResponse, GatewayError> {
        request.validate().map_err(GatewayError::BadRequest)?;

        let started = Instant::now();
        let request = request.with_defaults(Utc::now().timestamp(), peer);

        let (role, verdict) = match self
            .call(self.primary.as_ref(), &request, self.deadlines.primary)
            .await
        {
            Ok(verdict) => (BackendRole::Primary, verdict),
            Err(primary_err) => {
                let failure = GatewayError::BackendFailure {
                    role: BackendRole::Primary,
                    source: primary_err.clone(),
                };
                warn!(
                    user_id = %request.user_id,
                    error = %failure,
                    kind = primary_err.kind(),
                    "Falling back"
                );

                match self
                    .call(self.fallback.as_ref(), &request, self.deadlines.fallback)
                    .await
                {
                    Ok(verdict) => (BackendRole::Fallback, verdict),
                    Err(fallback_err) => {
                        let failure = GatewayError::BackendFailure {
                            role: BackendRole::Fallback,
                            source: fallback_err.clone(),
                        };
                        error!(
                            user_id = %request.user_id,
                            primary_error = %primary_err,
                            error = %failure,
                            kind = fallback_err.kind(),
                            "Both backends failed"
                        );
                        return Err(GatewayError::DetectionUnavailable {
                            primary: primary_err,
                            fallback: fallback_err,
                        });
                    }
                }
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let response = verdict.finalize(role, latency_ms);

        self.stats.record(latency_ms, response.risk_level);
        if response.is_fraud() {
            self.metrics.record_fraud();
        }
        self.cache.store(response.clone());

        debug!(
            user_id = %response.user_id,
            risk_level = %response.risk_level,
            processed_by = %role,
            latency_ms = latency_ms,
            "Detection complete"
        );

        Ok(response)
    }

    async fn call(
        &self,
        backend: &dyn ScoringBackend,
        request: &DetectionRequest,
        deadline: Duration,
    ) -> Result<DetectionResponse, BackendError> {
        match tokio::time::timeout(deadline, backend.score(request, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                after_ms: deadline.as_millis() as u64,
            }),
        }
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::testing::{MemoryStore, StubBackend};
    use crate::types::RiskLevel;

    struct Harness {
        dispatcher: Dispatcher,
        primary: Arc<StubBackend>,
        fallback: Arc<StubBackend>,
        store: Arc<MemoryStore>,
    }

    fn harness(ceiling: u32, primary: StubBackend, fallback: StubBackend) -> Harness {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ResultCache::spawn(store.clone(), CacheSettings::default()));

        let dispatcher = Dispatcher::new(
            RateLimiter::new(ceiling),
            primary.clone(),
            fallback.clone(),
            Arc::new(StatsAggregator::new()),
            cache,
            GatewayMetrics::new().unwrap(),
            Deadlines {
                primary: Duration::from_millis(50),
                fallback: Duration::from_millis(50),
            },
        );

        Harness {
            dispatcher,
            primary,
            fallback,
            store,
        }
    }

    fn purchase(user_id: &str) -> DetectionRequest {
        DetectionRequest::new(user_id, 100.0)
    }

    #[tokio::test]
    async fn test_primary_answers_without_fallback() {
        let h = harness(
            10,
            StubBackend::answering(RiskLevel::Low, 0.25),
            StubBackend::answering(RiskLevel::Medium, 0.38),
        );

        let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();

        assert_eq!(response.processed_by, "primary");
        assert_eq!(response.user_id, "u1");
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_primary_falls_back() {
        let h = harness(
            100,
            StubBackend::failing(),
            StubBackend::answering(RiskLevel::Medium, 0.38),
        );

        for _ in 0..20 {
            let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();
            assert_eq!(response.processed_by, "fallback");
        }
        assert_eq!(h.primary.calls(), 20);
        assert_eq!(h.fallback.calls(), 20);
    }

    #[tokio::test]
    async fn test_primary_timeout_falls_back_to_medium_verdict() {
        let h = harness(
            10,
            StubBackend::hanging(Duration::from_secs(5)),
            StubBackend::answering(RiskLevel::Medium, 0.38),
        );

        let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();

        assert_eq!(response.processed_by, "fallback");
        assert_eq!(response.risk_level, RiskLevel::Medium);
        assert_eq!(response.fraud_probability, 0.38);
        // The primary's deadline is part of the measured latency.
        assert!(response.response_time_ms >= 50.0);
    }

    #[tokio::test]
    async fn test_both_failing_is_unavailable_and_not_counted() {
        let h = harness(100, StubBackend::failing(), StubBackend::failing());

        for _ in 0..5 {
            let err = h.dispatcher.handle(purchase("u1"), None).await.unwrap_err();
            assert!(matches!(err, GatewayError::DetectionUnavailable { .. }));
        }

        let snapshot = h.dispatcher.stats().snapshot();
        assert_eq!(snapshot.fraud_detected, 0);
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(h.dispatcher.metrics().fraud_count(), 0);
        assert_eq!(h.primary.calls(), 5);
        assert_eq!(h.fallback.calls(), 5);
    }

    #[tokio::test]
    async fn test_rate_limited_requests_never_reach_backends() {
        let h = harness(
            5,
            StubBackend::answering(RiskLevel::Low, 0.25),
            StubBackend::answering(RiskLevel::Low, 0.25),
        );

        for _ in 0..5 {
            let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();
            assert_eq!(response.user_id, "u1");
        }
        let err = h.dispatcher.handle(purchase("u1"), None).await.unwrap_err();

        assert!(matches!(err, GatewayError::RateLimited));
        assert_eq!(h.primary.calls(), 5);
        assert_eq!(h.fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_user_id_is_bad_request() {
        let h = harness(
            5,
            StubBackend::answering(RiskLevel::Low, 0.25),
            StubBackend::answering(RiskLevel::Low, 0.25),
        );

        let err = h.dispatcher.handle(purchase(""), None).await.unwrap_err();

        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(h.primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_measured_latency_replaces_backend_report() {
        let h = harness(
            5,
            StubBackend::answering(RiskLevel::Low, 0.25),
            StubBackend::answering(RiskLevel::Low, 0.25),
        );

        let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();

        // The stub claims 9999 ms.
        assert!(response.response_time_ms < 9999.0);
        assert!(response.response_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_fraud_accounting_per_level() {
        let high = harness(
            5,
            StubBackend::answering(RiskLevel::High, 0.9),
            StubBackend::failing(),
        );
        high.dispatcher.handle(purchase("u1"), None).await.unwrap();
        let snapshot = high.dispatcher.stats().snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.fraud_detected, 1);
        assert_eq!(high.dispatcher.metrics().fraud_count(), 1);

        let low = harness(
            5,
            StubBackend::answering(RiskLevel::Low, 0.1),
            StubBackend::failing(),
        );
        low.dispatcher.handle(purchase("u1"), None).await.unwrap();
        let snapshot = low.dispatcher.stats().snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.fraud_detected, 0);
        assert_eq!(low.dispatcher.metrics().fraud_count(), 0);
    }

    #[tokio::test]
    async fn test_defaults_applied_and_result_cached() {
        let h = harness(
            5,
            StubBackend::answering(RiskLevel::Low, 0.25),
            StubBackend::failing(),
        );

        let response = h
            .dispatcher
            .handle(purchase("u1"), Some("203.0.113.9"))
            .await
            .unwrap();

        // The stub echoes the request timestamp, which was defaulted to now.
        assert!(response.timestamp > 0.0);

        h.dispatcher.cache().shutdown(Duration::from_secs(1)).await;
        let key = format!("fraud:result:u1:{}", response.timestamp as i64);
        assert!(h.store.get(&key).is_some());
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_affect_response() {
        let h = harness(
            5,
            StubBackend::answering(RiskLevel::Critical, 0.97),
            StubBackend::failing(),
        );
        h.store.set_failing(true);

        let response = h.dispatcher.handle(purchase("u1"), None).await.unwrap();
        assert_eq!(response.risk_level, RiskLevel::Critical);

        h.dispatcher.cache().shutdown(Duration::from_secs(1)).await;
        assert_eq!(h.dispatcher.cache().counters().failed, 1);
    }
}
