//! Prometheus series exported on `/metrics`.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Endpoint label used for detection traffic
pub const DETECT_ENDPOINT: &str = "/detect";

/// The gateway's request metrics, on a registry of their own
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    /// Requests by endpoint and outcome
    requests_total: IntCounterVec,
    /// Successful request duration by endpoint
    request_duration: HistogramVec,
    /// Verdicts at HIGH or CRITICAL
    fraud_detected: IntCounter,
    /// Detection requests currently in flight
    active_requests: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "fraud_detection_requests_total",
                "Total number of fraud detection requests",
            ),
            &["endpoint", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "fraud_detection_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["endpoint"],
        )?;
        let fraud_detected =
            IntCounter::new("fraud_detected_total", "Total number of fraud cases detected")?;
        let active_requests =
            IntGauge::new("fraud_detection_active_requests", "Number of active requests")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(fraud_detected.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            fraud_detected,
            active_requests,
        })
    }

    pub fn record_outcome(&self, endpoint: &str, status: &str) {
        self.requests_total
            .with_label_values(&[endpoint, status])
            .inc();
    }

    pub fn observe_duration(&self, endpoint: &str, duration: Duration) {
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    pub fn record_fraud(&self) {
        self.fraud_detected.inc();
    }

    /// Count a request as in flight until the guard is dropped
    pub fn track_active(&self) -> ActiveGuard {
        self.active_requests.inc();
        ActiveGuard {
            gauge: self.active_requests.clone(),
        }
    }

    pub fn outcome_count(&self, endpoint: &str, status: &str) -> u64 {
        self.requests_total
            .with_label_values(&[endpoint, status])
            .get()
    }

    pub fn fraud_count(&self) -> u64 {
        self.fraud_detected.get()
    }

    pub fn active_count(&self) -> i64 {
        self.active_requests.get()
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Decrements the in-flight gauge on drop
pub struct ActiveGuard {
    gauge: IntGauge,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
