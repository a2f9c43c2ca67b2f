//! Running request statistics for the gateway.

use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Default)]
struct Totals {
    total_requests: u64,
    fraud_detected: u64,
    /// Incremental mean of every latency recorded so far (ms)
    avg_latency_ms: f64,
}

/// Concurrently updated totals behind a single write lock
pub struct StatsAggregator {
    totals: RwLock<Totals>,
    /// Start time for rate calculation
    start_time: Instant,
}

/// Point-in-time view served by `/api/v1/stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub fraud_detected: u64,
    pub fraud_rate: f64,
    /// Mean gateway-measured latency in milliseconds
    pub avg_response_time: f64,
    pub requests_per_sec: f64,
    pub uptime_seconds: f64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Create an aggregator whose uptime is measured from `start_time`
    pub fn started_at(start_time: Instant) -> Self {
        Self {
            totals: RwLock::new(Totals::default()),
            start_time,
        }
    }

    /// Record one completed detection
    pub fn record(&self, latency_ms: f64, risk_level: RiskLevel) {
        let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);

        totals.total_requests += 1;
        if risk_level.is_fraud() {
            totals.fraud_detected += 1;
        }

        let n = totals.total_requests as f64;
        totals.avg_latency_ms = (totals.avg_latency_ms * (n - 1.0) + latency_ms) / n;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Snapshot with rates derived as of `now`
    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let totals = self.totals.read().unwrap_or_else(PoisonError::into_inner);
        let uptime = now.saturating_duration_since(self.start_time).as_secs_f64();

        let fraud_rate = if totals.total_requests > 0 {
            totals.fraud_detected as f64 / totals.total_requests as f64
        } else {
            0.0
        };

        let requests_per_sec = if uptime > 0.0 {
            totals.total_requests as f64 / uptime
        } else {
            0.0
        };

        StatsSnapshot {
            total_requests: totals.total_requests,
            fraud_detected: totals.fraud_detected,
            fraud_rate,
            avg_response_time: totals.avg_latency_ms,
            requests_per_sec,
            uptime_seconds: uptime,
        }
    }

    /// Log a one-line summary of the current totals
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            total_requests = snapshot.total_requests,
            fraud_detected = snapshot.fraud_detected,
            fraud_rate = format!("{:.1}%", snapshot.fraud_rate * 100.0),
            avg_response_ms = format!("{:.2}", snapshot.avg_response_time),
            throughput = format!("{:.1} req/s", snapshot.requests_per_sec),
            uptime_secs = snapshot.uptime_seconds as u64,
            "Gateway stats"
        );
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically logs the aggregator's summary
pub struct StatsReporter {
    stats: Arc<StatsAggregator>,
    interval: Duration,
}

impl StatsReporter {
    pub fn new(stats: Arc<StatsAggregator>, interval_secs: u64) -> Self {
        Self {
            stats,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.stats.log_summary();
        }
    }
}
