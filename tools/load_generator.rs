//! Load Generator
//!
//! Fires synthetic detection requests at a running gateway and tallies the
//! answers by HTTP status and serving backend.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Request body accepted by `/api/v1/detect`
#[derive(Debug, Clone, Serialize)]
struct DetectionRequest {
    user_id: String,
    item_id: String,
    amount: f64,
    timestamp: i64,
    ip: String,
    device_id: String,
    action: String,
    features: Map<String, Value>,
}

/// The parts of a verdict the summary needs
#[derive(Debug, Deserialize)]
struct Verdict {
    risk_level: String,
    processed_by: String,
}

/// Request generator for load testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    request_counter: u64,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            request_counter: 0,
        }
    }

    /// An everyday purchase from an established user
    fn generate_ordinary(&mut self) -> DetectionRequest {
        self.request_counter += 1;

        DetectionRequest {
            user_id: format!("user_{}", self.rng.gen_range(1..5000)),
            item_id: format!("item_{}", self.rng.gen_range(1..1000)),
            amount: self.rng.gen_range(10.0..500.0),
            timestamp: Utc::now().timestamp(),
            ip: self.random_ip(),
            device_id: format!("dev_{:016x}", self.rng.gen::<u64>()),
            action: self.random_choice(&["purchase", "view", "add_to_cart"]).to_string(),
            features: features(json!({
                "account_age_days": self.rng.gen_range(30..1000),
                "tx_count_last_hour": self.rng.gen_range(0..3),
                "is_international": self.rng.gen_bool(0.1),
            })),
        }
    }

    /// A burst-y, high-value purchase from a fresh account
    fn generate_suspicious(&mut self) -> DetectionRequest {
        self.request_counter += 1;

        DetectionRequest {
            user_id: format!("user_new_{}", self.request_counter),
            item_id: format!("item_{}", self.rng.gen_range(1..20)),
            amount: self.rng.gen_range(1000.0..10000.0),
            timestamp: Utc::now().timestamp(),
            ip: self.random_ip(),
            device_id: format!("dev_{:016x}", self.rng.gen::<u64>()),
            action: "purchase".to_string(),
            features: features(json!({
                "account_age_days": self.rng.gen_range(0..7),
                "tx_count_last_hour": self.rng.gen_range(5..15),
                "is_international": true,
                "failed_tx_last_hour": self.rng.gen_range(1..5),
            })),
        }
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn features(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Running tallies of what came back
#[derive(Default)]
struct Tally {
    by_status: BTreeMap<u16, u64>,
    by_backend: BTreeMap<String, u64>,
    by_risk: BTreeMap<String, u64>,
    transport_errors: u64,
    total_latency: Duration,
}

impl Tally {
    fn log(&self, sent: u64) {
        let avg_ms = if sent > 0 {
            self.total_latency.as_secs_f64() * 1000.0 / sent as f64
        } else {
            0.0
        };
        info!(
            sent = sent,
            by_status = ?self.by_status,
            by_backend = ?self.by_backend,
            by_risk = ?self.by_risk,
            transport_errors = self.transport_errors,
            avg_round_trip_ms = format!("{:.2}", avg_ms),
            "Load summary"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("load_generator=info".parse()?),
        )
        .init();

    info!("Starting Load Generator");

    let args: Vec<String> = std::env::args().collect();
    let gateway_url = args
        .get(1)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        gateway_url = %gateway_url,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let detect_url = format!("{}/api/v1/detect", gateway_url);

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();
    let mut tally = Tally::default();

    info!("Sending {} requests to {}", count, detect_url);

    for i in 0..count {
        let request = if rng.gen_bool(fraud_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_ordinary()
        };

        let started = Instant::now();
        match client.post(&detect_url).json(&request).send().await {
            Ok(response) => {
                let status = response.status();
                *tally.by_status.entry(status.as_u16()).or_default() += 1;

                if status.is_success() {
                    match response.json::<Verdict>().await {
                        Ok(verdict) => {
                            *tally.by_backend.entry(verdict.processed_by).or_default() += 1;
                            *tally.by_risk.entry(verdict.risk_level).or_default() += 1;
                        }
                        Err(e) => warn!(error = %e, "Unreadable verdict"),
                    }
                }
            }
            Err(e) => {
                tally.transport_errors += 1;
                warn!(error = %e, "Request failed");
            }
        }
        tally.total_latency += started.elapsed();

        if (i + 1) % 10 == 0 {
            info!("Sent {}/{} requests", i + 1, count);
        }

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    tally.log(count);

    match client
        .get(format!("{}/api/v1/stats", gateway_url))
        .send()
        .await
    {
        Ok(response) => match response.json::<Value>().await {
            Ok(stats) => info!(stats = %stats, "Gateway stats"),
            Err(e) => warn!(error = %e, "Unreadable stats"),
        },
        Err(e) => warn!(error = %e, "Failed to fetch gateway stats"),
    }

    Ok(())
}
