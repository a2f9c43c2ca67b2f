//! Scripted collaborators for unit tests.

use crate::backend::{BackendError, ScoringBackend};
use crate::cache::{CacheError, CacheStore};
use crate::types::{DetectionRequest, DetectionResponse, RiskLevel};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a [`StubBackend`] does when called
#[derive(Debug, Clone)]
pub enum Behavior {
    Answer {
        risk_level: RiskLevel,
        fraud_probability: f64,
    },
    Fail(BackendError),
    /// Sleep longer than any sane deadline before answering
    Hang(Duration),
}

pub struct StubBackend {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn answering(risk_level: RiskLevel, fraud_probability: f64) -> Self {
        Self::with(Behavior::Answer {
            risk_level,
            fraud_probability,
        })
    }

    pub fn failing() -> Self {
        Self::with(Behavior::Fail(BackendError::Connection(
            "connection refused".to_string(),
        )))
    }

    pub fn hanging(delay: Duration) -> Self {
        Self::with(Behavior::Hang(delay))
    }

    pub fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringBackend for StubBackend {
    async fn score(
        &self,
        request: &DetectionRequest,
        _deadline: Duration,
    ) -> Result<DetectionResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Answer {
                risk_level,
                fraud_probability,
            } => {
                let mut response = DetectionResponse::new(
                    request.user_id.clone(),
                    *fraud_probability,
                    *risk_level,
                    *fraud_probability,
                )
                .with_timestamp(request.timestamp);
                // Backends report their own view of latency and identity.
                response.response_time_ms = 9999.0;
                response.processed_by = "stub".to_string();
                Ok(response)
            }
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Err(BackendError::Transport("woke up".to_string()))
            }
        }
    }
}

/// In-memory [`CacheStore`] recording values with their TTL
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Duration)>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `ping` stall far past any probe budget
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<(Vec<u8>, Duration)> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Store("connection refused".to_string()));
        }
        Ok(())
    }
}
