//! Best-effort write-behind of detection results to the side cache.
//!
//! Responses are queued on a bounded channel and written by a single
//! background worker. The response path only ever does a `try_send`: a full
//! queue drops the write and counts it, a failed write is logged and counted.
//! Nothing here can fail or delay a detection.

use crate::error::GatewayError;
use crate::types::DetectionResponse;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a cached result is retained
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize result: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache store error: {0}")]
    Store(String),

    #[error("write queue is full")]
    QueueFull,

    #[error("write queue is closed")]
    Closed,
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Store(e.to_string())
    }
}

/// Key-value store the results are written to
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Store `value` under `key`, expiring after `ttl`
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Redis-backed store.
///
/// The connection is established on first use and re-attempted on every call
/// until it succeeds, so the gateway starts even while Redis is down.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// `addr` is either a `redis://` URL or a bare `host:port`
    pub fn new(addr: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url(addr))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to Redis cache");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let reply = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Store(format!("unexpected PING reply: {}", reply)))
        }
    }
}

fn redis_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{}", addr)
    }
}

/// Cache key of a result: subject plus whole-second timestamp
pub fn result_key(response: &DetectionResponse) -> String {
    format!(
        "fraud:result:{}:{}",
        response.user_id, response.timestamp as i64
    )
}

/// Write-behind queue settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub queue_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Totals of the write-behind queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCounters {
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Handle to the write-behind queue and its worker
pub struct ResultCache {
    tx: mpsc::Sender<DetectionResponse>,
    store: Arc<dyn CacheStore>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResultCache {
    /// Start the background writer. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_writer(
            rx,
            store.clone(),
            settings.ttl,
            counters.clone(),
            shutdown.clone(),
        ));

        Self {
            tx,
            store,
            counters,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `response` for writing. Returns immediately.
    pub fn store(&self, response: DetectionResponse) {
        if let Err(e) = self.tx.try_send(response) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => CacheError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => CacheError::Closed,
            };
            warn!(error = %reason, "Dropped cache write");
        }
    }

    /// Whether the backing store answers a liveness probe within `timeout`
    pub async fn is_healthy(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Cache health check failed");
                false
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Cache health check timed out");
                false
            }
        }
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting writes and wait up to `grace` for queued ones to land
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            if tokio::time::timeout(grace, worker).await.is_err() {
                warn!(grace_ms = grace.as_millis() as u64, "Cache writer did not drain in time");
            }
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<DetectionResponse>,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(response) => write_one(store.as_ref(), &response, ttl, &counters).await,
                None => return,
            },
            _ = shutdown.cancelled() => break,
        }
    }

    rx.close();
    while let Some(response) = rx.recv().await {
        write_one(store.as_ref(), &response, ttl, &counters).await;
    }
    debug!("Cache writer drained");
}

async fn write_one(
    store: &dyn CacheStore,
    response: &DetectionResponse,
    ttl: Duration,
    counters: &Counters,
) {
    let key = result_key(response);
    let result = match serde_json::to_vec(response) {
        Ok(payload) => store.put(&key, payload, ttl).await,
        Err(e) => Err(CacheError::from(e)),
    };

    match result {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let failure = GatewayError::from(e);
            warn!(key = %key, error = %failure, "Failed to cache detection result");
        }
    }
}
