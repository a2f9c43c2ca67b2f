//! Fraud Detection Gateway Library
//!
//! HTTP front door for fraud scoring: admits requests under a per-second
//! ceiling, asks the primary detector for a verdict, falls back to the
//! analysis engine once on failure, and records every verdict in running
//! statistics and a Redis side cache.

pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod metrics;
pub mod server;
pub mod stats;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, BackendRole, FallbackEngine, PrimaryDetector, ScoringBackend};
pub use cache::{CacheStore, RedisStore, ResultCache};
pub use config::AppConfig;
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use limiter::RateLimiter;
pub use stats::{StatsAggregator, StatsReporter, StatsSnapshot};
pub use types::{DetectionRequest, DetectionResponse, RiskLevel};
