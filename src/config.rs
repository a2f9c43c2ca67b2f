//! Configuration management for the gateway

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub backends: BackendsConfig,
    pub admission: AdmissionConfig,
    pub stats: StatsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            shutdown_grace_secs: 5,
        }
    }
}

/// Side-cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis address, `host:port` or a `redis://` URL
    pub redis_addr: String,
    /// Retention of cached results
    pub ttl_secs: u64,
    /// Pending writes held before new ones are dropped
    pub queue_capacity: usize,
    /// Budget of the health-check PING
    pub probe_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_addr: "localhost:6379".to_string(),
            ttl_secs: 3600,
            queue_capacity: 1024,
            probe_timeout_ms: 500,
        }
    }
}

/// Scoring backends
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Low-latency detector
    pub primary: BackendConfig,
    /// Analysis engine used on primary failure
    pub fallback: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig {
                url: "http://localhost:3030".to_string(),
                timeout_ms: 100,
            },
            fallback: BackendConfig {
                url: "http://localhost:5000".to_string(),
                timeout_ms: 100,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL
    pub url: String,
    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Admission control
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Requests admitted per one-second window
    pub max_qps: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_qps: 5000 }
    }
}

/// Periodic stats logging
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file (if present) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("FRAUD_GATEWAY_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration with `path` as the optional file layer.
    ///
    /// Precedence, lowest first: defaults, file, `FRAUD_GATEWAY__*` variables,
    /// the flat deployment variables (`GATEWAY_PORT`, `REDIS_ADDR`, ...).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = BackendsConfig::default();
        let builder = Config::builder()
            // Seeded in the tree so a partial backend table still deserializes.
            .set_default("backends.primary.url", defaults.primary.url)?
            .set_default("backends.primary.timeout_ms", defaults.primary.timeout_ms)?
            .set_default("backends.fallback.url", defaults.fallback.url)?
            .set_default("backends.fallback.timeout_ms", defaults.fallback.timeout_ms)?
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("FRAUD_GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", env_parse::<u16>("GATEWAY_PORT").map(u64::from))?
            .set_override_option("cache.redis_addr", env_string("REDIS_ADDR"))?
            .set_override_option("backends.primary.url", env_string("RUST_API_URL"))?
            .set_override_option("backends.fallback.url", env_string("PYTHON_API_URL"))?
            .set_override_option("admission.max_qps", env_parse::<u32>("MAX_QPS").map(u64::from))?
            .set_override_option("backends.primary.timeout_ms", env_parse::<u64>("TIMEOUT_MS"))?
            .set_override_option("backends.fallback.timeout_ms", env_parse::<u64>("TIMEOUT_MS"))?;

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Log the effective configuration
    pub fn log_summary(&self) {
        tracing::info!(
            port = self.server.port,
            redis = %self.cache.redis_addr,
            primary = %self.backends.primary.url,
            fallback = %self.backends.fallback.url,
            max_qps = self.admission.max_qps,
            primary_timeout_ms = self.backends.primary.timeout_ms,
            fallback_timeout_ms = self.backends.fallback.timeout_ms,
            "Configuration loaded"
        );
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Variable parsed into the target field type; an unparsable or
/// out-of-range value is reported and ignored
fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(variable = key, value = %raw, error = %e, "Ignoring unparsable variable, keeping default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.redis_addr, "localhost:6379");
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.backends.primary.url, "http://localhost:3030");
        assert_eq!(config.backends.fallback.url, "http://localhost:5000");
        assert_eq!(config.admission.max_qps, 5000);
        assert_eq!(config.backends.primary.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.server.shutdown_grace_secs, 5);
        assert_eq!(config.cache.queue_capacity, 1024);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("fraud-gateway-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gateway.toml");
        std::fs::write(
            &path,
            "[admission]\nmax_qps = 5\n\n[backends.fallback]\ntimeout_ms = 250\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.admission.max_qps, 5);
        assert_eq!(config.backends.fallback.timeout_ms, 250);
        assert_eq!(config.backends.fallback.url, "http://localhost:5000");
        // Untouched sections keep their defaults.
        assert_eq!(config.backends.primary.url, "http://localhost:3030");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_parse_rejects_out_of_range() {
        std::env::set_var("FRAUD_GATEWAY_TEST_PORT", "70000");
        std::env::set_var("FRAUD_GATEWAY_TEST_QPS", "-5");
        std::env::set_var("FRAUD_GATEWAY_TEST_TIMEOUT", " 250 ");

        assert_eq!(env_parse::<u16>("FRAUD_GATEWAY_TEST_PORT"), None);
        assert_eq!(env_parse::<u32>("FRAUD_GATEWAY_TEST_QPS"), None);
        assert_eq!(env_parse::<u64>("FRAUD_GATEWAY_TEST_TIMEOUT"), Some(250));
        assert_eq!(env_parse::<u64>("FRAUD_GATEWAY_TEST_UNSET"), None);
    }

    #[test]
    fn test_out_of_range_legacy_variables_keep_defaults() {
        std::env::set_var("GATEWAY_PORT", "70000");
        std::env::set_var("MAX_QPS", "-5");

        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.admission.max_qps, 5000);
    }
}
