//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::{Money, OrderLimits};
use saga::SagaConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration with defaults for every setting.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human-readable
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage if unset
/// - `SAGA_STEP_TIMEOUT_MS`, `SAGA_MAX_ATTEMPTS`, `SAGA_RETRY_BACKOFF_MS`,
///   `SAGA_MAX_BACKOFF_MS`, `SAGA_SWEEP_INTERVAL_MS`: saga engine timing
/// - `ORDER_MAX_TOTAL_CENTS`: revision limit for order totals
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub saga: SagaConfig,
    pub order_limits: OrderLimits,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };

        let saga = SagaConfig {
            step_timeout: millis("SAGA_STEP_TIMEOUT_MS", defaults.saga.step_timeout),
            max_attempts: lookup("SAGA_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.saga.max_attempts),
            retry_backoff: millis("SAGA_RETRY_BACKOFF_MS", defaults.saga.retry_backoff),
            max_backoff: millis("SAGA_MAX_BACKOFF_MS", defaults.saga.max_backoff),
            sweep_interval: millis("SAGA_SWEEP_INTERVAL_MS", defaults.saga.sweep_interval),
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            saga,
            order_limits: lookup("ORDER_MAX_TOTAL_CENTS")
                .and_then(|v| v.parse().ok())
                .map(|cents| OrderLimits {
                    max_order_total: Money::from_cents(cents),
                })
                .unwrap_or(defaults.order_limits),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            saga: SagaConfig::default(),
            order_limits: OrderLimits::default(),
        }
    }
}
