//! Server configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the analytics server
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Path to the durable SQLite database file
    pub db_path: String,

    pub http_host: String,
    pub http_port: u16,

    /// Upper bound on any single hot/cold store call, in milliseconds
    pub store_timeout_ms: u64,

    /// Maximum number of durable writes in flight at once
    pub durable_write_concurrency: usize,

    /// Scheduled-but-unfinished writes allowed per tier before new ones are shed
    pub write_backlog: usize,

    /// Buffer of the durable-outcome monitoring channel
    pub monitor_channel_buffer: usize,

    /// How often the monitor logs durable write throughput, in seconds
    pub monitor_log_interval_secs: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            db_path: "analytics.db".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8082,
            store_timeout_ms: 2_000,
            durable_write_concurrency: 64,
            write_backlog: 4_096,
            monitor_channel_buffer: 10_000,
            monitor_log_interval_secs: 60,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ANALYTICS_DB_PATH` (default: analytics.db)
    /// - `ANALYTICS_HTTP_HOST` (default: 0.0.0.0)
    /// - `ANALYTICS_HTTP_PORT` (default: 8082)
    /// - `STORE_TIMEOUT_MS` (default: 2000)
    /// - `DURABLE_WRITE_CONCURRENCY` (default: 64)
    /// - `WRITE_BACKLOG` (default: 4096)
    /// - `MONITOR_CHANNEL_BUFFER` (default: 10000)
    /// - `MONITOR_LOG_INTERVAL_SECS` (default: 60)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unparseable numbers fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            db_path: lookup("ANALYTICS_DB_PATH").unwrap_or(defaults.db_path),

            http_host: lookup("ANALYTICS_HTTP_HOST").unwrap_or(defaults.http_host),

            http_port: lookup("ANALYTICS_HTTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_port),

            store_timeout_ms: lookup("STORE_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.store_timeout_ms),

            durable_write_concurrency: lookup("DURABLE_WRITE_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.durable_write_concurrency),

            write_backlog: lookup("WRITE_BACKLOG")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.write_backlog),

            monitor_channel_buffer: lookup("MONITOR_CHANNEL_BUFFER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.monitor_channel_buffer),

            monitor_log_interval_secs: lookup("MONITOR_LOG_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.monitor_log_interval_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.trim().is_empty() {
            return Err(ConfigError::MissingVariable("ANALYTICS_DB_PATH".to_string()));
        }
        if self.http_port == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYTICS_HTTP_PORT must be non-zero".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "STORE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if self.durable_write_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "DURABLE_WRITE_CONCURRENCY must be greater than 0".to_string(),
            ));
        }
        if self.write_backlog == 0 {
            return Err(ConfigError::InvalidValue(
                "WRITE_BACKLOG must be greater than 0".to_string(),
            ));
        }
        if self.monitor_channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "MONITOR_CHANNEL_BUFFER must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
