//! Configuration module for coderelay.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{RelayError, Result};

/// Widest code that still fits the code space in a `u64`.
pub const MAX_CODE_LENGTH: u32 = 18;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay (resource lifecycle) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Number of decimal digits in an access code.
    #[serde(default = "default_code_length")]
    pub code_length: u32,
    /// Time-to-live of an upload in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Number of downloads allowed per upload.
    #[serde(default = "default_max_downloads")]
    pub max_downloads: u32,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Random draws before code generation falls back to a linear probe.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
}

fn default_code_length() -> u32 {
    4
}

fn default_ttl() -> u64 {
    8 * 3600 // 8 hours
}

fn default_max_downloads() -> u32 {
    3
}

fn default_max_upload_size() -> u64 {
    100
}

fn default_max_code_attempts() -> u32 {
    1000
}

impl RelayConfig {
    /// TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
    }

    /// Upload cap in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            ttl_secs: default_ttl(),
            max_downloads: default_max_downloads(),
            max_upload_size_mb: default_max_upload_size(),
            max_code_attempts: default_max_code_attempts(),
        }
    }
}

/// Per-client admission control configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Milliseconds between two refilled tokens.
    #[serde(default = "default_refill_interval")]
    pub refill_interval_ms: u64,
    /// Idle time after which a full bucket is dropped from the registry.
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,
}

fn default_capacity() -> u32 {
    20
}

fn default_refill_interval() -> u64 {
    1000
}

fn default_idle_eviction() -> u64 {
    600
}

impl RateLimitConfig {
    /// Create a configuration with the given capacity and refill interval.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval_ms: u64::try_from(refill_interval.as_millis()).unwrap_or(u64::MAX),
            idle_eviction_secs: default_idle_eviction(),
        }
    }

    /// Refill interval as a duration.
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    /// Idle eviction threshold as a duration.
    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_ms: default_refill_interval(),
            idle_eviction_secs: default_idle_eviction(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per code.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "data/relay".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Expiry sweeper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between two sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    3600 // hourly
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

/// Web layer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebConfig {
    /// CORS allowed origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Use `X-Forwarded-For` / `X-Real-IP` as the client identity.
    ///
    /// Only enable behind a reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/coderelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Rate limit configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sweeper configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Web configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RelayError::Config(format!("cannot read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CODERELAY_STORAGE_PATH`: storage root directory
    /// - `CODERELAY_PORT`: listen port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CODERELAY_STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.path = path;
            }
        }

        if let Ok(port) = std::env::var("CODERELAY_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid CODERELAY_PORT"),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.relay.code_length == 0 || self.relay.code_length > MAX_CODE_LENGTH {
            return Err(RelayError::Config(format!(
                "relay.code_length must be between 1 and {MAX_CODE_LENGTH}"
            )));
        }
        if self.relay.ttl_secs == 0 {
            return Err(RelayError::Config("relay.ttl_secs must be positive".into()));
        }
        if self.relay.max_downloads == 0 {
            return Err(RelayError::Config(
                "relay.max_downloads must be positive".into(),
            ));
        }
        if self.relay.max_upload_size_mb == 0 {
            return Err(RelayError::Config(
                "relay.max_upload_size_mb must be positive".into(),
            ));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.refill_interval_ms == 0 {
            return Err(RelayError::Config(
                "rate_limit.capacity and rate_limit.refill_interval_ms must be positive".into(),
            ));
        }
        if self.sweeper.interval_secs == 0 {
            return Err(RelayError::Config(
                "sweeper.interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
