//! Configuration management for throttle-http.
//!
//! Configuration is an explicit value built once by the caller (from a file,
//! discovered with the prefer crate, or in code) and handed to the components
//! at construction.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name used for config file discovery and the default state file.
pub const APP_NAME: &str = "throttle-http";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convert a seconds value from configuration into a duration.
/// Negative or non-finite values become zero (and fail validation).
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum admissions per window.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Rolling window length in seconds.
    #[serde(default = "default_time_period")]
    pub time_period: f64,
    /// Share the window between processes through a SQLite file.
    #[serde(default)]
    pub multiprocessing_mode: bool,
    /// SQLite file backing the shared window (multiprocessing mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    /// Key of this limiter's log inside the state file.
    #[serde(default = "default_limiter_name")]
    pub name: String,
}

fn default_limit() -> u32 {
    10
}

fn default_time_period() -> f64 {
    1.0
}

fn default_limiter_name() -> String {
    "default".to_string()
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            time_period: default_time_period(),
            multiprocessing_mode: false,
            state_path: None,
            name: default_limiter_name(),
        }
    }
}

impl RateLimitSettings {
    pub fn period(&self) -> Duration {
        secs(self.time_period)
    }

    /// State file path, defaulting to a file in the system temp directory.
    pub fn state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{}-rate-limit.db", APP_NAME)))
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max: u32,
    /// Status codes eligible for retry.
    #[serde(default = "default_retry_codes")]
    pub codes: BTreeSet<u16>,
    /// Delay in seconds after a 429.
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,
    /// Delay in seconds after a retryable 5xx.
    #[serde(default = "default_short_delay")]
    pub server_error_delay: f64,
    /// Delay in seconds after a transport failure.
    #[serde(default = "default_short_delay")]
    pub transport_error_delay: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_codes() -> BTreeSet<u16> {
    [429, 500, 502, 503, 504].into_iter().collect()
}

fn default_rate_limit_delay() -> f64 {
    15.0
}

fn default_short_delay() -> f64 {
    1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max: default_max_retries(),
            codes: default_retry_codes(),
            rate_limit_delay: default_rate_limit_delay(),
            server_error_delay: default_short_delay(),
            transport_error_delay: default_short_delay(),
        }
    }
}

impl RetryConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        secs(self.rate_limit_delay)
    }

    pub fn server_error_delay(&self) -> Duration {
        secs(self.server_error_delay)
    }

    pub fn transport_error_delay(&self) -> Duration {
        secs(self.transport_error_delay)
    }
}

/// Per-request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub retries: RetryConfig,
    /// Status codes treated as success.
    #[serde(default = "default_success_codes")]
    pub success_codes: BTreeSet<u16>,
    /// Pick a random browser User-Agent for every attempt.
    #[serde(default)]
    pub randomize_agent: bool,
    /// Headers sent with every request unless the caller overrides them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_success_codes() -> BTreeSet<u16> {
    [200, 201, 202, 204].into_iter().collect()
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: RetryConfig::default(),
            success_codes: default_success_codes(),
            randomize_agent: false,
            headers: BTreeMap::new(),
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub request: RequestConfig,
    /// File this configuration was read from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with env overrides) when no file is found.
    pub async fn load() -> Self {
        match prefer::load(APP_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file: {}", e);
                            Self::default().with_env_overrides()
                        }
                    }
                } else {
                    Self::default().with_env_overrides()
                }
            }
            Err(_) => Self::default().with_env_overrides(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Parse configuration text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply `THROTTLE_*` environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = env_parse::<u32>("THROTTLE_RATE_LIMIT") {
            self.rate_limit.limit = limit;
        }
        if let Some(period) = env_parse::<f64>("THROTTLE_TIME_PERIOD") {
            self.rate_limit.time_period = period;
        }
        if let Some(multi) = env_parse::<bool>("THROTTLE_MULTIPROCESS") {
            self.rate_limit.multiprocessing_mode = multi;
        }
        if let Ok(path) = std::env::var("THROTTLE_STATE_PATH") {
            if !path.is_empty() {
                self.rate_limit.state_path = Some(PathBuf::from(path));
            }
        }
        self
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.limit == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.limit must be greater than 0".into(),
            ));
        }
        if self.rate_limit.period().is_zero() {
            return Err(ConfigError::Invalid(
                "rate_limit.time_period must be a positive number of seconds".into(),
            ));
        }
        if self.request.timeout().is_zero() {
            return Err(ConfigError::Invalid(
                "request.timeout must be a positive number of seconds".into(),
            ));
        }
        if self.request.success_codes.is_empty() {
            return Err(ConfigError::Invalid(
                "request.success_codes must not be empty".into(),
            ));
        }

        let retries = &self.request.retries;
        for (name, value) in [
            ("rate_limit_delay", retries.rate_limit_delay),
            ("server_error_delay", retries.server_error_delay),
            ("transport_error_delay", retries.transport_error_delay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "request.retries.{} must be zero or a positive number of seconds",
                    name
                )));
            }
        }

        for code in self.request.success_codes.iter().chain(&retries.codes) {
            if !(100..=599).contains(code) {
                return Err(ConfigError::Invalid(format!(
                    "{} is not a valid HTTP status code",
                    code
                )));
            }
        }

        let overlap: Vec<_> = self
            .request
            .success_codes
            .intersection(&retries.codes)
            .collect();
        if !overlap.is_empty() {
            warn!(
                "Status codes {:?} are both success and retry codes; treating them as success",
                overlap
            );
        }

        Ok(())
    }

    /// Pretty JSON rendering of the effective configuration.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
