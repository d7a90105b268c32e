// Configuration for topnews.
// Layered defaults, optional YAML file, and TOPNEWS_* environment overrides.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};

/// Prefix for environment overrides, e.g. `TOPNEWS_CACHE__TTL_SECS=60`.
pub const ENV_PREFIX: &str = "TOPNEWS_";

const HN_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("upstream.base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("cache.max_entries must be at least 1")]
    ZeroCapacity,

    #[error("aggregator.max_concurrent_fetches must be at least 1")]
    ZeroConcurrency,

    #[error(
        "retry.initial_backoff_ms ({0}) must not exceed retry.max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub aggregator: AggregatorConfig,
    pub retry: RetryConfig,
}

/// Where and how to reach the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: HN_API_BASE.to_string(),
            user_agent: concat!("topnews/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.max_entries).ok_or(ConfigError::ZeroCapacity)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Cap on simultaneous item lookups within one aggregation.
    pub max_concurrent_fetches: usize,
    /// Deadline for one aggregation in seconds; 0 disables it.
    pub request_timeout_secs: u64,
}

impl AggregatorConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 16,
            request_timeout_secs: 30,
        }
    }
}

/// Retry settings for upstream calls. `max_retries = 0` disables retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest): defaults, the YAML file at `path` if
    /// given, then `TOPNEWS_*` environment variables with `__` separating
    /// nested keys.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        self.cache.capacity()?;
        if self.aggregator.max_concurrent_fetches == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms,
            ));
        }
        Ok(())
    }
}
