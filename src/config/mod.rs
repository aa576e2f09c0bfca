// src/config/mod.rs
//! Connector configuration records and service-level configuration.

pub mod app;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::IngestError;

pub use app::{
    load_config_default, load_config_from, parse_config, AppConfig, CoordinatorSettings,
    PriorityTier, SchedulingConfig, ServerConfig,
};

fn default_enabled() -> bool {
    true
}
fn default_rate_limit() -> u32 {
    60
}
fn default_max_events() -> usize {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_rate_limit_wait_secs() -> u64 {
    30
}

/// Which limiter a connector gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    #[default]
    TokenBucket,
    SlidingWindow,
    Adaptive,
}

/// One configured source. Owned by the registry, one-to-one with a live connector.
///
/// Unknown keys land in `extra_params` (type-specific settings such as an
/// RSS `url`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// May be omitted when the record is keyed by id (bulk import).
    #[serde(default)]
    pub source_id: String,
    pub source_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Explicit per-source interval; `None` defers to tier/global defaults.
    #[serde(
        default,
        alias = "fetch_interval",
        skip_serializing_if = "Option::is_none"
    )]
    pub fetch_interval_seconds: Option<u64>,
    #[serde(default = "default_rate_limit", alias = "rate_limit")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_max_events")]
    pub max_events_per_fetch: usize,
    #[serde(default)]
    pub rate_limit_strategy: RateLimitStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// How long a fetch may wait for rate-limit tokens before giving up.
    #[serde(default = "default_rate_limit_wait_secs")]
    pub rate_limit_wait_secs: u64,
    #[serde(flatten)]
    pub extra_params: Map<String, Value>,
}

impl ConnectorConfig {
    pub fn new(source_id: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_type: source_type.into(),
            enabled: true,
            fetch_interval_seconds: None,
            rate_limit_per_minute: default_rate_limit(),
            max_events_per_fetch: default_max_events(),
            rate_limit_strategy: RateLimitStrategy::default(),
            burst_size: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            rate_limit_wait_secs: default_rate_limit_wait_secs(),
            extra_params: Map::new(),
        }
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.fetch_interval_seconds = Some(secs);
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn with_strategy(mut self, strategy: RateLimitStrategy) -> Self {
        self.rate_limit_strategy = strategy;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    /// Structural checks shared by every connector type.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.source_id.trim().is_empty() {
            return Err(IngestError::config("source_id must not be empty"));
        }
        if self.source_type.trim().is_empty() {
            return Err(IngestError::config(format!(
                "{}: source_type must not be empty",
                self.source_id
            )));
        }
        if self.fetch_interval_seconds == Some(0) {
            return Err(IngestError::config(format!(
                "{}: fetch_interval must be positive",
                self.source_id
            )));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(IngestError::config(format!(
                "{}: rate_limit must be positive",
                self.source_id
            )));
        }
        if self.max_events_per_fetch == 0 {
            return Err(IngestError::config(format!(
                "{}: max_events_per_fetch must be positive",
                self.source_id
            )));
        }
        if self.burst_size == Some(0) {
            return Err(IngestError::config(format!(
                "{}: burst_size must be positive",
                self.source_id
            )));
        }
        Ok(())
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_secs)
    }

    /// String parameter from `extra_params`.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.extra_params.get(key).and_then(Value::as_str)
    }

    /// Numeric parameter from `extra_params` (accepts ints and floats).
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.extra_params.get(key).and_then(Value::as_f64)
    }
}
