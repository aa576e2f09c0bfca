// src/connector/mod.rs
//! Connector capability interface.
//!
//! A connector knows how to pull raw content from one source type. It owns its
//! config, its rate limiter and its stats; the coordinator only sees the trait.
//!
//! # Writing a connector
//!
//! Embed a [`ConnectorBase`], delegate the three accessors to it and implement
//! `fetch_events`. Call [`ConnectorBase::acquire_permit`] before any I/O and
//! return an empty result when it fails.
//!
//! ```ignore
//! struct MyConnector { base: ConnectorBase }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     fn config(&self) -> &ConnectorConfig { self.base.config() }
//!     fn rate_limiter(&self) -> &dyn RateLimiter { self.base.limiter() }
//!     fn stats(&self) -> &ConnectorStats { self.base.stats() }
//!     async fn fetch_events(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<RawEvent>> {
//!         if !self.base.acquire_permit().await {
//!             return Ok(Vec::new());
//!         }
//!         /* ... */
//!     }
//! }
//! ```

mod health;
pub mod retry;
pub mod rss;
mod stats;

pub use health::{default_health, overall_status, ConnectorHealth, HealthStatus, OverallStatus};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use rss::{RssConnector, RSS_TYPE};
pub use stats::{ConnectorStats, ConnectorStatsSnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::config::ConnectorConfig;
use crate::error::IngestError;
use crate::event::RawEvent;
use crate::rate_limit::{build_limiter, RateLimiter};

#[async_trait]
pub trait Connector: Send + Sync {
    fn config(&self) -> &ConnectorConfig;

    fn rate_limiter(&self) -> &dyn RateLimiter;

    fn stats(&self) -> &ConnectorStats;

    fn source_id(&self) -> &str {
        &self.config().source_id
    }

    fn source_type(&self) -> &str {
        &self.config().source_type
    }

    /// Called once at registration; an error aborts the registration.
    fn validate_config(&self) -> Result<(), IngestError> {
        self.config().validate()
    }

    /// Pull events newer than `since` (everything available when `None`).
    async fn fetch_events(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<RawEvent>>;

    async fn health_status(&self) -> ConnectorHealth {
        default_health(self)
    }

    /// `fetch_events` with exponential backoff and stats bookkeeping.
    async fn fetch_with_retry(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, IngestError> {
        retry::fetch_with_retry(self, since).await
    }
}

/// Shared state every connector needs: config, limiter, stats.
#[derive(Debug)]
pub struct ConnectorBase {
    config: ConnectorConfig,
    limiter: Arc<dyn RateLimiter>,
    stats: ConnectorStats,
}

impl ConnectorBase {
    /// Builds the limiter the config asks for.
    pub fn new(config: ConnectorConfig) -> Self {
        let limiter = build_limiter(&config);
        Self::with_limiter(config, limiter)
    }

    pub fn with_limiter(config: ConnectorConfig, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            config,
            limiter,
            stats: ConnectorStats::default(),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn limiter(&self) -> &dyn RateLimiter {
        self.limiter.as_ref()
    }

    pub fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    /// Wait (bounded by `rate_limit_wait_secs`) for one request token.
    pub async fn acquire_permit(&self) -> bool {
        let ok = self
            .limiter
            .wait_for_tokens(1, self.config.rate_limit_wait())
            .await;
        if !ok {
            debug!(
                target: "ingest",
                source_id = %self.config.source_id,
                wait_secs = self.config.rate_limit_wait_secs,
                "rate limit wait exhausted, skipping fetch"
            );
        }
        ok
    }

    /// Keep at most `max_events_per_fetch` events.
    pub fn cap(&self, mut events: Vec<RawEvent>) -> Vec<RawEvent> {
        events.truncate(self.config.max_events_per_fetch);
        events
    }
}
