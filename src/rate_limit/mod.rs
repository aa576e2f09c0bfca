// src/rate_limit/mod.rs
//! Per-connector request throttling.
//!
//! Three interchangeable strategies behind [`RateLimiter`]:
//! - [`TokenBucket`]: continuous refill at `rate/60` tokens per second, capacity = burst
//! - [`SlidingWindow`]: at most N requests within a trailing window
//! - [`AdaptiveLimiter`]: token bucket whose rate follows the observed success ratio
//!
//! All of them are safe to share between tasks (`Arc<dyn RateLimiter>`).
//! Time is read from `tokio::time::Instant` so paused-clock tests stay deterministic.

mod adaptive;
mod sliding_window;
mod token_bucket;

pub use adaptive::{AdaptiveLimiter, DEFAULT_ADJUST_INTERVAL};
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{ConnectorConfig, RateLimitStrategy};

/// Longest single sleep inside [`RateLimiter::wait_for_tokens`].
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStatus {
    pub strategy: &'static str,
    pub available: f64,
    pub capacity: f64,
    pub rate_per_minute: f64,
}

#[async_trait]
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Non-blocking: take `tokens` if available right now.
    fn acquire(&self, tokens: u32) -> bool;

    fn status(&self) -> LimiterStatus;

    /// Best guess of how long until `tokens` could be available.
    fn retry_hint(&self, _tokens: u32) -> Duration {
        Duration::from_millis(100)
    }

    /// Outcome feedback from the caller; only the adaptive variant uses it.
    fn record_success(&self) {}

    fn record_failure(&self) {}

    /// Poll until `tokens` are acquired or `timeout` elapses.
    async fn wait_for_tokens(&self, tokens: u32, timeout: Duration) -> bool {
        if f64::from(tokens) > self.status().capacity {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.acquire(tokens) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let nap = self
                .retry_hint(tokens)
                .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
                .min(deadline - now);
            tokio::time::sleep(nap).await;
        }
    }
}

/// Build the limiter a connector config asks for.
///
/// Adaptive bounds come from `extra_params.min_rate` / `max_rate`
/// (defaults: a quarter and four times the configured rate).
pub fn build_limiter(cfg: &ConnectorConfig) -> Arc<dyn RateLimiter> {
    let rate = cfg.rate_limit_per_minute.max(1);
    match cfg.rate_limit_strategy {
        RateLimitStrategy::TokenBucket => Arc::new(TokenBucket::new(rate, cfg.burst_size)),
        RateLimitStrategy::SlidingWindow => Arc::new(SlidingWindow::per_minute(rate)),
        RateLimitStrategy::Adaptive => {
            let base = f64::from(rate);
            let min_rate = cfg.param_f64("min_rate").unwrap_or(base / 4.0).max(1.0);
            let max_rate = cfg.param_f64("max_rate").unwrap_or(base * 4.0).max(min_rate);
            Arc::new(AdaptiveLimiter::new(rate, cfg.burst_size, min_rate, max_rate))
        }
    }
}
