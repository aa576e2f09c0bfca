// src/connector/retry.rs
//! Exponential-backoff wrapper around `Connector::fetch_events`.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use super::Connector;
use crate::config::ConnectorConfig;
use crate::error::IngestError;
use crate::event::RawEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &ConnectorConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
        }
    }

    /// Delay before retry `n` (0-based): base * 2^n, capped at 64x.
    pub fn delay_for(&self, n: u32) -> Duration {
        self.base_delay * (1u32 << n.min(6))
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Try `fetch_events` up to `max_retries + 1` times.
///
/// Every failed attempt bumps `errors` and `last_error`; a success bumps
/// `total_fetches`/`total_events`. The limiter hears about both outcomes so an
/// adaptive limiter can tune itself.
pub async fn fetch_with_retry<C: Connector + ?Sized>(
    connector: &C,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<RawEvent>, IngestError> {
    let policy = RetryPolicy::from_config(connector.config());
    let source_id = connector.source_id();
    let mut last_error = None;

    for attempt in 0..policy.attempts() {
        if attempt > 0 {
            let delay = policy.delay_for(attempt - 1);
            debug!(
                target: "ingest",
                source_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match connector.fetch_events(since).await {
            Ok(events) => {
                connector.stats().record_success(events.len());
                connector.rate_limiter().record_success();
                return Ok(events);
            }
            Err(e) => {
                let message = format!("{e:#}");
                connector.stats().record_error(&message);
                connector.rate_limiter().record_failure();
                if attempt < policy.max_retries {
                    debug!(target: "ingest", source_id, attempt, error = %message, "fetch failed, will retry");
                }
                last_error = Some(message);
            }
        }
    }

    connector.stats().record_exhausted();
    let message = last_error.unwrap_or_else(|| "unknown error".to_string());
    warn!(
        target: "ingest",
        source_id,
        attempts = policy.attempts(),
        error = %message,
        "fetch failed after all retries"
    );
    Err(IngestError::Fetch {
        source_id: source_id.to_string(),
        attempts: policy.attempts(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
        assert_eq!(p.delay_for(9), Duration::from_millis(6400));
        assert_eq!(p.attempts(), 11);
    }
}
