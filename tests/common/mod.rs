// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ingest_coordinator::connector::ConnectorStats;
use ingest_coordinator::{
    Connector, ConnectorBase, ConnectorConfig, IngestError, RateLimiter, RawEvent, Registry,
};

pub const MOCK_TYPE: &str = "mock";

/// What a [`MockConnector`] does on each `fetch_events` call, read from
/// `extra_params.behavior`.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return `events` items every call.
    Events(usize),
    /// Always fail.
    Fail,
    /// Fail the first `failures` calls, then return `events` items.
    Flaky { failures: usize, events: usize },
    /// Sleep, then return `events` items.
    Slow { delay: Duration, events: usize },
    /// Panic inside the fetch.
    Panic,
}

impl Behavior {
    fn from_config(cfg: &ConnectorConfig) -> Result<Self, IngestError> {
        let n = |key: &str, default: usize| {
            cfg.param_f64(key).map(|v| v as usize).unwrap_or(default)
        };
        match cfg.param_str("behavior").unwrap_or("events") {
            "events" => Ok(Behavior::Events(n("events", 3))),
            "fail" => Ok(Behavior::Fail),
            "flaky" => Ok(Behavior::Flaky {
                failures: n("failures", 1),
                events: n("events", 3),
            }),
            "slow" => Ok(Behavior::Slow {
                delay: Duration::from_millis(n("delay_ms", 10_000) as u64),
                events: n("events", 1),
            }),
            "panic" => Ok(Behavior::Panic),
            other => Err(IngestError::config(format!("unknown mock behavior {other}"))),
        }
    }
}

pub struct MockConnector {
    base: ConnectorBase,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockConnector {
    pub fn from_config(config: ConnectorConfig) -> Result<Self, IngestError> {
        let behavior = Behavior::from_config(&config)?;
        Ok(Self {
            base: ConnectorBase::new(config),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn events(&self, n: usize) -> Vec<RawEvent> {
        let cfg = self.base.config();
        let content = cfg.param_str("content");
        (0..n)
            .map(|i| {
                let text = content.map(str::to_string).unwrap_or_else(|| {
                    format!(
                        "Regional flood report {i} from {}: water levels rose along the river and roads were closed.",
                        cfg.source_id
                    )
                });
                RawEvent::new(&cfg.source_id, MOCK_TYPE, text, minutes_ago(i as i64))
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn config(&self) -> &ConnectorConfig {
        self.base.config()
    }

    fn rate_limiter(&self) -> &dyn RateLimiter {
        self.base.limiter()
    }

    fn stats(&self) -> &ConnectorStats {
        self.base.stats()
    }

    async fn fetch_events(&self, _since: Option<DateTime<Utc>>) -> anyhow::Result<Vec<RawEvent>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.base.acquire_permit().await {
            return Ok(Vec::new());
        }
        match &self.behavior {
            Behavior::Events(n) => Ok(self.events(*n)),
            Behavior::Fail => bail!("upstream unavailable"),
            Behavior::Flaky { failures, events } => {
                if call < *failures {
                    bail!("transient failure on call {call}");
                }
                Ok(self.events(*events))
            }
            Behavior::Slow { delay, events } => {
                tokio::time::sleep(*delay).await;
                Ok(self.events(*events))
            }
            Behavior::Panic => panic!("connector bug"),
        }
    }
}

pub fn minutes_ago(m: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::minutes(m)
}

/// Registry with the built-in types plus [`MOCK_TYPE`].
pub fn mock_registry() -> Registry {
    let r = Registry::with_builtin_types();
    r.register_connector_type(MOCK_TYPE, |cfg| {
        Ok(Arc::new(MockConnector::from_config(cfg)?) as Arc<dyn Connector>)
    });
    r
}

/// Mock source config with fast retries.
pub fn mock(id: &str, behavior: &str) -> ConnectorConfig {
    ConnectorConfig::new(id, MOCK_TYPE)
        .with_param("behavior", behavior)
        .with_retries(0, 1)
}
