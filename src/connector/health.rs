// src/connector/health.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Connector;

/// Consecutive exhausted fetches at which a connector is reported unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorHealth {
    pub status: HealthStatus,
    pub accessible: bool,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ConnectorHealth {
    pub fn new(status: HealthStatus, accessible: bool) -> Self {
        Self {
            status,
            accessible,
            details: Map::new(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, false).with_detail("error", error.into())
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Health derived from the connector's own stats.
pub fn default_health<C: Connector + ?Sized>(connector: &C) -> ConnectorHealth {
    let stats = connector.stats().snapshot();
    let status = match stats.consecutive_failures {
        0 => HealthStatus::Healthy,
        n if n < UNHEALTHY_AFTER_FAILURES => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };
    let limiter = connector.rate_limiter().status();
    let mut health = ConnectorHealth::new(status, status != HealthStatus::Unhealthy)
        .with_detail("source_type", connector.source_type())
        .with_detail("total_fetches", stats.total_fetches)
        .with_detail("errors", stats.errors)
        .with_detail("consecutive_failures", stats.consecutive_failures)
        .with_detail("rate_limit_available", limiter.available);
    if let Some(err) = stats.last_error {
        health = health.with_detail("last_error", err);
    }
    if let Some(ts) = stats.last_fetch_time {
        health = health.with_detail("last_fetch_time", ts.to_rfc3339());
    }
    health
}

/// Aggregate over every registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NoSources,
    Healthy,
    Degraded,
    Unhealthy,
}

/// Healthy when nothing is unhealthy; degraded while fewer than half are.
pub fn overall_status<'a, I>(healths: I) -> OverallStatus
where
    I: IntoIterator<Item = &'a ConnectorHealth>,
{
    let (total, unhealthy) = healths.into_iter().fold((0usize, 0usize), |(t, u), h| {
        (t + 1, u + usize::from(h.status == HealthStatus::Unhealthy))
    });
    match (total, unhealthy) {
        (0, _) => OverallStatus::NoSources,
        (_, 0) => OverallStatus::Healthy,
        (t, u) if u * 2 < t => OverallStatus::Degraded,
        _ => OverallStatus::Unhealthy,
    }
}
