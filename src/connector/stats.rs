// src/connector/stats.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Per-connector counters, written by the retry wrapper.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    total_fetches: AtomicU64,
    total_events: AtomicU64,
    errors: AtomicU64,
    consecutive_failures: AtomicU32,
    last_fetch_time: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorStatsSnapshot {
    pub total_fetches: u64,
    pub total_events: u64,
    pub errors: u64,
    pub consecutive_failures: u32,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ConnectorStats {
    /// One successful `fetch_events` call.
    pub fn record_success(&self, events: usize) {
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        self.total_events.fetch_add(events as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_fetch_time.lock().expect("stats mutex poisoned") = Some(Utc::now());
    }

    /// One failed attempt.
    pub fn record_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().expect("stats mutex poisoned") = Some(message.to_string());
    }

    /// All attempts of one fetch failed.
    pub fn record_exhausted(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ConnectorStatsSnapshot {
        ConnectorStatsSnapshot {
            total_fetches: self.total_fetches.load(Ordering::Relaxed),
            total_events: self.total_events.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_fetch_time: *self.last_fetch_time.lock().expect("stats mutex poisoned"),
            last_error: self.last_error.lock().expect("stats mutex poisoned").clone(),
        }
    }
}
