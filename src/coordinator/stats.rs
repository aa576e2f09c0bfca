// src/coordinator/stats.rs
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::registry::RegistryStats;
use crate::validate::ValidatorStats;

/// Describe the coordinator's metrics once per process.
pub fn ensure_metrics_described() {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        metrics::describe_counter!("ingest_fetches_total", "Successful fetch calls per source");
        metrics::describe_counter!("ingest_events_total", "Events returned by connectors");
        metrics::describe_counter!("ingest_validated_total", "Events that passed validation");
        metrics::describe_counter!("ingest_processed_total", "Events accepted by the processor");
        metrics::describe_counter!("ingest_dedup_total", "Events dropped as duplicates");
        metrics::describe_counter!(
            "ingest_source_errors_total",
            "Fetch failures, timeouts and panics per source"
        );
        metrics::describe_counter!(
            "ingest_processing_errors_total",
            "Event processor failures per source"
        );
        metrics::describe_counter!(
            "ingest_validation_failures_total",
            "Rejected events by reason code"
        );
        metrics::describe_histogram!("ingest_fetch_duration_ms", "Fetch wall time in ms");
        metrics::describe_gauge!("ingest_last_run_ts", "Unix ts of the last fetch cycle");
        metrics::describe_gauge!("ingest_running_sources", "Per-source loops currently running");
    });
}

/// Counters for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStats {
    pub fetches: u64,
    pub events: u64,
    pub validated: u64,
    pub processed: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub processing_errors: u64,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Totals {
    fetches: u64,
    events: u64,
    validated: u64,
    processed: u64,
    duplicates: u64,
    errors: u64,
    processing_errors: u64,
    last_run: Option<DateTime<Utc>>,
    per_source: BTreeMap<String, SourceStats>,
}

/// What one batch did, for stats and callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub received: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub validated: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Aggregated ingestion counters, shared by every source loop.
#[derive(Debug, Default)]
pub struct IngestionStats {
    inner: Mutex<Totals>,
}

impl IngestionStats {
    pub fn record_fetch(&self, source_id: &str, events: usize, duration_ms: u64) {
        let now = Utc::now();
        {
            let mut t = self.inner.lock().expect("stats mutex poisoned");
            t.fetches += 1;
            t.events += events as u64;
            t.last_run = Some(now);
            let s = t.per_source.entry(source_id.to_string()).or_default();
            s.fetches += 1;
            s.events += events as u64;
            s.last_fetch = Some(now);
            s.last_duration_ms = Some(duration_ms);
        }
        counter!("ingest_fetches_total", "source" => source_id.to_string()).increment(1);
        counter!("ingest_events_total", "source" => source_id.to_string()).increment(events as u64);
        histogram!("ingest_fetch_duration_ms").record(duration_ms as f64);
        gauge!("ingest_last_run_ts").set(now.timestamp() as f64);
    }

    pub fn record_batch(&self, source_id: &str, outcome: &BatchOutcome) {
        {
            let mut t = self.inner.lock().expect("stats mutex poisoned");
            t.validated += outcome.validated as u64;
            t.processed += outcome.processed as u64;
            t.duplicates += outcome.duplicates as u64;
            t.processing_errors += outcome.failed as u64;
            let s = t.per_source.entry(source_id.to_string()).or_default();
            s.validated += outcome.validated as u64;
            s.processed += outcome.processed as u64;
            s.duplicates += outcome.duplicates as u64;
            s.processing_errors += outcome.failed as u64;
        }
        let source = source_id.to_string();
        counter!("ingest_validated_total", "source" => source.clone())
            .increment(outcome.validated as u64);
        counter!("ingest_processed_total", "source" => source.clone())
            .increment(outcome.processed as u64);
        counter!("ingest_dedup_total", "source" => source.clone())
            .increment(outcome.duplicates as u64);
        if outcome.failed > 0 {
            counter!("ingest_processing_errors_total", "source" => source)
                .increment(outcome.failed as u64);
        }
    }

    /// A source-level failure: fetch error, timeout or panicked cycle.
    pub fn record_source_error(&self, source_id: &str, message: &str) {
        {
            let mut t = self.inner.lock().expect("stats mutex poisoned");
            t.errors += 1;
            let s = t.per_source.entry(source_id.to_string()).or_default();
            s.errors += 1;
            s.last_error = Some(message.to_string());
        }
        counter!("ingest_source_errors_total", "source" => source_id.to_string()).increment(1);
    }

    /// Processor failure for one event; the message is kept as the source's last error.
    pub fn note_processing_error(&self, source_id: &str, message: &str) {
        let mut t = self.inner.lock().expect("stats mutex poisoned");
        t.per_source
            .entry(source_id.to_string())
            .or_default()
            .last_error = Some(message.to_string());
    }

    pub fn source(&self, source_id: &str) -> Option<SourceStats> {
        self.inner
            .lock()
            .expect("stats mutex poisoned")
            .per_source
            .get(source_id)
            .cloned()
    }

    pub fn snapshot(&self, validator: ValidatorStats, registry: RegistryStats) -> StatsSnapshot {
        let t = self.inner.lock().expect("stats mutex poisoned");
        StatsSnapshot {
            total_fetches: t.fetches,
            total_events: t.events,
            total_validated: t.validated,
            total_processed: t.processed,
            total_duplicates: t.duplicates,
            errors: t.errors,
            processing_errors: t.processing_errors,
            avg_events_per_fetch: ratio(t.events, t.fetches),
            validation_rate: ratio(t.validated, t.events),
            processing_rate: ratio(t.processed, t.validated),
            last_run: t.last_run,
            per_source_stats: t.per_source.clone(),
            validator_stats: validator,
            registry_stats: registry,
        }
    }

    pub fn reset(&self) {
        *self.inner.lock().expect("stats mutex poisoned") = Totals::default();
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Read API for `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_fetches: u64,
    pub total_events: u64,
    pub total_validated: u64,
    pub total_processed: u64,
    pub total_duplicates: u64,
    pub errors: u64,
    pub processing_errors: u64,
    pub avg_events_per_fetch: f64,
    pub validation_rate: f64,
    pub processing_rate: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub per_source_stats: BTreeMap<String, SourceStats>,
    pub validator_stats: ValidatorStats,
    pub registry_stats: RegistryStats,
}
