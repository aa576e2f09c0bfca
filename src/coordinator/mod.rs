// src/coordinator/mod.rs
//! Scheduling and orchestration.
//!
//! `start` spawns one polling loop per enabled source, staggered by
//! `i * stagger_delay`. Each loop runs fetch cycles strictly one after another:
//! fetch (bounded by `fetch_timeout`), dedup, validate, dispatch to the event
//! processor, then sleep for the source's interval. A failed or panicking
//! cycle is recorded against its source and the loop backs off
//! `min(interval, error_backoff_cap)` before trying again.
//!
//! `stop` flips the running flag, signals every loop through a watch channel
//! and awaits them all, so no cycle outlives the call. A cycle still waiting on
//! its fetch is cancelled; one that is already dispatching finishes its batch.
//! Cycles for one source never overlap, whether started by its loop or by
//! [`Coordinator::fetch_from_source`].
//!
//! Interval precedence per source: manual override
//! ([`Coordinator::configure_source_intervals`]) > the source's own
//! `fetch_interval_seconds` > priority tier > the default passed to `start`.

mod dedup;
mod processor;
mod stats;

pub use dedup::DedupCache;
pub use processor::{EventProcessor, LoggingProcessor};
pub use stats::{ensure_metrics_described, BatchOutcome, IngestionStats, SourceStats, StatsSnapshot};

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{CoordinatorSettings, SchedulingConfig};
use crate::connector::{overall_status, ConnectorHealth, OverallStatus};
use crate::error::IngestError;
use crate::event::RawEvent;
use crate::registry::Registry;
use crate::validate::DataValidator;

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorHealth {
    pub status: OverallStatus,
    pub running: bool,
    pub sources: BTreeMap<String, ConnectorHealth>,
}

pub struct CoordinatorBuilder {
    registry: Arc<Registry>,
    validator: Option<Arc<DataValidator>>,
    processor: Option<Arc<dyn EventProcessor>>,
    settings: CoordinatorSettings,
}

impl CoordinatorBuilder {
    pub fn validator(mut self, validator: Arc<DataValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn processor<P: EventProcessor + 'static>(mut self, processor: P) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn shared_processor(mut self, processor: Arc<dyn EventProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Coordinator {
        ensure_metrics_described();
        let (shutdown, _) = watch::channel(false);
        let default_ms = duration_ms(self.settings.default_interval());
        Coordinator {
            shared: Arc::new(Shared {
                registry: self.registry,
                validator: self.validator.unwrap_or_default(),
                processor: self.processor,
                dedup: Mutex::new(DedupCache::new(self.settings.dedup_max_entries)),
                settings: self.settings,
                default_interval_ms: AtomicU64::new(default_ms),
                stats: IngestionStats::default(),
                last_fetch: Mutex::new(HashMap::new()),
                cycle_locks: Mutex::new(HashMap::new()),
                overrides: RwLock::new(HashMap::new()),
                tiers: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

struct Shared {
    registry: Arc<Registry>,
    validator: Arc<DataValidator>,
    processor: Option<Arc<dyn EventProcessor>>,
    settings: CoordinatorSettings,
    default_interval_ms: AtomicU64,
    dedup: Mutex<DedupCache>,
    stats: IngestionStats,
    last_fetch: Mutex<HashMap<String, DateTime<Utc>>>,
    cycle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    overrides: RwLock<HashMap<String, u64>>,
    tiers: RwLock<HashMap<String, u64>>,
    running: AtomicBool,
}

pub struct Coordinator {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn builder(registry: Arc<Registry>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            registry,
            validator: None,
            processor: None,
            settings: CoordinatorSettings::default(),
        }
    }

    /// Coordinator with default settings and no event processor.
    pub fn new(registry: Arc<Registry>, validator: Arc<DataValidator>) -> Self {
        Self::builder(registry).validator(validator).build()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    pub fn validator(&self) -> &Arc<DataValidator> {
        &self.shared.validator
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start with the configured default interval and stagger.
    pub fn start(&self) -> usize {
        let s = &self.shared.settings;
        self.start_with(s.default_interval(), s.stagger_delay())
    }

    /// Spawn one loop per enabled source. Must run inside a Tokio runtime.
    /// Returns the number of loops spawned; a second call while running is a no-op.
    pub fn start_with(&self, default_interval: Duration, stagger_delay: Duration) -> usize {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!(target: "ingest", "coordinator already running");
            return 0;
        }
        self.shared
            .default_interval_ms
            .store(duration_ms(default_interval), Ordering::Relaxed);
        self.shutdown.send_replace(false);

        let connectors = self.shared.registry.get_enabled_connectors();
        let mut tasks = self.tasks.lock().expect("tasks mutex poisoned");
        for (i, connector) in connectors.iter().enumerate() {
            let source_id = connector.source_id().to_string();
            let initial_delay = stagger_delay.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
            debug!(
                target: "ingest",
                source_id = %source_id,
                initial_delay_ms = duration_ms(initial_delay),
                interval_secs = self.shared.effective_interval(&source_id).as_secs(),
                "scheduling source loop"
            );
            tasks.push(tokio::spawn(source_loop(
                self.shared.clone(),
                source_id,
                initial_delay,
                self.shutdown.subscribe(),
            )));
        }
        gauge!("ingest_running_sources").set(tasks.len() as f64);
        info!(
            target: "ingest",
            sources = connectors.len(),
            default_interval_secs = default_interval.as_secs(),
            stagger_secs = stagger_delay.as_secs(),
            "coordinator started"
        );
        connectors.len()
    }

    /// Cancel every source loop and wait for all of them to finish.
    pub async fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        let handles = std::mem::take(&mut *self.tasks.lock().expect("tasks mutex poisoned"));
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(target: "ingest", error = %e, "source loop panicked");
                }
            }
        }
        gauge!("ingest_running_sources").set(0.0);
        if was_running {
            info!(target: "ingest", "coordinator stopped");
        }
    }

    /// One fetch cycle for `source_id`. Missing or disabled sources and any
    /// fetch failure yield an empty result; failures are recorded in stats.
    pub async fn fetch_from_source(&self, source_id: &str) -> Vec<RawEvent> {
        self.shared
            .fetch_from_source(source_id, None)
            .await
            .unwrap_or_default()
    }

    /// One-shot fan-out over every enabled source, at most `max_concurrent`
    /// at a time. Every enabled source gets an entry, empty on failure.
    pub async fn fetch_from_all_sources(&self, max_concurrent: usize) -> HashMap<String, Vec<RawEvent>> {
        let connectors = self.shared.registry.get_enabled_connectors();
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut set = JoinSet::new();
        for connector in connectors {
            let source_id = connector.source_id().to_string();
            let shared = self.shared.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let cycle = spawn_cycle(&shared, &source_id, None);
                let _guard = AbortOnDrop(cycle.abort_handle());
                let events = match cycle.await {
                    Ok(Ok(events)) => events,
                    Ok(Err(_)) => Vec::new(),
                    Err(e) => {
                        shared.record_cycle_failure(&source_id, e);
                        Vec::new()
                    }
                };
                (source_id, events)
            });
        }

        let mut out = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((source_id, events)) => {
                    out.insert(source_id, events);
                }
                Err(e) => error!(target: "ingest", error = %e, "fetch-all task failed"),
            }
        }
        out
    }

    /// [`fetch_from_all_sources`](Self::fetch_from_all_sources) with the configured `max_concurrent`.
    pub async fn fetch_all(&self) -> HashMap<String, Vec<RawEvent>> {
        self.fetch_from_all_sources(self.shared.settings.max_concurrent)
            .await
    }

    /// Dedup, validate and dispatch a batch on behalf of `source_id`.
    pub async fn process_events_batch(&self, source_id: &str, events: &[RawEvent]) -> BatchOutcome {
        self.shared.process_events_batch(source_id, events).await
    }

    /// Manual per-source interval overrides (seconds). Zero is ignored.
    pub fn configure_source_intervals<I, S>(&self, intervals: I)
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut overrides = self.shared.overrides.write().expect("intervals lock poisoned");
        for (source_id, secs) in intervals {
            let source_id = source_id.into();
            if secs == 0 {
                warn!(target: "ingest", source_id = %source_id, "ignoring zero interval override");
                continue;
            }
            overrides.insert(source_id, secs);
        }
    }

    /// Replace the tier intervals. Sources with an explicit interval of their
    /// own keep it. Returns how many sources a tier names.
    pub fn apply_priority_tiers(&self, scheduling: &SchedulingConfig) -> usize {
        let intervals = scheduling.tier_intervals();
        for (source_id, secs) in &intervals {
            if let Some(own) = self
                .shared
                .registry
                .get_config(source_id)
                .and_then(|c| c.fetch_interval_seconds)
            {
                debug!(
                    target: "ingest",
                    source_id = %source_id,
                    own_secs = own,
                    tier_secs = secs,
                    "explicit interval wins over tier"
                );
            }
        }
        let n = intervals.len();
        *self.shared.tiers.write().expect("intervals lock poisoned") = intervals.into_iter().collect();
        n
    }

    pub fn effective_interval(&self, source_id: &str) -> Duration {
        self.shared.effective_interval(source_id)
    }

    pub fn last_fetch_time(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.shared
            .last_fetch
            .lock()
            .expect("last fetch mutex poisoned")
            .get(source_id)
            .copied()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(
            self.shared.validator.stats(),
            self.shared.registry.registry_stats(),
        )
    }

    pub fn source_stats(&self, source_id: &str) -> Option<SourceStats> {
        self.shared.stats.source(source_id)
    }

    /// Zero coordinator and validator counters. The dedup cache is kept.
    pub fn reset_stats(&self) {
        self.shared.stats.reset();
        self.shared.validator.reset();
    }

    pub async fn health(&self) -> CoordinatorHealth {
        let sources = self.shared.registry.health_check_all().await;
        CoordinatorHealth {
            status: overall_status(sources.values()),
            running: self.is_running(),
            sources,
        }
    }
}

impl Shared {
    fn effective_interval(&self, source_id: &str) -> Duration {
        if let Some(secs) = self
            .overrides
            .read()
            .expect("intervals lock poisoned")
            .get(source_id)
        {
            return Duration::from_secs(*secs);
        }
        if let Some(secs) = self
            .registry
            .get_config(source_id)
            .and_then(|c| c.fetch_interval_seconds)
        {
            return Duration::from_secs(secs);
        }
        if let Some(secs) = self.tiers.read().expect("intervals lock poisoned").get(source_id) {
            return Duration::from_secs(*secs);
        }
        Duration::from_millis(self.default_interval_ms.load(Ordering::Relaxed))
    }

    fn cycle_lock(&self, source_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.cycle_locks
            .lock()
            .expect("cycle locks mutex poisoned")
            .entry(source_id.to_string())
            .or_default()
            .clone()
    }

    /// One fetch cycle. With `stop`, a shutdown signal cancels the fetch
    /// before anything is dispatched.
    async fn fetch_from_source(
        &self,
        source_id: &str,
        stop: Option<watch::Receiver<bool>>,
    ) -> Result<Vec<RawEvent>, IngestError> {
        let Some(connector) = self.registry.get_connector(source_id) else {
            debug!(target: "ingest", source_id, "source not registered, skipping");
            return Ok(Vec::new());
        };
        if !connector.config().enabled {
            debug!(target: "ingest", source_id, "source disabled, skipping");
            return Ok(Vec::new());
        }

        let lock = self.cycle_lock(source_id);
        let _cycle = lock.lock().await;

        let since = self
            .last_fetch
            .lock()
            .expect("last fetch mutex poisoned")
            .get(source_id)
            .copied();
        let started_at = Utc::now();
        let t0 = Instant::now();
        let budget = self.settings.fetch_timeout();

        let fetch = tokio::time::timeout(budget, connector.fetch_with_retry(since));
        let fetched = match stop {
            Some(mut stop) => tokio::select! {
                r = fetch => r,
                _ = stopped(&mut stop) => {
                    debug!(target: "ingest", source_id, "fetch cancelled by shutdown");
                    return Ok(Vec::new());
                }
            },
            None => fetch.await,
        };
        let result = match fetched {
            Ok(r) => r,
            Err(_) => Err(IngestError::Timeout {
                source_id: source_id.to_string(),
                secs: budget.as_secs(),
            }),
        };
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                warn!(target: "ingest", source_id, error = %e, "fetch cycle failed");
                self.stats.record_source_error(source_id, &e.to_string());
                return Err(e);
            }
        };

        let elapsed_ms = duration_ms(t0.elapsed());
        self.last_fetch
            .lock()
            .expect("last fetch mutex poisoned")
            .insert(source_id.to_string(), started_at);
        self.stats.record_fetch(source_id, events.len(), elapsed_ms);

        let outcome = self.process_events_batch(source_id, &events).await;
        debug!(
            target: "ingest",
            source_id,
            received = outcome.received,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            processed = outcome.processed,
            elapsed_ms,
            "fetch cycle done"
        );
        Ok(events)
    }

    async fn process_events_batch(&self, source_id: &str, events: &[RawEvent]) -> BatchOutcome {
        let mut out = BatchOutcome {
            received: events.len(),
            ..BatchOutcome::default()
        };
        for event in events {
            let fresh = self
                .dedup
                .lock()
                .expect("dedup mutex poisoned")
                .check_and_insert(event);
            if !fresh {
                out.duplicates += 1;
                continue;
            }
            if !self.validator.validate(event).passed {
                out.rejected += 1;
                continue;
            }
            out.validated += 1;

            let Some(processor) = &self.processor else {
                continue;
            };
            let mut enriched = event.clone();
            self.validator.enrich(&mut enriched);
            match processor.process(&enriched).await {
                Ok(()) => out.processed += 1,
                Err(e) => {
                    out.failed += 1;
                    let err = IngestError::Processing {
                        event_id: enriched.event_id().to_string(),
                        message: format!("{e:#}"),
                    };
                    warn!(target: "ingest", source_id, error = %err, "event processor failed");
                    self.stats.note_processing_error(source_id, &err.to_string());
                }
            }
        }
        self.stats.record_batch(source_id, &out);
        out
    }

    fn record_cycle_failure(&self, source_id: &str, e: JoinError) {
        if e.is_panic() {
            error!(target: "ingest", source_id, "fetch cycle panicked");
            self.stats.record_source_error(source_id, "fetch cycle panicked");
        } else {
            debug!(target: "ingest", source_id, "fetch cycle cancelled");
        }
    }
}

/// Run one cycle on its own task so a panic stays inside it.
fn spawn_cycle(
    shared: &Arc<Shared>,
    source_id: &str,
    stop: Option<watch::Receiver<bool>>,
) -> JoinHandle<Result<Vec<RawEvent>, IngestError>> {
    let shared = shared.clone();
    let source_id = source_id.to_string();
    tokio::spawn(async move { shared.fetch_from_source(&source_id, stop).await })
}

/// Aborts the wrapped task on drop.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn source_loop(
    shared: Arc<Shared>,
    source_id: String,
    initial_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if !pause(initial_delay, &mut shutdown).await {
        return;
    }
    debug!(target: "ingest", source_id = %source_id, "source loop started");

    while shared.running.load(Ordering::SeqCst) {
        let interval = shared.effective_interval(&source_id);
        let backoff = interval.min(shared.settings.error_backoff_cap());

        // shutdown is checked between cycles; the cycle itself only drops an
        // unfinished fetch
        let joined = spawn_cycle(&shared, &source_id, Some(shutdown.clone())).await;
        let next = match joined {
            Ok(Ok(_)) => interval,
            Ok(Err(_)) => backoff,
            Err(e) if e.is_panic() => {
                shared.record_cycle_failure(&source_id, e);
                backoff
            }
            Err(_) => break,
        };
        if !pause(next, &mut shutdown).await {
            break;
        }
    }
    debug!(target: "ingest", source_id = %source_id, "source loop stopped");
}

/// Resolves once shutdown is signalled (or the coordinator is gone).
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

/// Sleep for `d` unless shutdown is signalled first; false means stop.
async fn pause(d: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    if d.is_zero() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(d) => true,
        _ = shutdown.changed() => false,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
