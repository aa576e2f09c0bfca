// tests/coordinator.rs
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{mock, mock_registry};
use ingest_coordinator::config::CoordinatorSettings;
use ingest_coordinator::connector::{HealthStatus, OverallStatus};
use ingest_coordinator::{Coordinator, DataValidator, RawEvent};

fn coordinator(registry: ingest_coordinator::Registry) -> Coordinator {
    Coordinator::new(Arc::new(registry), Arc::new(DataValidator::default()))
}

#[tokio::test]
async fn fetch_all_isolates_a_failing_source() {
    let r = mock_registry();
    r.register_source(mock("alpha", "events").with_param("events", 2))
        .unwrap();
    r.register_source(mock("bravo", "events").with_param("events", 3))
        .unwrap();
    // retries must not inflate the source-level error count
    r.register_source(mock("charlie", "fail").with_retries(2, 1))
        .unwrap();
    let c = coordinator(r);

    let results = c.fetch_from_all_sources(10).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results["alpha"].len(), 2);
    assert_eq!(results["bravo"].len(), 3);
    assert!(results["charlie"].is_empty());
    assert!(results["alpha"].iter().all(|e| e.source_id() == "alpha"));

    let stats = c.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.total_fetches, 2);
    assert_eq!(stats.total_events, 5);
    let charlie = &stats.per_source_stats["charlie"];
    assert_eq!(charlie.errors, 1);
    assert!(charlie
        .last_error
        .as_deref()
        .unwrap()
        .contains("upstream unavailable"));
    assert!(!c.is_running());
}

#[tokio::test]
async fn retry_recovers_after_two_failures() {
    let r = mock_registry();
    let cfg = mock("a", "flaky")
        .with_param("failures", 2)
        .with_param("events", 3)
        .with_interval(1)
        .with_retries(2, 5);
    let connector = r.register_source(cfg).unwrap();

    let events = connector.fetch_with_retry(None).await.unwrap();
    assert_eq!(events.len(), 3);
    let stats = connector.stats().snapshot();
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.total_fetches, 1);
    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.consecutive_failures, 0);
}

#[tokio::test]
async fn retry_exhaustion_is_a_fetch_error() {
    let r = mock_registry();
    let connector = r
        .register_source(mock("a", "fail").with_retries(1, 1))
        .unwrap();
    let err = connector.fetch_with_retry(None).await.unwrap_err();
    assert!(err.to_string().contains("after 2 attempts"));
    assert_eq!(connector.stats().errors(), 2);
    assert_eq!(connector.stats().consecutive_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_is_recorded_not_raised() {
    let r = mock_registry();
    r.register_source(mock("slow", "slow").with_param("delay_ms", 10_000))
        .unwrap();
    let settings = CoordinatorSettings {
        fetch_timeout_secs: 1,
        ..CoordinatorSettings::default()
    };
    let c = Coordinator::builder(Arc::new(r)).settings(settings).build();

    let events = c.fetch_from_source("slow").await;
    assert!(events.is_empty());
    let s = c.source_stats("slow").unwrap();
    assert_eq!(s.errors, 1);
    assert!(s.last_error.unwrap().contains("timed out"));
    assert!(c.last_fetch_time("slow").is_none());
}

#[tokio::test]
async fn missing_or_disabled_source_yields_nothing() {
    let r = mock_registry();
    r.register_source(mock("off", "events").with_enabled(false))
        .unwrap();
    let c = coordinator(r);
    assert!(c.fetch_from_source("nope").await.is_empty());
    assert!(c.fetch_from_source("off").await.is_empty());
    assert_eq!(c.stats().errors, 0);
    assert_eq!(c.stats().total_fetches, 0);
}

#[tokio::test]
async fn duplicates_are_dropped_before_processing() {
    let r = mock_registry();
    r.register_source(mock("a", "events").with_param("events", 3))
        .unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let c = Coordinator::builder(Arc::new(r))
        .processor(move |_ev: RawEvent| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .build();

    assert_eq!(c.fetch_from_source("a").await.len(), 3);
    assert_eq!(c.fetch_from_source("a").await.len(), 3);

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    let stats = c.stats();
    assert_eq!(stats.total_events, 6);
    assert_eq!(stats.total_duplicates, 3);
    assert_eq!(stats.total_validated, 3);
    assert_eq!(stats.total_processed, 3);
    assert!(c.last_fetch_time("a").is_some());
}

#[tokio::test]
async fn processor_failure_does_not_abort_batch() {
    let r = mock_registry();
    r.register_source(mock("a", "events").with_param("events", 3))
        .unwrap();
    let c = Coordinator::builder(Arc::new(r))
        .processor(|ev: RawEvent| async move {
            if ev.content().contains("report 0 ") {
                anyhow::bail!("sink rejected");
            }
            anyhow::Ok(())
        })
        .build();

    c.fetch_from_source("a").await;
    let stats = c.stats();
    assert_eq!(stats.total_validated, 3);
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.processing_errors, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.per_source_stats["a"]
        .last_error
        .as_deref()
        .unwrap()
        .contains("sink rejected"));
}

#[tokio::test]
async fn rejected_events_are_counted_by_reason() {
    let r = mock_registry();
    r.register_source(
        mock("a", "events")
            .with_param("events", 1)
            .with_param("content", "short"),
    )
    .unwrap();
    let c = coordinator(r);
    c.fetch_from_source("a").await;

    let stats = c.stats();
    assert_eq!(stats.total_validated, 0);
    assert_eq!(stats.validator_stats.failed, 1);
    assert_eq!(stats.validator_stats.failure_reasons["content_too_short"], 1);

    c.reset_stats();
    let stats = c.stats();
    assert_eq!(stats.total_events, 0);
    assert_eq!(stats.validator_stats.total, 0);
}

#[tokio::test(start_paused = true)]
async fn loops_poll_until_stopped() {
    let r = mock_registry();
    r.register_source(mock("a", "events").with_param("events", 1))
        .unwrap();
    r.register_source(mock("b", "events").with_param("events", 1))
        .unwrap();
    let c = coordinator(r);

    assert_eq!(c.start_with(Duration::from_millis(100), Duration::ZERO), 2);
    tokio::time::sleep(Duration::from_millis(350)).await;
    c.stop().await;

    let a = c.source_stats("a").unwrap().fetches;
    let b = c.source_stats("b").unwrap().fetches;
    assert!(a >= 3, "a fetched {a} times");
    assert!(b >= 3, "b fetched {b} times");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(c.source_stats("a").unwrap().fetches, a);
    assert_eq!(c.source_stats("b").unwrap().fetches, b);
}

#[tokio::test(start_paused = true)]
async fn start_is_staggered() {
    let r = mock_registry();
    for id in ["a", "b", "c"] {
        r.register_source(mock(id, "events").with_param("events", 1))
            .unwrap();
    }
    let c = coordinator(r);
    c.start_with(Duration::from_secs(3600), Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(c.source_stats("a").map(|s| s.fetches), Some(1));
    assert_eq!(c.source_stats("b").map(|s| s.fetches), Some(1));
    assert!(c.source_stats("c").is_none());
    c.stop().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_cycle_is_contained() {
    let r = mock_registry();
    r.register_source(mock("bad", "panic")).unwrap();
    r.register_source(mock("good", "events").with_param("events", 1))
        .unwrap();
    let c = coordinator(r);

    c.start_with(Duration::from_millis(100), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(c.is_running());
    c.stop().await;

    assert!(c.source_stats("bad").unwrap().errors >= 2);
    assert!(c.source_stats("good").unwrap().fetches >= 3);
    assert_eq!(c.source_stats("good").unwrap().errors, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_in_flight_fetch() {
    let r = mock_registry();
    r.register_source(mock("slow", "slow").with_param("delay_ms", 60_000))
        .unwrap();
    let c = coordinator(r);
    c.start_with(Duration::from_secs(60), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(10)).await;
    c.stop().await;
    assert!(!c.is_running());
    assert!(c.source_stats("slow").is_none());
}

#[tokio::test]
async fn health_degrades_with_failing_source() {
    let r = mock_registry();
    r.register_source(mock("a", "events")).unwrap();
    r.register_source(mock("b", "events")).unwrap();
    r.register_source(mock("c", "fail")).unwrap();
    let c = coordinator(r);

    assert_eq!(c.health().await.status, OverallStatus::Healthy);
    for _ in 0..3 {
        c.fetch_from_source("c").await;
    }
    let health = c.health().await;
    assert_eq!(health.sources["c"].status, HealthStatus::Unhealthy);
    assert_eq!(health.sources["a"].status, HealthStatus::Healthy);
    assert_eq!(health.status, OverallStatus::Degraded);

    let empty = coordinator(mock_registry());
    assert_eq!(empty.health().await.status, OverallStatus::NoSources);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_a_dispatching_cycle_finish() {
    let r = mock_registry();
    r.register_source(mock("a", "events").with_param("events", 3))
        .unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let c = Coordinator::builder(Arc::new(r))
        .processor(move |_ev: RawEvent| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .build();

    c.start_with(Duration::from_secs(3600), Duration::ZERO);
    // stop lands while the second event is being dispatched
    tokio::time::sleep(Duration::from_millis(1500)).await;
    c.stop().await;

    let stats = c.stats();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.total_validated, 3);
    assert_eq!(stats.total_fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn cycles_for_one_source_never_overlap() {
    let r = mock_registry();
    r.register_source(mock("s", "slow").with_param("delay_ms", 1_000))
        .unwrap();
    let c = coordinator(r);

    let t0 = tokio::time::Instant::now();
    let (first, second) = tokio::join!(c.fetch_from_source("s"), c.fetch_from_source("s"));
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert!(
        t0.elapsed() >= Duration::from_secs(2),
        "cycles ran side by side: {:?}",
        t0.elapsed()
    );
    assert_eq!(c.source_stats("s").unwrap().fetches, 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_fetch_all_leaves_no_cycle_behind() {
    let r = mock_registry();
    r.register_source(mock("slow", "slow").with_param("delay_ms", 10_000))
        .unwrap();
    let c = coordinator(r);

    let cut_short =
        tokio::time::timeout(Duration::from_millis(100), c.fetch_from_all_sources(4)).await;
    assert!(cut_short.is_err());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(c.source_stats("slow").is_none());
    assert!(c.last_fetch_time("slow").is_none());
}
