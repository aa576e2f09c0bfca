// src/coordinator/processor.rs
use async_trait::async_trait;
use std::future::Future;
use tracing::info;

use crate::event::{anon_hash, RawEvent};

/// Downstream sink for validated events. An `Err` counts against the
/// event's source and never aborts the batch.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &RawEvent) -> anyhow::Result<()>;
}

/// Any `Fn(RawEvent) -> impl Future<Output = anyhow::Result<()>>` is a processor.
#[async_trait]
impl<F, Fut> EventProcessor for F
where
    F: Fn(RawEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn process(&self, event: &RawEvent) -> anyhow::Result<()> {
        (self)(event.clone()).await
    }
}

/// Logs one line per event; content appears only as a short hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl EventProcessor for LoggingProcessor {
    async fn process(&self, event: &RawEvent) -> anyhow::Result<()> {
        info!(
            target: "ingest",
            event_id = event.event_id(),
            source_id = event.source_id(),
            language = event.language().unwrap_or("-"),
            content_hash = %anon_hash(event.content()),
            published = %event.timestamp().to_rfc3339(),
            "event accepted"
        );
        Ok(())
    }
}
