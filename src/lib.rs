// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod connector;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::{AppConfig, ConnectorConfig, RateLimitStrategy};
pub use crate::connector::{Connector, ConnectorBase, ConnectorHealth, HealthStatus};
pub use crate::coordinator::{Coordinator, EventProcessor, LoggingProcessor, StatsSnapshot};
pub use crate::error::IngestError;
pub use crate::event::{compute_event_id, RawEvent};
pub use crate::rate_limit::RateLimiter;
pub use crate::registry::Registry;
pub use crate::validate::{DataValidator, ValidationOutcome, ValidatorConfig};
