// src/error.rs
//! Error taxonomy for the ingestion subsystem.
//!
//! Only configuration problems surface synchronously to callers. Fetch,
//! timeout and processing errors are produced here but get caught, counted
//! and isolated per source by the coordinator. Validation rejections are not
//! errors at all (see [`crate::validate::ValidationOutcome`]).

use thiserror::Error;

/// Errors that can occur while registering, fetching or dispatching.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Invalid connector or service configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No factory registered for this `source_type`
    #[error("unknown connector type: {0}")]
    UnknownConnectorType(String),

    /// A source with this id is already registered
    #[error("source already registered: {0}")]
    DuplicateSource(String),

    /// No source with this id is registered
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Network or source failure, after retries were exhausted
    #[error("fetch failed for {source_id} after {attempts} attempts: {message}")]
    Fetch {
        source_id: String,
        attempts: u32,
        message: String,
    },

    /// Fetch exceeded its time budget
    #[error("fetch timed out for {source_id} after {secs}s")]
    Timeout { source_id: String, secs: u64 },

    /// Downstream event processor failed
    #[error("processing failed for event {event_id}: {message}")]
    Processing { event_id: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        IngestError::Configuration(msg.into())
    }

    /// True for errors that are fatal at registration time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IngestError::Configuration(_)
                | IngestError::UnknownConnectorType(_)
                | IngestError::DuplicateSource(_)
        )
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Parse(format!("json: {e}"))
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(e: toml::de::Error) -> Self {
        IngestError::Parse(format!("toml: {e}"))
    }
}

impl From<toml::ser::Error> for IngestError {
    fn from(e: toml::ser::Error) -> Self {
        IngestError::Parse(format!("toml: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(IngestError::config("bad").is_configuration());
        assert!(IngestError::DuplicateSource("a".into()).is_configuration());
        assert!(!IngestError::Timeout {
            source_id: "a".into(),
            secs: 1
        }
        .is_configuration());
    }

    #[test]
    fn fetch_error_message_names_source_and_attempts() {
        let e = IngestError::Fetch {
            source_id: "feed-1".into(),
            attempts: 4,
            message: "connection refused".into(),
        };
        assert_eq!(
            e.to_string(),
            "fetch failed for feed-1 after 4 attempts: connection refused"
        );
    }
}
