// src/event.rs
//! Raw events as produced by connectors, plus the text helpers shared by
//! connectors and the validator.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// One piece of raw content fetched from a source.
///
/// Core fields are fixed at construction; only the enrichment fields
/// (`language`, `location_hint`) can be filled in afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    event_id: String,
    source_id: String,
    source_type: String,
    content: String,
    timestamp: DateTime<Utc>,
    url: Option<String>,
    title: Option<String>,
    author: Option<String>,
    language: Option<String>,
    location_hint: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    ingestion_timestamp: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let source_id = source_id.into();
        let content = content.into();
        Self {
            event_id: compute_event_id(&source_id, &content, timestamp),
            source_id,
            source_type: source_type.into(),
            content,
            timestamp,
            url: None,
            title: None,
            author: None,
            language: None,
            location_hint: None,
            metadata: Map::new(),
            ingestion_timestamp: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_location_hint(mut self, hint: impl Into<String>) -> Self {
        self.location_hint = Some(hint.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn location_hint(&self) -> Option<&str> {
        self.location_hint.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn ingestion_timestamp(&self) -> DateTime<Utc> {
        self.ingestion_timestamp
    }

    /// Post-hoc enrichment (validation/processing may detect it).
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    /// Post-hoc enrichment (geocoding happens downstream).
    pub fn set_location_hint(&mut self, hint: impl Into<String>) {
        self.location_hint = Some(hint.into());
    }
}

/// Deterministic id over `(source_id, content, timestamp)`.
///
/// SHA-256 over the three fields joined by a NUL separator, first 16 bytes
/// hex-encoded. Identical refetches collapse to the same id.
pub fn compute_event_id(source_id: &str, content: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(
        timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    hex_prefix(&hasher.finalize(), 16)
}

/// Short anonymized hash of a text, safe to put in log lines.
pub(crate) fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex_prefix(&digest, 6)
}

pub(crate) fn hex_prefix(bytes: &[u8], n: usize) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(n * 2);
    for b in bytes.iter().take(n) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Max characters kept by [`normalize_text`].
pub const MAX_NORMALIZED_CHARS: usize = 10_000;

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_NORMALIZED_CHARS {
        out = out.chars().take(MAX_NORMALIZED_CHARS).collect();
    }
    out
}
