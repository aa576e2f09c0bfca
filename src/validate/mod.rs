// src/validate/mod.rs
//! Multi-layer content validation.
//!
//! A fixed, ordered pipeline of pure checks: basic → content quality → language →
//! domain relevance → spam. The first failing layer short-circuits with a short,
//! machine-readable reason code (`content_too_short: 5 < 10`, `spam_keyword:casino`,
//! ...). The part before `": "` is the histogram key.
//!
//! The outcome is a pure function of the event, the config and `now`; only the
//! pass/fail counters are mutated.

mod checks;
mod language;

pub use language::detect_language;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

use crate::event::RawEvent;
use checks::{Verdict, LAYERS};

/// Result of validating one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub failure_reason: Option<String>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failure_reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            failure_reason: Some(reason.into()),
        }
    }

    /// Reason code without its detail (`content_too_short: 5 < 10` → `content_too_short`).
    pub fn reason_code(&self) -> Option<&str> {
        self.failure_reason.as_deref().map(reason_code)
    }
}

pub(crate) fn reason_code(reason: &str) -> &str {
    reason.split(": ").next().unwrap_or(reason)
}

/// Optional keyword/region allow-list for the relevance layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceFilter {
    pub keywords: Vec<String>,
    pub regions: Vec<String>,
}

impl RelevanceFilter {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.regions.is_empty()
    }
}

/// Thresholds for every validation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub min_word_count: usize,
    pub max_age_days: i64,
    pub max_future_minutes: i64,
    pub min_unique_word_ratio: f64,
    pub max_uppercase_ratio: f64,
    pub max_punctuation_ratio: f64,
    /// `None` (or empty) accepts any language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_languages: Option<Vec<String>>,
    /// `None` disables the relevance layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<RelevanceFilter>,
    pub spam_keywords: Vec<String>,
    pub max_url_ratio: f64,
    pub max_digit_ratio: f64,
}

pub const DEFAULT_SPAM_KEYWORDS: &[&str] = &[
    "click here",
    "buy now",
    "limited time offer",
    "act now",
    "subscribe now",
    "100% free",
    "casino",
    "viagra",
    "crypto giveaway",
    "work from home",
];

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_content_length: 20,
            max_content_length: 50_000,
            min_word_count: 3,
            max_age_days: 30,
            max_future_minutes: 60,
            min_unique_word_ratio: 0.3,
            max_uppercase_ratio: 0.5,
            max_punctuation_ratio: 0.3,
            allowed_languages: None,
            relevance: None,
            spam_keywords: DEFAULT_SPAM_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            max_url_ratio: 0.2,
            max_digit_ratio: 0.3,
        }
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatorStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub pass_rate: f64,
    pub failure_reasons: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    passed: u64,
    failed: u64,
    reasons: BTreeMap<String, u64>,
}

/// Lower-cased views of the configured word lists, prepared once.
#[derive(Debug)]
pub(crate) struct Prepared {
    pub cfg: ValidatorConfig,
    pub languages: Option<Vec<String>>,
    pub relevance_terms: Option<Vec<String>>,
    pub spam_keywords: Vec<String>,
}

#[derive(Debug)]
pub struct DataValidator {
    prepared: Prepared,
    counters: Mutex<Counters>,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl DataValidator {
    pub fn new(cfg: ValidatorConfig) -> Self {
        let languages = cfg
            .allowed_languages
            .as_ref()
            .filter(|v| !v.is_empty())
            .map(|v| v.iter().map(|l| l.trim().to_ascii_lowercase()).collect());
        let relevance_terms = cfg.relevance.as_ref().filter(|r| !r.is_empty()).map(|r| {
            r.keywords
                .iter()
                .chain(r.regions.iter())
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        });
        let spam_keywords = cfg
            .spam_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            prepared: Prepared {
                cfg,
                languages,
                relevance_terms,
                spam_keywords,
            },
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.prepared.cfg
    }

    pub fn validate(&self, event: &RawEvent) -> ValidationOutcome {
        self.validate_at(event, Utc::now())
    }

    /// Same as [`validate`](Self::validate) with an explicit clock.
    pub fn validate_at(&self, event: &RawEvent, now: DateTime<Utc>) -> ValidationOutcome {
        let profile = checks::TextProfile::new(event.content());
        let mut outcome = ValidationOutcome::pass();
        for (layer, check) in LAYERS {
            if let Verdict::Reject(reason) = check(&self.prepared, event, &profile, now) {
                debug!(
                    target: "ingest",
                    event_id = event.event_id(),
                    source_id = event.source_id(),
                    layer,
                    %reason,
                    "event rejected"
                );
                outcome = ValidationOutcome::fail(reason);
                break;
            }
        }
        self.record(&outcome);
        outcome
    }

    /// Fill in the language when the source did not declare one.
    pub fn enrich(&self, event: &mut RawEvent) {
        if event.language().is_none() {
            if let Some(lang) = detect_language(event.content()) {
                event.set_language(lang);
            }
        }
    }

    fn record(&self, outcome: &ValidationOutcome) {
        let mut c = self.counters.lock().expect("validator mutex poisoned");
        c.total += 1;
        match outcome.reason_code() {
            None => c.passed += 1,
            Some(code) => {
                c.failed += 1;
                *c.reasons.entry(code.to_string()).or_insert(0) += 1;
                counter!("ingest_validation_failures_total", "reason" => code.to_string())
                    .increment(1);
            }
        }
    }

    pub fn stats(&self) -> ValidatorStats {
        let c = self.counters.lock().expect("validator mutex poisoned");
        ValidatorStats {
            total: c.total,
            passed: c.passed,
            failed: c.failed,
            pass_rate: if c.total > 0 {
                c.passed as f64 / c.total as f64
            } else {
                0.0
            },
            failure_reasons: c.reasons.clone(),
        }
    }

    pub fn reset(&self) {
        *self.counters.lock().expect("validator mutex poisoned") = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_strips_detail() {
        assert_eq!(reason_code("content_too_short: 5 < 10"), "content_too_short");
        assert_eq!(reason_code("spam_keyword:casino"), "spam_keyword:casino");
        assert_eq!(reason_code("not_relevant"), "not_relevant");
    }

    #[test]
    fn config_deserializes_partial_toml() {
        let cfg: ValidatorConfig = toml::from_str(
            r#"
min_content_length = 10
allowed_languages = ["en"]
[relevance]
keywords = ["earthquake"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.min_content_length, 10);
        assert_eq!(cfg.max_content_length, 50_000);
        assert_eq!(cfg.relevance.unwrap().keywords, vec!["earthquake"]);
        assert!(!cfg.spam_keywords.is_empty());
    }
}
