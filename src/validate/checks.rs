// src/validate/checks.rs
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::{detect_language, Prepared};
use crate::event::RawEvent;

pub(crate) enum Verdict {
    Pass,
    Reject(String),
}

type Check = fn(&Prepared, &RawEvent, &TextProfile<'_>, DateTime<Utc>) -> Verdict;

/// Ordered layers; the first rejection wins.
pub(crate) const LAYERS: [(&str, Check); 5] = [
    ("basic", basic),
    ("quality", quality),
    ("language", language),
    ("relevance", relevance),
    ("spam", spam),
];

/// Word/char counts computed once per event and shared by all layers.
pub(crate) struct TextProfile<'a> {
    text: &'a str,
    chars: usize,
    words: Vec<&'a str>,
}

impl<'a> TextProfile<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().count(),
            words: text.split_whitespace().collect(),
        }
    }

    fn word_count(&self) -> usize {
        self.words.len()
    }
}

static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("url regex"));

static RE_PROMO: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // phone numbers: 555-123-4567, (555) 123 4567, +1 555.123.4567
        r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b",
        // price mentions
        r"(?i)(?:[$€£]\s?\d+(?:[.,]\d+)?|\b\d+(?:[.,]\d+)?\s?(?:usd|eur|gbp|dollars|euros)\b)",
        // "free ... today", "discount ... now"
        r"(?i)\b(?:free|discount)\b.{0,60}?\b(?:today|now)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("promo regex"))
    .collect()
});

fn basic(p: &Prepared, ev: &RawEvent, t: &TextProfile<'_>, now: DateTime<Utc>) -> Verdict {
    let cfg = &p.cfg;
    if t.text.trim().is_empty() {
        return Verdict::Reject("empty_content".into());
    }
    if ev.source_id().trim().is_empty() {
        return Verdict::Reject("missing_source_id".into());
    }
    if ev.timestamp().timestamp() == 0 {
        return Verdict::Reject("missing_timestamp".into());
    }
    if t.chars < cfg.min_content_length {
        return Verdict::Reject(format!(
            "content_too_short: {} < {}",
            t.chars, cfg.min_content_length
        ));
    }
    if t.chars > cfg.max_content_length {
        return Verdict::Reject(format!(
            "content_too_long: {} > {}",
            t.chars, cfg.max_content_length
        ));
    }
    if t.word_count() < cfg.min_word_count {
        return Verdict::Reject(format!(
            "too_few_words: {} < {}",
            t.word_count(),
            cfg.min_word_count
        ));
    }
    if now - ev.timestamp() > Duration::days(cfg.max_age_days) {
        return Verdict::Reject("timestamp_too_old".into());
    }
    if ev.timestamp() - now > Duration::minutes(cfg.max_future_minutes) {
        return Verdict::Reject("timestamp_in_future".into());
    }
    Verdict::Pass
}

fn quality(p: &Prepared, _ev: &RawEvent, t: &TextProfile<'_>, _now: DateTime<Utc>) -> Verdict {
    let cfg = &p.cfg;
    let words = t.word_count();

    if words > 10 {
        let unique: HashSet<String> = t.words.iter().map(|w| w.to_lowercase()).collect();
        if (unique.len() as f64 / words as f64) < cfg.min_unique_word_ratio {
            return Verdict::Reject("repetitive_content".into());
        }
    }

    if t.chars > 50 {
        let (letters, upper) = t.text.chars().filter(|c| c.is_alphabetic()).fold(
            (0usize, 0usize),
            |(l, u), c| (l + 1, u + usize::from(c.is_uppercase())),
        );
        if letters > 0 && (upper as f64 / letters as f64) > cfg.max_uppercase_ratio {
            return Verdict::Reject("excessive_caps".into());
        }
    }

    if words > 0 {
        let punct = t.text.chars().filter(|c| c.is_ascii_punctuation()).count();
        if (punct as f64 / words as f64) > cfg.max_punctuation_ratio {
            return Verdict::Reject("excessive_punctuation".into());
        }
    }

    if words > 20 {
        let sentences = t
            .text
            .split(['.', '!', '?', '\n'])
            .filter(|s| s.trim().chars().count() > 5)
            .count();
        if sentences == 0 {
            return Verdict::Reject("no_sentence_structure".into());
        }
    }

    Verdict::Pass
}

fn language(p: &Prepared, ev: &RawEvent, t: &TextProfile<'_>, _now: DateTime<Utc>) -> Verdict {
    let Some(allowed) = &p.languages else {
        return Verdict::Pass;
    };
    let lang = match ev.language() {
        Some(declared) => declared.trim().to_ascii_lowercase(),
        None => match detect_language(t.text) {
            Some(detected) => detected.to_string(),
            // undetectable text gets the benefit of the doubt
            None => return Verdict::Pass,
        },
    };
    // "en-US" matches "en"
    let primary = lang.split(['-', '_']).next().unwrap_or(&lang);
    if allowed.iter().any(|a| a == &lang || a == primary) {
        Verdict::Pass
    } else {
        Verdict::Reject(format!("unsupported_language: {lang}"))
    }
}

fn relevance(p: &Prepared, ev: &RawEvent, t: &TextProfile<'_>, _now: DateTime<Utc>) -> Verdict {
    let Some(terms) = &p.relevance_terms else {
        return Verdict::Pass;
    };
    let mut hay = t.text.to_lowercase();
    for extra in [ev.title(), ev.location_hint()].into_iter().flatten() {
        hay.push(' ');
        hay.push_str(&extra.to_lowercase());
    }
    for value in ev.metadata().values() {
        collect_strings(value, &mut hay);
    }
    if terms.iter().any(|term| hay.contains(term.as_str())) {
        Verdict::Pass
    } else {
        Verdict::Reject("not_relevant".into())
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push(' ');
            out.push_str(&s.to_lowercase());
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn spam(p: &Prepared, _ev: &RawEvent, t: &TextProfile<'_>, _now: DateTime<Utc>) -> Verdict {
    let cfg = &p.cfg;
    let lower = t.text.to_lowercase();
    if let Some(kw) = p.spam_keywords.iter().find(|kw| lower.contains(kw.as_str())) {
        return Verdict::Reject(format!("spam_keyword:{kw}"));
    }

    let words = t.word_count().max(1) as f64;
    let urls = RE_URL.find_iter(t.text).count();
    if urls as f64 / words > cfg.max_url_ratio {
        return Verdict::Reject("excessive_urls".into());
    }

    let digit_tokens = t
        .words
        .iter()
        .filter(|w| {
            let core = w.trim_matches(|c: char| !c.is_alphanumeric());
            !core.is_empty() && core.chars().all(|c| c.is_ascii_digit())
        })
        .count();
    if digit_tokens as f64 / words > cfg.max_digit_ratio {
        return Verdict::Reject("excessive_numbers".into());
    }

    if RE_PROMO.iter().any(|re| re.is_match(t.text)) {
        return Verdict::Reject("promotional_content".into());
    }
    Verdict::Pass
}
