// src/connector/rss.rs
//! Built-in RSS 2.0 connector.
//!
//! `extra_params`:
//! - `url`: feed URL (http/https), fetched with reqwest
//! - `content`: inline feed XML, used when no `url` is given
//! - `timeout_secs`: HTTP timeout, default 30
//! - `language`: language tag stamped on every event (falls back to the channel's)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{default_health, Connector, ConnectorBase, ConnectorHealth, ConnectorStats};
use crate::config::ConnectorConfig;
use crate::error::IngestError;
use crate::event::{normalize_text, RawEvent};
use crate::rate_limit::RateLimiter;

pub const RSS_TYPE: &str = "rss";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    language: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    guid: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

#[derive(Debug)]
enum Feed {
    Http { url: String, client: reqwest::Client },
    Inline(String),
}

#[derive(Debug)]
pub struct RssConnector {
    base: ConnectorBase,
    feed: Feed,
}

impl RssConnector {
    pub fn from_config(config: ConnectorConfig) -> Result<Self, IngestError> {
        let feed = if let Some(url) = config.param_str("url") {
            let timeout = config
                .param_f64("timeout_secs")
                .filter(|s| *s > 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("ingest-coordinator/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| IngestError::config(format!("{}: http client: {e}", config.source_id)))?;
            Feed::Http {
                url: url.to_string(),
                client,
            }
        } else if let Some(content) = config.param_str("content") {
            Feed::Inline(content.to_string())
        } else {
            return Err(IngestError::config(format!(
                "{}: rss source needs a `url` or `content` parameter",
                config.source_id
            )));
        };
        Ok(Self {
            base: ConnectorBase::new(config),
            feed,
        })
    }

    /// Factory for the registry.
    pub fn create(config: ConnectorConfig) -> Result<Arc<dyn Connector>, IngestError> {
        Ok(Arc::new(Self::from_config(config)?))
    }

    fn parse_items(&self, xml: &str, since: Option<DateTime<Utc>>) -> Result<Vec<RawEvent>> {
        let t0 = std::time::Instant::now();
        let cfg = self.base.config();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let language = cfg
            .param_str("language")
            .map(str::to_string)
            .or(rss.channel.language);
        let fetched_at = Utc::now();

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = it.title.as_deref().map(normalize_text).unwrap_or_default();
            let description = it
                .description
                .as_deref()
                .map(normalize_text)
                .unwrap_or_default();
            let content = match (title.is_empty(), description.is_empty()) {
                (true, true) => continue,
                (false, true) => title.clone(),
                (true, false) => description,
                (false, false) => format!("{title}. {description}"),
            };

            // undated items count as seen now
            let timestamp = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or(fetched_at);
            if since.is_some_and(|s| timestamp <= s) {
                continue;
            }

            let mut ev = RawEvent::new(&cfg.source_id, &cfg.source_type, content, timestamp);
            if !title.is_empty() {
                ev = ev.with_title(title);
            }
            if let Some(link) = it.link.filter(|l| !l.trim().is_empty()) {
                ev = ev.with_url(link.trim());
            }
            if let Some(author) = it.author {
                ev = ev.with_author(author);
            }
            if let Some(lang) = &language {
                ev = ev.with_language(lang.as_str());
            }
            if let Some(feed_title) = &rss.channel.title {
                ev = ev.with_metadata("feed_title", feed_title.as_str());
            }
            if let Some(guid) = it.guid {
                ev = ev.with_metadata("guid", guid);
            }
            out.push(ev);
            if out.len() >= cfg.max_events_per_fetch {
                break;
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms", "source_type" => RSS_TYPE).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl Connector for RssConnector {
    fn config(&self) -> &ConnectorConfig {
        self.base.config()
    }

    fn rate_limiter(&self) -> &dyn RateLimiter {
        self.base.limiter()
    }

    fn stats(&self) -> &ConnectorStats {
        self.base.stats()
    }

    fn validate_config(&self) -> Result<(), IngestError> {
        self.base.config().validate()?;
        if let Feed::Http { url, .. } = &self.feed {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(IngestError::config(format!(
                    "{}: rss url must be http(s): {url}",
                    self.source_id()
                )));
            }
        }
        Ok(())
    }

    async fn fetch_events(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawEvent>> {
        if !self.base.acquire_permit().await {
            return Ok(Vec::new());
        }
        match &self.feed {
            Feed::Inline(xml) => self.parse_items(xml, since),
            Feed::Http { url, client } => {
                let resp = match client.get(url.as_str()).send().await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(error = ?e, source_id = %self.source_id(), "rss http error");
                        counter!("ingest_provider_errors_total", "source" => self.source_id().to_string())
                            .increment(1);
                        return Err(e).context("rss http get()");
                    }
                };
                let body = resp
                    .error_for_status()
                    .context("rss http status")?
                    .text()
                    .await
                    .context("rss http .text()")?;
                self.parse_items(&body, since)
            }
        }
    }

    async fn health_status(&self) -> ConnectorHealth {
        let health = default_health(self);
        match &self.feed {
            Feed::Http { url, .. } => health
                .with_detail("feed", "http")
                .with_detail("url", url.as_str()),
            Feed::Inline(_) => health.with_detail("feed", "inline"),
        }
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Wire</title><language>en</language>
<item><title>Bridge closed&nbsp;after flooding</title><link>https://example.org/a</link>
<pubDate>Tue, 03 Jun 2025 10:00:00 GMT</pubDate><description>&lt;p&gt;Water rose overnight.&lt;/p&gt;</description></item>
<item><title>Older item</title><pubDate>Mon, 02 Jun 2025 08:00:00 GMT</pubDate></item>
<item><description></description></item>
</channel></rss>"#;

    fn connector(max: usize) -> RssConnector {
        let mut cfg = ConnectorConfig::new("wire", RSS_TYPE).with_param("content", FEED);
        cfg.max_events_per_fetch = max;
        RssConnector::from_config(cfg).unwrap()
    }

    #[test]
    fn needs_url_or_content() {
        let err = RssConnector::from_config(ConnectorConfig::new("x", RSS_TYPE)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn parses_items_and_skips_empty() {
        let events = connector(100).parse_items(FEED, None).unwrap();
        assert_eq!(events.len(), 2);
        let first = &events[0];
        assert_eq!(first.title(), Some("Bridge closed after flooding"));
        assert_eq!(first.content(), "Bridge closed after flooding. Water rose overnight.");
        assert_eq!(first.url(), Some("https://example.org/a"));
        assert_eq!(first.language(), Some("en"));
        assert_eq!(first.metadata()["feed_title"], "Wire");
        assert_eq!(first.timestamp().to_rfc3339(), "2025-06-03T10:00:00+00:00");
    }

    #[test]
    fn since_and_cap_are_honoured() {
        let c = connector(100);
        let since = parse_rfc2822("Mon, 02 Jun 2025 12:00:00 GMT");
        let events = c.parse_items(FEED, since).unwrap();
        assert_eq!(events.len(), 1);

        let events = connector(1).parse_items(FEED, None).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn bad_scheme_fails_validation() {
        let cfg = ConnectorConfig::new("x", RSS_TYPE).with_param("url", "ftp://example.org/feed");
        let c = RssConnector::from_config(cfg).unwrap();
        assert!(c.validate_config().is_err());
    }
}
