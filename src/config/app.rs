// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConnectorConfig;
use crate::error::IngestError;
use crate::validate::ValidatorConfig;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const ENV_DEFAULT_INTERVAL: &str = "INGEST_DEFAULT_INTERVAL_SECS";
pub const ENV_STAGGER: &str = "INGEST_STAGGER_SECS";
pub const ENV_FETCH_TIMEOUT: &str = "INGEST_FETCH_TIMEOUT_SECS";
pub const ENV_BIND: &str = "INGEST_BIND";

pub const DEFAULT_TOML_PATH: &str = "config/ingest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/ingest.json";

/// Whole service configuration, one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordinator: CoordinatorSettings,
    pub validator: ValidatorConfig,
    pub scheduling: SchedulingConfig,
    pub server: ServerConfig,
    pub sources: Vec<ConnectorConfig>,
}

/// Coordinator timing and capacity knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub default_interval_secs: u64,
    pub stagger_delay_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_concurrent: usize,
    pub dedup_max_entries: usize,
    /// Upper bound on the back-off after a failed cycle.
    pub error_backoff_cap_secs: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            default_interval_secs: 300,
            stagger_delay_secs: 5,
            fetch_timeout_secs: 300,
            max_concurrent: 10,
            dedup_max_entries: 10_000,
            error_backoff_cap_secs: 60,
        }
    }
}

impl CoordinatorSettings {
    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }

    pub fn stagger_delay(&self) -> Duration {
        Duration::from_secs(self.stagger_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn error_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.error_backoff_cap_secs)
    }

    /// Stagger may be zero; everything else must be positive.
    pub fn validate(&self) -> Result<(), IngestError> {
        let positive = [
            ("default_interval_secs", self.default_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("max_concurrent", self.max_concurrent as u64),
            ("dedup_max_entries", self.dedup_max_entries as u64),
            ("error_backoff_cap_secs", self.error_backoff_cap_secs),
        ];
        match positive.iter().find(|(_, v)| *v == 0) {
            Some((name, _)) => Err(IngestError::config(format!(
                "coordinator.{name} must be positive"
            ))),
            None => Ok(()),
        }
    }
}

/// Named priority tiers (critical/high/medium/low, or anything else).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub tiers: BTreeMap<String, PriorityTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityTier {
    #[serde(default)]
    pub source_ids: Vec<String>,
    pub fetch_interval: u64,
}

impl SchedulingConfig {
    /// Flatten tiers into `source_id -> interval`. A source listed in several
    /// tiers gets the shortest interval.
    pub fn tier_intervals(&self) -> BTreeMap<String, u64> {
        let mut out: BTreeMap<String, u64> = BTreeMap::new();
        for tier in self.tiers.values() {
            if tier.fetch_interval == 0 {
                continue;
            }
            for id in &tier.source_ids {
                out.entry(id.clone())
                    .and_modify(|cur| *cur = (*cur).min(tier.fetch_interval))
                    .or_insert(tier.fetch_interval);
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        for (name, tier) in &self.tiers {
            if tier.fetch_interval == 0 {
                return Err(IngestError::config(format!(
                    "scheduling tier `{name}`: fetch_interval must be positive"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:9090".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.scheduling.validate()?;
        for src in &self.sources {
            src.validate()
                .with_context(|| format!("source `{}`", src.source_id))?;
        }
        Ok(())
    }

    /// Apply `INGEST_*` env overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_u64(ENV_DEFAULT_INTERVAL)? {
            self.coordinator.default_interval_secs = v;
        }
        if let Some(v) = env_u64(ENV_STAGGER)? {
            self.coordinator.stagger_delay_secs = v;
        }
        if let Some(v) = env_u64(ENV_FETCH_TIMEOUT)? {
            self.coordinator.fetch_timeout_secs = v;
        }
        if let Ok(bind) = std::env::var(ENV_BIND) {
            let bind = bind.trim();
            if !bind.is_empty() {
                self.server.bind = bind.to_string();
            }
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer, got `{raw}`")),
        Err(_) => Ok(None),
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_config(&content, ext.as_str())?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config using env var + fallbacks:
/// 1) $INGEST_CONFIG_PATH
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults (no sources)
pub fn load_config_default() -> Result<AppConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_config_from(&pb);
        }
    }
    let mut cfg = AppConfig::default();
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Parse config text; `hint_ext` picks the format first, the other is tried as fallback.
pub fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    let json_first = hint_ext == "json" || s.trim_start().starts_with('{');
    if json_first {
        match serde_json::from_str::<AppConfig>(s) {
            Ok(v) => return Ok(v),
            Err(e) if hint_ext == "json" => return Err(e).context("parsing ingest config json"),
            Err(_) => {}
        }
    }
    match toml::from_str::<AppConfig>(s) {
        Ok(v) => Ok(v),
        Err(e) if !json_first => serde_json::from_str::<AppConfig>(s)
            .map_err(|_| anyhow!(e))
            .context("parsing ingest config"),
        Err(e) => Err(anyhow!(e)).context("parsing ingest config"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[coordinator]
default_interval_secs = 120
stagger_delay_secs = 2

[validator]
min_content_length = 15
allowed_languages = ["en", "uk"]

[scheduling.tiers.critical]
source_ids = ["a", "b"]
fetch_interval = 30

[scheduling.tiers.low]
source_ids = ["b", "c"]
fetch_interval = 900

[[sources]]
source_id = "a"
source_type = "rss"
url = "https://example.test/a.xml"
"#;

    #[test]
    fn parses_toml_sections() {
        let cfg = parse_config(SAMPLE, "toml").unwrap();
        assert_eq!(cfg.coordinator.default_interval_secs, 120);
        assert_eq!(cfg.coordinator.fetch_timeout_secs, 300);
        assert_eq!(cfg.validator.min_content_length, 15);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.server.bind, "127.0.0.1:9090");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn overlapping_tiers_take_shortest_interval() {
        let cfg = parse_config(SAMPLE, "toml").unwrap();
        let tiers = cfg.scheduling.tier_intervals();
        assert_eq!(tiers.get("a"), Some(&30));
        assert_eq!(tiers.get("b"), Some(&30));
        assert_eq!(tiers.get("c"), Some(&900));
    }

    #[test]
    fn json_is_accepted_without_hint() {
        let cfg = parse_config(r#"{"coordinator":{"max_concurrent":4}}"#, "").unwrap();
        assert_eq!(cfg.coordinator.max_concurrent, 4);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = AppConfig::default();
        cfg.coordinator.default_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_settings_are_configuration_errors() {
        let settings = CoordinatorSettings {
            max_concurrent: 0,
            ..CoordinatorSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("coordinator.max_concurrent"));

        let mut cfg = AppConfig::default();
        cfg.coordinator.error_backoff_cap_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err
            .downcast_ref::<IngestError>()
            .is_some_and(IngestError::is_configuration));

        let mut scheduling = SchedulingConfig::default();
        scheduling.tiers.insert(
            "low".into(),
            PriorityTier {
                source_ids: vec!["a".into()],
                fetch_interval: 0,
            },
        );
        assert!(scheduling.validate().unwrap_err().is_configuration());
    }
}
