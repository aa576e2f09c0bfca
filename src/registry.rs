// src/registry.rs
//! Connector type factories and live source instances.
//!
//! One `Registry` is built at startup and shared behind an `Arc` by the
//! coordinator and the ops router. Mutations are all-or-nothing: a failed
//! registration or re-registration leaves the previous state untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ConnectorConfig;
use crate::connector::{Connector, ConnectorHealth, RssConnector, RSS_TYPE};
use crate::error::IngestError;

/// Builds a connector from its config record.
pub type ConnectorFactory =
    Arc<dyn Fn(ConnectorConfig) -> Result<Arc<dyn Connector>, IngestError> + Send + Sync>;

/// Budget for a single connector's `health_status` call.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

struct Entry {
    connector: Arc<dyn Connector>,
    config: ConnectorConfig,
}

/// Bulk persistence shape: `{connector_types: [...], sources: {id: config}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryExport {
    pub connector_types: Vec<String>,
    pub sources: BTreeMap<String, ConnectorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub total_sources: usize,
    pub enabled_sources: usize,
    pub connector_types: Vec<String>,
    pub sources_by_type: BTreeMap<String, usize>,
}

#[derive(Default)]
pub struct Registry {
    factories: RwLock<BTreeMap<String, ConnectorFactory>>,
    sources: RwLock<BTreeMap<String, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("connector_types", &self.connector_types())
            .field("sources", &self.list_sources())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in connector type registered.
    pub fn with_builtin_types() -> Self {
        let r = Self::new();
        r.register_connector_type(RSS_TYPE, RssConnector::create);
        r
    }

    /// Register (or replace) the factory for `source_type`.
    pub fn register_connector_type<F>(&self, source_type: impl Into<String>, factory: F)
    where
        F: Fn(ConnectorConfig) -> Result<Arc<dyn Connector>, IngestError> + Send + Sync + 'static,
    {
        let source_type = source_type.into();
        let prev = self
            .factories
            .write()
            .expect("registry lock poisoned")
            .insert(source_type.clone(), Arc::new(factory));
        if prev.is_some() {
            warn!(target: "ingest", %source_type, "connector type re-registered");
        }
    }

    pub fn connector_types(&self) -> Vec<String> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Validate, instantiate and store a new source. Fails on a duplicate id.
    pub fn register_source(&self, config: ConnectorConfig) -> Result<Arc<dyn Connector>, IngestError> {
        if self.is_registered(&config.source_id) {
            return Err(IngestError::DuplicateSource(config.source_id));
        }
        let connector = self.instantiate(&config)?;

        let mut sources = self.sources.write().expect("registry lock poisoned");
        // re-check under the write lock; another caller may have won the race
        if sources.contains_key(&config.source_id) {
            return Err(IngestError::DuplicateSource(config.source_id));
        }
        info!(
            target: "ingest",
            source_id = %config.source_id,
            source_type = %config.source_type,
            enabled = config.enabled,
            "source registered"
        );
        sources.insert(
            config.source_id.clone(),
            Entry {
                connector: connector.clone(),
                config,
            },
        );
        Ok(connector)
    }

    pub fn unregister_source(&self, source_id: &str) -> Result<(), IngestError> {
        match self
            .sources
            .write()
            .expect("registry lock poisoned")
            .remove(source_id)
        {
            Some(_) => {
                info!(target: "ingest", source_id, "source unregistered");
                Ok(())
            }
            None => Err(IngestError::SourceNotFound(source_id.to_string())),
        }
    }

    pub fn enable_source(&self, source_id: &str) -> Result<(), IngestError> {
        self.reconfigure(source_id, |c| c.enabled = true)
    }

    pub fn disable_source(&self, source_id: &str) -> Result<(), IngestError> {
        self.reconfigure(source_id, |c| c.enabled = false)
    }

    /// Re-register `source_id` with a patched config. On any error the
    /// previous connector and config stay in place.
    pub fn reconfigure<F>(&self, source_id: &str, patch: F) -> Result<(), IngestError>
    where
        F: FnOnce(&mut ConnectorConfig),
    {
        let mut config = self
            .get_config(source_id)
            .ok_or_else(|| IngestError::SourceNotFound(source_id.to_string()))?;
        patch(&mut config);
        if config.source_id != source_id {
            return Err(IngestError::config(format!(
                "{source_id}: source_id cannot be changed by reconfiguration"
            )));
        }
        let connector = self.instantiate(&config)?;
        self.replace(config, connector)
    }

    pub fn get_enabled_connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.sources
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|e| e.config.enabled)
            .map(|e| e.connector.clone())
            .collect()
    }

    pub fn get_connector(&self, source_id: &str) -> Option<Arc<dyn Connector>> {
        self.sources
            .read()
            .expect("registry lock poisoned")
            .get(source_id)
            .map(|e| e.connector.clone())
    }

    pub fn get_config(&self, source_id: &str) -> Option<ConnectorConfig> {
        self.sources
            .read()
            .expect("registry lock poisoned")
            .get(source_id)
            .map(|e| e.config.clone())
    }

    pub fn is_registered(&self, source_id: &str) -> bool {
        self.sources
            .read()
            .expect("registry lock poisoned")
            .contains_key(source_id)
    }

    pub fn list_sources(&self) -> Vec<String> {
        self.sources
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Health of every registered source. No lock is held while awaiting.
    pub async fn health_check_all(&self) -> BTreeMap<String, ConnectorHealth> {
        let snapshot: Vec<(String, Arc<dyn Connector>)> = self
            .sources
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(id, e)| (id.clone(), e.connector.clone()))
            .collect();

        let mut out = BTreeMap::new();
        for (id, connector) in snapshot {
            let health = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, connector.health_status())
                .await
                .unwrap_or_else(|_| ConnectorHealth::unhealthy("health check timed out"));
            out.insert(id, health);
        }
        out
    }

    pub fn registry_stats(&self) -> RegistryStats {
        let sources = self.sources.read().expect("registry lock poisoned");
        let mut sources_by_type = BTreeMap::new();
        for e in sources.values() {
            *sources_by_type
                .entry(e.config.source_type.clone())
                .or_insert(0) += 1;
        }
        RegistryStats {
            total_sources: sources.len(),
            enabled_sources: sources.values().filter(|e| e.config.enabled).count(),
            connector_types: self.connector_types(),
            sources_by_type,
        }
    }

    pub fn export_configuration(&self) -> RegistryExport {
        RegistryExport {
            connector_types: self.connector_types(),
            sources: self
                .sources
                .read()
                .expect("registry lock poisoned")
                .iter()
                .map(|(id, e)| (id.clone(), e.config.clone()))
                .collect(),
        }
    }

    /// Register every source in `export`, replacing sources with the same id.
    /// Failures are collected per source; the rest still get imported.
    pub fn import_configuration(&self, export: RegistryExport) -> ImportReport {
        let known = self.connector_types();
        for t in export.connector_types.iter().filter(|t| !known.contains(t)) {
            warn!(target: "ingest", source_type = %t, "imported configuration names an unknown connector type");
        }

        let mut report = ImportReport::default();
        for (id, mut config) in export.sources {
            if config.source_id.is_empty() {
                config.source_id = id.clone();
            }
            let result = if config.source_id != id {
                Err(IngestError::config(format!(
                    "key {id} does not match source_id {}",
                    config.source_id
                )))
            } else {
                self.instantiate(&config)
                    .and_then(|connector| self.upsert(config, connector))
            };
            match result {
                Ok(()) => report.imported.push(id),
                Err(e) => {
                    warn!(target: "ingest", source_id = %id, error = %e, "source import failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report
    }

    /// Write the export to `path` (TOML for `.toml`, JSON otherwise).
    pub fn save_configuration(&self, path: &Path) -> Result<(), IngestError> {
        let export = self.export_configuration();
        let text = if is_toml(path) {
            toml::to_string_pretty(&export)?
        } else {
            serde_json::to_string_pretty(&export)?
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load_configuration(&self, path: &Path) -> Result<ImportReport, IngestError> {
        let text = std::fs::read_to_string(path)?;
        let export: RegistryExport = if is_toml(path) {
            toml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        Ok(self.import_configuration(export))
    }

    fn instantiate(&self, config: &ConnectorConfig) -> Result<Arc<dyn Connector>, IngestError> {
        config.validate()?;
        let factory = self
            .factories
            .read()
            .expect("registry lock poisoned")
            .get(&config.source_type)
            .cloned()
            .ok_or_else(|| IngestError::UnknownConnectorType(config.source_type.clone()))?;
        let connector = factory(config.clone())?;
        connector.validate_config()?;
        Ok(connector)
    }

    fn replace(&self, config: ConnectorConfig, connector: Arc<dyn Connector>) -> Result<(), IngestError> {
        let mut sources = self.sources.write().expect("registry lock poisoned");
        match sources.get_mut(&config.source_id) {
            Some(entry) => {
                info!(
                    target: "ingest",
                    source_id = %config.source_id,
                    enabled = config.enabled,
                    "source re-registered"
                );
                *entry = Entry { connector, config };
                Ok(())
            }
            None => Err(IngestError::SourceNotFound(config.source_id)),
        }
    }

    fn upsert(&self, config: ConnectorConfig, connector: Arc<dyn Connector>) -> Result<(), IngestError> {
        self.sources
            .write()
            .expect("registry lock poisoned")
            .insert(config.source_id.clone(), Entry { connector, config });
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}
