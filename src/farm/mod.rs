//! Process-wide routing registry.
//!
//! # Responsibilities
//! - Map inbound host names to virtual hosts
//! - Hold the control-plane version counter
//! - Project registry state as JSON for the admin read API
//!
//! # Design Decisions
//! - The pipeline only reads; all mutation arrives through the serialized
//!   control-plane task in `bus`
//! - Lookups are lock-free (DashMap); a request observes the registry
//!   state at the moment of its lookup

pub mod virtualhost;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;

use crate::backend::{Backend, BackendProperties};
use crate::hash::HashEngine;

pub use virtualhost::{VirtualHost, VirtualHostSettings};

/// Registry mutation failures, surfaced to the control plane.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FarmError {
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' not found")]
    NotFound(String),
}

/// Defaults applied to entities the control plane creates without
/// explicit properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct FarmDefaults {
    pub engine: HashEngine,
    pub vhost: VirtualHostSettings,
    pub backend: BackendProperties,
}

/// Host name → [`VirtualHost`] registry with a monotonic version counter.
#[derive(Debug)]
pub struct Farm {
    virtualhosts: DashMap<String, Arc<VirtualHost>>,
    version: AtomicU64,
    defaults: FarmDefaults,
}

impl Farm {
    pub fn new(defaults: FarmDefaults) -> Self {
        Self {
            virtualhosts: DashMap::new(),
            version: AtomicU64::new(0),
            defaults,
        }
    }

    /// Build a registry seeded with the virtual hosts a configuration
    /// declares. Later mutation arrives through the control-plane bus.
    pub fn from_config(config: &crate::config::ProxyConfig) -> Self {
        let farm = Self::new(config.farm_defaults());
        for entry in &config.virtualhosts {
            let criterion = entry
                .load_balance
                .as_deref()
                .unwrap_or(&config.routing.load_balance);
            let settings = config.vhost_settings(entry);
            match farm.add_virtualhost(&entry.host, criterion, settings) {
                Ok(vhost) => {
                    for endpoint in &entry.backends {
                        if let Err(e) = vhost.add_backend(endpoint, farm.defaults.backend) {
                            tracing::warn!(backend = %endpoint, virtualhost = %entry.host, error = %e, "Seed backend skipped");
                        }
                    }
                    tracing::info!(
                        virtualhost = %entry.host,
                        backends = vhost.backends().len(),
                        criterion = %vhost.criterion_name(),
                        "Virtualhost seeded"
                    );
                }
                Err(e) => {
                    tracing::warn!(virtualhost = %entry.host, error = %e, "Seed virtualhost skipped");
                }
            }
        }
        farm
    }

    pub fn defaults(&self) -> &FarmDefaults {
        &self.defaults
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.virtualhosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.virtualhosts.is_empty()
    }

    /// Resolve a virtual host by the inbound host name (no port).
    pub fn get_virtualhost(&self, host: &str) -> Option<Arc<VirtualHost>> {
        self.virtualhosts.get(host).map(|entry| entry.clone())
    }

    /// Create a virtual host with the given criterion and settings.
    /// Rejects a name that is already registered.
    pub fn add_virtualhost(
        &self,
        name: &str,
        criterion: &str,
        settings: VirtualHostSettings,
    ) -> Result<Arc<VirtualHost>, FarmError> {
        if self.virtualhosts.contains_key(name) {
            return Err(FarmError::AlreadyExists(name.to_string()));
        }
        let vhost = Arc::new(VirtualHost::new(
            name,
            criterion,
            self.defaults.engine,
            settings,
        ));
        self.virtualhosts.insert(name.to_string(), vhost.clone());
        Ok(vhost)
    }

    /// Create a virtual host with registry defaults.
    pub fn add_virtualhost_default(&self, name: &str) -> Result<Arc<VirtualHost>, FarmError> {
        self.add_virtualhost(
            name,
            crate::criteria::DEFAULT_CRITERION,
            self.defaults.vhost,
        )
    }

    /// Remove a virtual host, closing its backend sessions. Fails when the
    /// name is not registered.
    pub fn remove_virtualhost(&self, name: &str) -> Result<(), FarmError> {
        match self.virtualhosts.remove(name) {
            Some((_, vhost)) => {
                vhost.clear_backends();
                Ok(())
            }
            None => Err(FarmError::NotFound(name.to_string())),
        }
    }

    /// Bulk clear: every virtual host is dropped and every backend session
    /// closed. The control plane's delete-only `route` action.
    pub fn clear_routes(&self) {
        for entry in self.virtualhosts.iter() {
            entry.value().clear_backends();
        }
        self.virtualhosts.clear();
    }

    /// Find a backend by endpoint across all virtual hosts.
    pub fn find_backend(&self, endpoint: &str) -> Option<Arc<Backend>> {
        for entry in self.virtualhosts.iter() {
            if let Some(backend) = entry
                .value()
                .backends()
                .iter()
                .find(|b| b.id() == endpoint)
            {
                return Some(backend.clone());
            }
        }
        None
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.virtualhosts
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Full registry projection for `GET /farm`.
    pub fn to_json(&self) -> Value {
        let mut hosts: Vec<Value> = self
            .virtualhosts
            .iter()
            .map(|entry| entry.value().to_json())
            .collect();
        hosts.sort_by_key(|v| v["id"].as_str().map(String::from));
        json!({
            "version": self.version(),
            "virtualhosts": hosts,
        })
    }

    /// Projection for `GET /virtualhost/{id}`; `None` when unknown.
    pub fn virtualhost_json(&self, id: &str) -> Option<Value> {
        self.get_virtualhost(id).map(|vhost| vhost.to_json())
    }

    /// Projection for `GET /backend/{id}`; `None` when unknown.
    pub fn backend_json(&self, id: &str) -> Option<Value> {
        self.find_backend(id)
            .map(|backend| virtualhost::backend_json(&backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm() -> Farm {
        Farm::new(FarmDefaults::default())
    }

    #[test]
    fn add_rejects_duplicates() {
        let farm = farm();
        assert!(farm.add_virtualhost_default("a.test").is_ok());
        assert!(matches!(
            farm.add_virtualhost_default("a.test"),
            Err(FarmError::AlreadyExists(_))
        ));
    }

    #[test]
    fn remove_missing_fails() {
        let farm = farm();
        assert_eq!(
            farm.remove_virtualhost("a.test"),
            Err(FarmError::NotFound("a.test".into()))
        );
    }

    #[test]
    fn clear_routes_empties_the_registry() {
        let farm = farm();
        farm.add_virtualhost_default("a.test").unwrap();
        farm.add_virtualhost_default("b.test").unwrap();
        farm.clear_routes();
        assert!(farm.is_empty());
    }

    #[test]
    fn backend_lookup_spans_virtual_hosts() {
        let farm = farm();
        let vhost = farm.add_virtualhost_default("a.test").unwrap();
        vhost
            .add_backend("10.0.0.1:8080", BackendProperties::default())
            .unwrap();
        assert!(farm.find_backend("10.0.0.1:8080").is_some());
        assert!(farm.find_backend("10.0.0.9:8080").is_none());
        assert!(farm.backend_json("10.0.0.1:8080").is_some());
    }

    #[test]
    fn version_is_settable() {
        let farm = farm();
        farm.set_version(42);
        assert_eq!(farm.version(), 42);
        assert_eq!(farm.to_json()["version"], 42);
    }
}
