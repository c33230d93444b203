//! Virtual host routing entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::{json, Value};

use crate::backend::{Backend, BackendProperties};
use crate::criteria::{self, Criterion, RequestContext};
use crate::farm::FarmError;
use crate::hash::HashEngine;

/// Per-host proxy settings.
#[derive(Debug, Clone, Copy)]
pub struct VirtualHostSettings {
    /// Per-request timeout armed by the pipeline.
    pub request_timeout: Duration,
    /// Stream bodies as they arrive instead of buffering.
    pub chunked: bool,
    /// Emit one structured access-log line per proxied request.
    pub access_log: bool,
}

impl Default for VirtualHostSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5000),
            chunked: true,
            access_log: false,
        }
    }
}

impl VirtualHostSettings {
    /// Overlay control-plane `properties` on top of `defaults`.
    pub fn from_json(value: &Value, defaults: VirtualHostSettings) -> Self {
        let mut settings = defaults;
        if let Some(timeout) = value.get("requestTimeOut").and_then(Value::as_u64) {
            settings.request_timeout = Duration::from_millis(timeout);
        }
        if let Some(chunked) = value.get("enableChunked").and_then(Value::as_bool) {
            settings.chunked = chunked;
        }
        if let Some(access_log) = value.get("enableAccessLog").and_then(Value::as_bool) {
            settings.access_log = access_log;
        }
        settings
    }
}

/// A routing entry keyed by the inbound Host header: an ordered backend
/// set plus the selection criterion and per-host settings.
///
/// The backend set is swapped atomically; readers never lock. Mutation
/// happens only on the serialized control-plane path.
pub struct VirtualHost {
    name: String,
    backends: ArcSwap<Vec<Arc<Backend>>>,
    criterion: Box<dyn Criterion>,
    settings: VirtualHostSettings,
    version: AtomicU64,
}

impl VirtualHost {
    pub fn new(
        name: impl Into<String>,
        criterion_name: &str,
        engine: HashEngine,
        settings: VirtualHostSettings,
    ) -> Self {
        Self {
            name: name.into(),
            backends: ArcSwap::from_pointee(Vec::new()),
            criterion: criteria::from_name(criterion_name, engine),
            settings,
            version: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &VirtualHostSettings {
        &self.settings
    }

    pub fn criterion_name(&self) -> &'static str {
        self.criterion.name()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    /// Snapshot of the ordered backend set.
    pub fn backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    pub fn has_backends(&self) -> bool {
        !self.backends.load().is_empty()
    }

    /// Add a backend. Rejects an endpoint that is already present.
    pub fn add_backend(
        &self,
        endpoint: &str,
        props: BackendProperties,
    ) -> Result<Arc<Backend>, FarmError> {
        let current = self.backends.load_full();
        if current.iter().any(|b| b.id() == endpoint) {
            return Err(FarmError::AlreadyExists(endpoint.to_string()));
        }
        let backend = Arc::new(Backend::new(endpoint, props));
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(backend.clone());
        self.criterion.rebuild(&next);
        self.backends.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Relaxed);
        Ok(backend)
    }

    /// Remove a backend, closing its session. Fails when absent.
    pub fn remove_backend(&self, endpoint: &str) -> Result<(), FarmError> {
        let current = self.backends.load_full();
        let Some(removed) = current.iter().find(|b| b.id() == endpoint).cloned() else {
            return Err(FarmError::NotFound(endpoint.to_string()));
        };
        let next: Vec<_> = current
            .iter()
            .filter(|b| b.id() != endpoint)
            .cloned()
            .collect();
        self.criterion.rebuild(&next);
        self.backends.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Relaxed);
        removed.close();
        Ok(())
    }

    /// Drop every backend, closing their sessions.
    pub fn clear_backends(&self) {
        let current = self.backends.swap(Arc::new(Vec::new()));
        self.criterion.rebuild(&[]);
        self.version.fetch_add(1, Ordering::Relaxed);
        for backend in current.iter() {
            backend.close();
        }
    }

    /// Delegate to the criterion over the current set; `None` when empty.
    pub fn choose_backend(&self, ctx: &RequestContext) -> Option<Arc<Backend>> {
        let backends = self.backends.load();
        self.criterion.select(&backends, ctx)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.name,
            "version": self.version(),
            "properties": {
                "loadBalancePolicy": self.criterion.name(),
                "requestTimeOut": self.settings.request_timeout.as_millis() as u64,
                "enableChunked": self.settings.chunked,
                "enableAccessLog": self.settings.access_log,
            },
            "backends": self
                .backends
                .load()
                .iter()
                .map(|b| backend_json(b))
                .collect::<Vec<_>>(),
        })
    }
}

impl std::fmt::Debug for VirtualHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualHost")
            .field("name", &self.name)
            .field("criterion", &self.criterion.name())
            .field("backends", &self.backends.load().len())
            .finish()
    }
}

pub(crate) fn backend_json(backend: &Backend) -> Value {
    json!({
        "id": backend.id(),
        "activeConnections": backend.active_connections(),
        "weight": backend.weight(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::context;

    fn vhost() -> VirtualHost {
        VirtualHost::new(
            "www.example.test",
            "RoundRobin",
            HashEngine::default(),
            VirtualHostSettings::default(),
        )
    }

    #[test]
    fn add_is_idempotent_rejecting() {
        let vhost = vhost();
        assert!(vhost
            .add_backend("10.0.0.1:80", BackendProperties::default())
            .is_ok());
        assert!(matches!(
            vhost.add_backend("10.0.0.1:80", BackendProperties::default()),
            Err(FarmError::AlreadyExists(_))
        ));
        assert!(vhost.has_backends());
    }

    #[test]
    fn remove_missing_backend_fails() {
        let vhost = vhost();
        assert!(matches!(
            vhost.remove_backend("10.0.0.9:80"),
            Err(FarmError::NotFound(_))
        ));
    }

    #[test]
    fn choose_on_empty_set_is_none_not_a_crash() {
        let vhost = vhost();
        assert!(vhost.choose_backend(&context([192, 168, 1, 1])).is_none());
    }

    #[test]
    fn choose_cycles_over_the_ordered_set() {
        let vhost = vhost();
        vhost
            .add_backend("10.0.0.1:80", BackendProperties::default())
            .unwrap();
        vhost
            .add_backend("10.0.0.2:80", BackendProperties::default())
            .unwrap();
        let ctx = context([192, 168, 1, 1]);
        let a = vhost.choose_backend(&ctx).unwrap();
        let b = vhost.choose_backend(&ctx).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn settings_overlay_from_properties() {
        let value = serde_json::json!({
            "requestTimeOut": 1500,
            "enableChunked": false,
            "enableAccessLog": true,
        });
        let settings = VirtualHostSettings::from_json(&value, VirtualHostSettings::default());
        assert_eq!(settings.request_timeout, Duration::from_millis(1500));
        assert!(!settings.chunked);
        assert!(settings.access_log);
    }
}
