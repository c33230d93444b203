//! Backend servers and their connection lifecycle.
//!
//! # Data Flow
//! ```text
//! VirtualHost picks a Backend
//!     → session.rs (pooled client handle, keep-alive rotation)
//!     → accounting.rs (per-identity open-connection counters)
//!     → pipeline issues the outbound request on the handle
//! ```

pub mod accounting;
pub mod session;

use std::sync::Arc;

use serde_json::Value;

pub use accounting::{AccountingGuard, ConnectionAccounting, RemoteIdentity};
pub use session::{BackendSession, HttpClient, KeepAlivePolicy};

/// Per-backend settings, resolved from session defaults plus the
/// control-plane `properties` JSON.
#[derive(Debug, Clone, Copy)]
pub struct BackendProperties {
    pub keep_alive: KeepAlivePolicy,
    pub weight: u32,
}

impl Default for BackendProperties {
    fn default() -> Self {
        Self {
            keep_alive: KeepAlivePolicy::default(),
            weight: 1,
        }
    }
}

impl BackendProperties {
    /// Overlay the control-plane `properties` object on top of `defaults`.
    /// Unknown fields are ignored; malformed values keep the default.
    pub fn from_json(value: &Value, defaults: BackendProperties) -> Self {
        let mut props = defaults;
        if let Some(keepalive) = value.get("keepalive").and_then(Value::as_bool) {
            props.keep_alive.enabled = keepalive;
        }
        if let Some(max) = value.get("keepAliveMaxRequest").and_then(Value::as_u64) {
            props.keep_alive.max_requests = max;
        }
        if let Some(timeout) = value.get("keepAliveTimeOut").and_then(Value::as_u64) {
            props.keep_alive.timeout = std::time::Duration::from_millis(timeout);
        }
        if let Some(pool) = value.get("maxPoolSize").and_then(Value::as_u64) {
            props.keep_alive.max_pool_size = pool as usize;
        }
        if let Some(weight) = value.get("weight").and_then(Value::as_u64) {
            props.weight = weight as u32;
        }
        props
    }
}

/// One upstream server addressable as `host:port`.
#[derive(Debug)]
pub struct Backend {
    id: String,
    host: String,
    port: u16,
    weight: u32,
    session: Arc<BackendSession>,
}

impl Backend {
    /// Build from a `host:port` identity. A missing or malformed port
    /// falls back to 80.
    pub fn new(id: impl Into<String>, props: BackendProperties) -> Self {
        let id = id.into();
        let (host, port) = match id.split_once(':') {
            Some((host, port)) => (host.to_string(), port.parse().unwrap_or(80)),
            None => (id.clone(), 80),
        };
        Self {
            session: Arc::new(BackendSession::new(id.clone(), props.keep_alive)),
            id,
            host,
            port,
            weight: props.weight,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// The authority used for outbound request URIs.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Obtain a usable client handle for this backend, registering the
    /// remote identity with the accounting.
    pub fn connect(&self, remote: &RemoteIdentity) -> HttpClient {
        self.session.connect(remote)
    }

    /// Discard the session. Idempotent.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn accounting(&self) -> &Arc<ConnectionAccounting> {
        self.session.accounting()
    }

    /// Distinct remote identities currently connected through this backend.
    pub fn active_connections(&self) -> usize {
        self.session.accounting().active_count()
    }
}

impl PartialEq for Backend {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Backend {}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
