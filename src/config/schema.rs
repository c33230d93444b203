//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every
//! field has a default so a minimal (or empty) config file boots a
//! working, if empty, proxy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendProperties, KeepAlivePolicy};
use crate::farm::{FarmDefaults, VirtualHostSettings};
use crate::hash::HashEngine;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Admin read-API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Backend session defaults (keep-alive policy, pool size).
    pub session: SessionConfig,

    /// Defaults applied to virtual hosts created without explicit
    /// properties (config seeding and control-plane adds).
    pub routing: RoutingDefaults,

    /// Virtual hosts seeded into the farm at startup.
    pub virtualhosts: Vec<VirtualHostConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Admin read-API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the read API.
    pub enabled: bool,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8010".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Backend session defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keep backend connections alive between requests.
    pub keepalive: bool,

    /// Requests after which a session is rotated.
    pub keepalive_max_requests: u64,

    /// Session age in milliseconds after which it is rotated.
    pub keepalive_timeout_ms: u64,

    /// Idle pooled connections kept per backend.
    pub max_pool_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive: true,
            keepalive_max_requests: u64::MAX,
            keepalive_timeout_ms: 86_400_000,
            max_pool_size: 1,
        }
    }
}

/// Defaults for virtual hosts created without explicit properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingDefaults {
    /// Load-balance criterion name; unknown names fall back to RoundRobin.
    pub load_balance: String,

    /// Hash algorithm name for hash-based criteria; unknown names fall
    /// back to SIP24.
    pub hash: String,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Stream bodies instead of buffering them.
    pub chunked: bool,

    /// Emit an access-log line per proxied request.
    pub access_log: bool,
}

impl Default for RoutingDefaults {
    fn default() -> Self {
        Self {
            load_balance: "RoundRobin".to_string(),
            hash: "SIP24".to_string(),
            request_timeout_ms: 5000,
            chunked: true,
            access_log: false,
        }
    }
}

/// A virtual host seeded at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualHostConfig {
    /// Host header this entry answers for.
    pub host: String,

    /// Criterion name; falls back to the routing default when omitted.
    pub load_balance: Option<String>,

    /// Per-request timeout override in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Chunked-transfer override.
    pub chunked: Option<bool>,

    /// Access-log override.
    pub access_log: Option<bool>,

    /// Backend endpoints (`host:port`).
    #[serde(default)]
    pub backends: Vec<String>,
}

impl ProxyConfig {
    /// Registry defaults derived from this configuration.
    pub fn farm_defaults(&self) -> FarmDefaults {
        FarmDefaults {
            engine: HashEngine::from_name(&self.routing.hash),
            vhost: VirtualHostSettings {
                request_timeout: Duration::from_millis(self.routing.request_timeout_ms),
                chunked: self.routing.chunked,
                access_log: self.routing.access_log,
            },
            backend: BackendProperties {
                keep_alive: KeepAlivePolicy {
                    enabled: self.session.keepalive,
                    max_requests: self.session.keepalive_max_requests,
                    timeout: Duration::from_millis(self.session.keepalive_timeout_ms),
                    max_pool_size: self.session.max_pool_size,
                },
                weight: 1,
            },
        }
    }

    /// Settings for one seeded virtual host: routing defaults plus the
    /// entry's overrides.
    pub fn vhost_settings(&self, vhost: &VirtualHostConfig) -> VirtualHostSettings {
        let defaults = self.farm_defaults().vhost;
        VirtualHostSettings {
            request_timeout: vhost
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            chunked: vhost.chunked.unwrap_or(defaults.chunked),
            access_log: vhost.access_log.unwrap_or(defaults.access_log),
        }
    }
}
