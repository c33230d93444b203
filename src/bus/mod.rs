//! Control-plane update queue and failure sink.
//!
//! # Data Flow
//! ```text
//! control plane emits route/version messages
//!     → UpdateQueue (mpsc, unbounded)
//!     → single consumer task applies them to the Farm in arrival order
//! ```
//!
//! # Design Decisions
//! - One consumer serializes every registry mutation; the proxy pipeline
//!   never mutates the registry, so no locking is needed on the read path
//! - Add is idempotent-rejecting and delete fails on absent targets; both
//!   outcomes are logged and reported to the caller

pub mod message;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::backend::BackendProperties;
use crate::farm::{Farm, VirtualHostSettings};

pub use message::{MessageError, RouteMessage, NUM_FIELDS, SEPARATOR};

/// Sink for backend failure notifications, consumed by the control plane
/// to mark a backend degraded.
pub trait QueueService: Send + Sync + std::fmt::Debug {
    fn publish_backend_fail(&self, backend_id: &str);
}

/// Default sink: a structured log line plus a failure counter.
#[derive(Debug, Default)]
pub struct LogQueueService;

impl QueueService for LogQueueService {
    fn publish_backend_fail(&self, backend_id: &str) {
        tracing::warn!(backend = %backend_id, "Backend failure published");
        metrics::counter!(
            "gannet_backend_failures_total",
            "backend" => backend_id.to_string()
        )
        .increment(1);
    }
}

/// A queued control-plane update.
#[derive(Debug, Clone)]
pub enum Update {
    Add(String),
    Del(String),
    Version(String),
}

/// Producer handle for the serialized update queue.
#[derive(Debug, Clone)]
pub struct UpdateQueue {
    tx: mpsc::UnboundedSender<Update>,
}

impl UpdateQueue {
    /// Spawn the consumer task over `farm` and return the producer handle.
    pub fn start(farm: Arc<Farm>, mut shutdown: broadcast::Receiver<()>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Update>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = rx.recv() => {
                        let Some(update) = update else { break };
                        match update {
                            Update::Add(raw) => {
                                apply_add(&farm, &raw);
                            }
                            Update::Del(raw) => {
                                apply_del(&farm, &raw);
                            }
                            Update::Version(raw) => {
                                apply_version(&farm, &raw);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Update queue received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });
        (Self { tx }, task)
    }

    pub fn publish_add(&self, raw: impl Into<String>) {
        let _ = self.tx.send(Update::Add(raw.into()));
    }

    pub fn publish_del(&self, raw: impl Into<String>) {
        let _ = self.tx.send(Update::Del(raw.into()));
    }

    pub fn publish_version(&self, raw: impl Into<String>) {
        let _ = self.tx.send(Update::Version(raw.into()));
    }
}

/// Apply an add message. Returns false when the message is malformed, the
/// uri base is unsupported, or the target already exists.
pub fn apply_add(farm: &Farm, raw: &str) -> bool {
    let msg = match RouteMessage::parse(raw) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed add message");
            return false;
        }
    };

    match msg.uri_base() {
        "route" | "virtualhost" => {
            let criterion = msg
                .properties
                .get("loadBalancePolicy")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(crate::criteria::DEFAULT_CRITERION);
            let settings = VirtualHostSettings::from_json(&msg.properties, farm.defaults().vhost);
            match farm.add_virtualhost(&msg.virtualhost, criterion, settings) {
                Ok(_) => {
                    tracing::info!(virtualhost = %msg.virtualhost, "Virtualhost added");
                    true
                }
                Err(e) => {
                    tracing::warn!(virtualhost = %msg.virtualhost, error = %e, "Virtualhost not added");
                    false
                }
            }
        }
        "real" => {
            let Some(endpoint) = msg.endpoint() else {
                tracing::warn!(virtualhost = %msg.virtualhost, "Backend add without endpoint");
                return false;
            };
            let Some(vhost) = farm.get_virtualhost(&msg.virtualhost) else {
                tracing::warn!(
                    backend = %endpoint,
                    virtualhost = %msg.virtualhost,
                    "Backend not added, virtualhost does not exist"
                );
                return false;
            };
            let props = BackendProperties::from_json(&msg.properties, farm.defaults().backend);
            match vhost.add_backend(&endpoint, props) {
                Ok(_) => {
                    tracing::info!(backend = %endpoint, virtualhost = %msg.virtualhost, "Backend added");
                    true
                }
                Err(e) => {
                    tracing::warn!(backend = %endpoint, virtualhost = %msg.virtualhost, error = %e, "Backend not added");
                    false
                }
            }
        }
        other => {
            tracing::warn!(uri_base = %other, "Unsupported uri base");
            false
        }
    }
}

/// Apply a delete message. `route` clears every virtual host; the other
/// targets fail when absent.
pub fn apply_del(farm: &Farm, raw: &str) -> bool {
    let msg = match RouteMessage::parse(raw) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed del message");
            return false;
        }
    };

    match msg.uri_base() {
        "route" => {
            farm.clear_routes();
            tracing::info!("All routes cleared");
            true
        }
        "virtualhost" => match farm.remove_virtualhost(&msg.virtualhost) {
            Ok(()) => {
                tracing::info!(virtualhost = %msg.virtualhost, "Virtualhost removed");
                true
            }
            Err(e) => {
                tracing::warn!(virtualhost = %msg.virtualhost, error = %e, "Virtualhost not removed");
                false
            }
        },
        "real" => {
            let Some(endpoint) = msg.endpoint() else {
                tracing::warn!(virtualhost = %msg.virtualhost, "Backend delete without endpoint");
                return false;
            };
            let Some(vhost) = farm.get_virtualhost(&msg.virtualhost) else {
                tracing::warn!(
                    backend = %endpoint,
                    virtualhost = %msg.virtualhost,
                    "Backend not removed, virtualhost does not exist"
                );
                return false;
            };
            match vhost.remove_backend(&endpoint) {
                Ok(()) => {
                    tracing::info!(backend = %endpoint, virtualhost = %msg.virtualhost, "Backend removed");
                    true
                }
                Err(e) => {
                    tracing::warn!(backend = %endpoint, virtualhost = %msg.virtualhost, error = %e, "Backend not removed");
                    false
                }
            }
        }
        other => {
            tracing::warn!(uri_base = %other, "Unsupported uri base");
            false
        }
    }
}

/// Apply a version message: a bare integer. Anything else is ignored.
pub fn apply_version(farm: &Farm, raw: &str) -> bool {
    match raw.trim().parse::<u64>() {
        Ok(version) => {
            farm.set_version(version);
            tracing::info!(version, "Farm version updated");
            true
        }
        Err(_) => false,
    }
}
