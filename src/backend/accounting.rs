//! Per-backend connection accounting.
//!
//! # Responsibilities
//! - Track the set of distinct remote identities with an open logical
//!   connection to one backend
//! - Count open connections per identity
//! - Broadcast a zero reset after a hard backend failure
//!
//! The active count is the number of distinct identities with a count
//! above zero, not the raw number of connection attempts.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;

/// The client-side key used for sticky routing, IP-hash selection and
/// per-client accounting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteIdentity {
    pub ip: IpAddr,
    pub port: u16,
}

impl RemoteIdentity {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The IP rendered alone, as consumed by IpHash and the X-Forwarded-*
    /// rewrite.
    pub fn ip_string(&self) -> String {
        self.ip.to_string()
    }
}

impl From<SocketAddr> for RemoteIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Open-connection counters for one backend, keyed by remote identity.
#[derive(Debug)]
pub struct ConnectionAccounting {
    backend_id: String,
    connections: DashMap<RemoteIdentity, usize>,
}

impl ConnectionAccounting {
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            connections: DashMap::new(),
        }
    }

    /// Record one more open connection for `remote`. Returns true when the
    /// identity was not previously present.
    pub fn open(&self, remote: &RemoteIdentity) -> bool {
        let mut entry = self.connections.entry(remote.clone()).or_insert(0);
        *entry += 1;
        let is_new = *entry == 1;
        drop(entry);
        self.record_gauge();
        is_new
    }

    /// Record one connection closed for `remote`. The entry is removed when
    /// its count reaches zero; closing an absent identity is a no-op.
    pub fn close(&self, remote: &RemoteIdentity) {
        let mut removed = false;
        if let Some(mut entry) = self.connections.get_mut(remote) {
            *entry = entry.saturating_sub(1);
            removed = *entry == 0;
        }
        if removed {
            self.connections.remove_if(remote, |_, count| *count == 0);
        }
        self.record_gauge();
    }

    /// Number of distinct identities currently holding open connections.
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Broadcast a reset after a hard backend failure: all counters drop to
    /// zero and observers see an empty gauge.
    pub fn publish_zero(&self) {
        self.connections.clear();
        self.record_gauge();
        tracing::debug!(backend = %self.backend_id, "Connection counters reset to zero");
    }

    /// Forget all counters without the failure broadcast.
    pub fn clear(&self) {
        self.connections.clear();
        self.record_gauge();
    }

    fn record_gauge(&self) {
        metrics::gauge!(
            "gannet_backend_active_connections",
            "backend" => self.backend_id.clone()
        )
        .set(self.connections.len() as f64);
    }
}

/// RAII handle pairing one `open` with exactly one `close`.
#[derive(Debug)]
pub struct AccountingGuard {
    accounting: Arc<ConnectionAccounting>,
    remote: RemoteIdentity,
}

impl AccountingGuard {
    /// Wrap an already-registered open; the matching close happens on drop.
    pub fn new(accounting: Arc<ConnectionAccounting>, remote: RemoteIdentity) -> Self {
        Self { accounting, remote }
    }
}

impl Drop for AccountingGuard {
    fn drop(&mut self) {
        self.accounting.close(&self.remote);
    }
}
