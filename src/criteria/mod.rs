//! Backend selection criteria.
//!
//! # Data Flow
//! ```text
//! VirtualHost.choose_backend(context)
//!     → criterion.select(ordered backends, request context)
//!         - round_robin.rs (cycle through the set)
//!         - random.rs (uniform pick)
//!         - least_conn.rs (fewest active connections, first wins ties)
//!         - ip_hash.rs (client IP fingerprint modulo set size)
//!         - consistent_hash.rs (ring walk, membership-stable)
//!     → Some(backend) or None on an empty set
//! ```
//!
//! # Design Decisions
//! - Closed dispatch over the known kinds; configuration names resolve
//!   through [`from_name`] and unknown names fall back to RoundRobin
//! - Criteria keep interior state (atomics, ring) so selection takes
//!   `&self`; registry mutation calls [`Criterion::rebuild`]

pub mod consistent_hash;
pub mod ip_hash;
pub mod least_conn;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};

use crate::backend::{Backend, RemoteIdentity};
use crate::hash::HashEngine;

pub use consistent_hash::ConsistentHash;
pub use ip_hash::IpHash;
pub use least_conn::LeastConn;
pub use random::Random;
pub use round_robin::RoundRobin;

/// Criterion used when a configuration name is unknown, blank or missing.
pub const DEFAULT_CRITERION: &str = "RoundRobin";

/// The only request state visible to a selection criterion.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote: RemoteIdentity,
}

/// Pluggable backend-choice algorithm.
pub trait Criterion: Send + Sync + std::fmt::Debug {
    /// Pick one backend from the ordered candidate set, or `None` when the
    /// set is empty.
    fn select(&self, backends: &[Arc<Backend>], ctx: &RequestContext) -> Option<Arc<Backend>>;

    /// Membership-change hook; criteria with derived state (the consistent
    /// hash ring) refresh it here. Called by the registry, never by the
    /// pipeline.
    fn rebuild(&self, _backends: &[Arc<Backend>]) {}

    fn name(&self) -> &'static str;
}

/// Resolve a criterion by configuration name. Unknown names fall back to
/// the default instead of failing.
pub fn from_name(name: &str, engine: HashEngine) -> Box<dyn Criterion> {
    match name {
        "RoundRobin" => Box::new(RoundRobin::new()),
        "Random" => Box::new(Random::new()),
        "LeastConn" => Box::new(LeastConn::new()),
        "IPHash" => Box::new(IpHash::new(engine)),
        "ConsistentHash" => Box::new(ConsistentHash::new(engine)),
        other => {
            if !other.is_empty() {
                tracing::warn!(criterion = %other, "Unknown load-balance criterion, using default");
            }
            Box::new(RoundRobin::new())
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_builds_the_default() {
        let engine = HashEngine::default();
        assert_eq!(from_name("Invalid Class", engine).name(), DEFAULT_CRITERION);
        assert_eq!(from_name("", engine).name(), DEFAULT_CRITERION);
    }

    #[test]
    fn known_names_build_their_criterion() {
        let engine = HashEngine::default();
        for name in ["RoundRobin", "Random", "LeastConn", "IPHash", "ConsistentHash"] {
            assert_eq!(from_name(name, engine).name(), name);
        }
    }
}
