//! Consistent-hash selection over a virtual-node ring.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::backend::Backend;
use crate::criteria::{Criterion, RequestContext};
use crate::hash::HashEngine;

/// Virtual nodes placed on the ring per backend. Enough replicas keep the
/// key space evenly split so a membership change only remaps the segments
/// owned by the leaving or joining backend.
const REPLICAS: usize = 100;

/// Candidates placed on a hash ring; selection walks clockwise from the
/// request key's position to the nearest candidate.
#[derive(Debug)]
pub struct ConsistentHash {
    engine: HashEngine,
    /// Ring position → backend identity.
    ring: RwLock<BTreeMap<u64, String>>,
}

impl ConsistentHash {
    pub fn new(engine: HashEngine) -> Self {
        Self {
            engine,
            ring: RwLock::new(BTreeMap::new()),
        }
    }

    fn place(&self, backends: &[Arc<Backend>]) -> BTreeMap<u64, String> {
        let mut ring = BTreeMap::new();
        for backend in backends {
            for replica in 0..REPLICAS {
                let position = self
                    .engine
                    .hash_str(&format!("{}-{}", backend.id(), replica))
                    .as_u64();
                ring.insert(position, backend.id().to_string());
            }
        }
        ring
    }

    /// Identity owning `key`'s position, wrapping past the ring end.
    fn owner(&self, key: &str) -> Option<String> {
        let position = self.engine.hash_str(key).as_u64();
        let ring = self.ring.read().expect("ring poisoned");
        ring.range(position..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, id)| id.clone())
    }
}

impl Criterion for ConsistentHash {
    fn select(&self, backends: &[Arc<Backend>], ctx: &RequestContext) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }
        if self.ring.read().expect("ring poisoned").is_empty() {
            // First selection before any membership event; build in place.
            self.rebuild(backends);
        }
        let owner = self.owner(&ctx.remote.ip_string())?;
        backends.iter().find(|b| b.id() == owner).cloned()
    }

    fn rebuild(&self, backends: &[Arc<Backend>]) {
        let ring = self.place(backends);
        *self.ring.write().expect("ring poisoned") = ring;
    }

    fn name(&self) -> &'static str {
        "ConsistentHash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::{backends, context};

    #[test]
    fn stable_mapping_for_same_key() {
        let criterion = ConsistentHash::new(HashEngine::default());
        let set = backends(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        criterion.rebuild(&set);
        let ctx = context([203, 0, 113, 9]);

        let first = criterion.select(&set, &ctx).unwrap();
        for _ in 0..10 {
            assert_eq!(criterion.select(&set, &ctx).unwrap().id(), first.id());
        }
    }

    #[test]
    fn removal_only_remaps_the_removed_segment() {
        let criterion = ConsistentHash::new(HashEngine::default());
        let set = backends(&[
            "10.0.0.1:80",
            "10.0.0.2:80",
            "10.0.0.3:80",
            "10.0.0.4:80",
        ]);
        criterion.rebuild(&set);

        let contexts: Vec<_> = (0..=255u8).map(|octet| context([203, 0, 113, octet])).collect();
        let before: Vec<String> = contexts
            .iter()
            .map(|ctx| criterion.select(&set, ctx).unwrap().id().to_string())
            .collect();

        let removed = "10.0.0.3:80";
        let shrunk: Vec<_> = set
            .iter()
            .filter(|b| b.id() != removed)
            .cloned()
            .collect();
        criterion.rebuild(&shrunk);

        for (ctx, owner) in contexts.iter().zip(&before) {
            let after = criterion.select(&shrunk, ctx).unwrap();
            if owner != removed {
                // Keys not owned by the removed backend keep their mapping.
                assert_eq!(after.id(), owner);
            } else {
                assert_ne!(after.id(), removed);
            }
        }
    }

    #[test]
    fn empty_set_yields_none() {
        let criterion = ConsistentHash::new(HashEngine::default());
        assert!(criterion.select(&[], &context([203, 0, 113, 9])).is_none());
    }
}
