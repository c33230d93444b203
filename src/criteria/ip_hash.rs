//! Client-IP hash selection.

use std::sync::Arc;

use crate::backend::Backend;
use crate::criteria::{Criterion, RequestContext};
use crate::hash::HashEngine;

/// Fingerprint of the client IP modulo candidate count. The same client
/// maps to the same backend while the candidate set is unchanged;
/// membership changes may reshuffle every mapping. ConsistentHash is the
/// criterion that bounds remapping.
#[derive(Debug)]
pub struct IpHash {
    engine: HashEngine,
}

impl IpHash {
    pub fn new(engine: HashEngine) -> Self {
        Self { engine }
    }
}

impl Criterion for IpHash {
    fn select(&self, backends: &[Arc<Backend>], ctx: &RequestContext) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }
        let fingerprint = self.engine.hash_str(&ctx.remote.ip_string());
        let index = (fingerprint.as_u64() % backends.len() as u64) as usize;
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "IPHash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::{backends, context};

    #[test]
    fn same_client_same_backend() {
        let criterion = IpHash::new(HashEngine::default());
        let set = backends(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        let ctx = context([203, 0, 113, 7]);

        let first = criterion.select(&set, &ctx).unwrap();
        for _ in 0..20 {
            assert_eq!(criterion.select(&set, &ctx).unwrap().id(), first.id());
        }
    }

    #[test]
    fn port_does_not_affect_mapping() {
        let criterion = IpHash::new(HashEngine::default());
        let set = backends(&["10.0.0.1:80", "10.0.0.2:80"]);
        let mut a = context([203, 0, 113, 7]);
        let mut b = context([203, 0, 113, 7]);
        a.remote.port = 1111;
        b.remote.port = 2222;
        assert_eq!(
            criterion.select(&set, &a).unwrap().id(),
            criterion.select(&set, &b).unwrap().id()
        );
    }

    #[test]
    fn empty_set_yields_none() {
        let criterion = IpHash::new(HashEngine::default());
        assert!(criterion.select(&[], &context([203, 0, 113, 7])).is_none());
    }
}
