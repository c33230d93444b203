//! Uniform random selection.

use std::sync::Arc;

use rand::Rng;

use crate::backend::Backend;
use crate::criteria::{Criterion, RequestContext};

/// Uniform pick among candidates. Stateless.
#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl Criterion for Random {
    fn select(&self, backends: &[Arc<Backend>], _ctx: &RequestContext) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..backends.len());
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "Random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::{backends, context};

    #[test]
    fn always_picks_from_the_set() {
        let criterion = Random::new();
        let set = backends(&["10.0.0.1:80", "10.0.0.2:80"]);
        let ctx = context([192, 168, 0, 1]);
        for _ in 0..50 {
            let pick = criterion.select(&set, &ctx).unwrap();
            assert!(set.iter().any(|b| b.id() == pick.id()));
        }
    }

    #[test]
    fn empty_set_yields_none() {
        let criterion = Random::new();
        assert!(criterion.select(&[], &context([192, 168, 0, 1])).is_none());
    }
}
