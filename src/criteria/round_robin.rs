//! Round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::Backend;
use crate::criteria::{Criterion, RequestContext};

/// Cycles deterministically through the ordered candidate set.
/// State is the rotation counter, serialized by the atomic.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Criterion for RoundRobin {
    fn select(&self, backends: &[Arc<Backend>], _ctx: &RequestContext) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % backends.len();
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "RoundRobin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::test_support::{backends, context};

    #[test]
    fn cycles_in_order_and_wraps() {
        let criterion = RoundRobin::new();
        let set = backends(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        let ctx = context([192, 168, 0, 1]);

        let picks: Vec<String> = (0..6)
            .map(|_| criterion.select(&set, &ctx).unwrap().id().to_string())
            .collect();
        assert_eq!(
            picks,
            [
                "10.0.0.1:80",
                "10.0.0.2:80",
                "10.0.0.3:80",
                "10.0.0.1:80",
                "10.0.0.2:80",
                "10.0.0.3:80"
            ]
        );
    }

    #[test]
    fn empty_set_yields_none() {
        let criterion = RoundRobin::new();
        assert!(criterion.select(&[], &context([192, 168, 0, 1])).is_none());
    }
}
