//! Least-connections selection.

use std::sync::Arc;

use crate::backend::Backend;
use crate::criteria::{Criterion, RequestContext};

/// Returns the candidate with the minimum active-connection count.
/// Ties break to the first minimum in candidate order; that order is part
/// of the observable contract.
#[derive(Debug, Default)]
pub struct LeastConn;

impl LeastConn {
    pub fn new() -> Self {
        Self
    }
}

impl Criterion for LeastConn {
    fn select(&self, backends: &[Arc<Backend>], _ctx: &RequestContext) -> Option<Arc<Backend>> {
        backends
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
    }

    fn name(&self) -> &'static str {
        "LeastConn"
    }
}
