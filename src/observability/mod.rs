//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline/session/accounting events
//!     → metrics.rs (counters, gauges, histograms)
//!     → Prometheus exposition endpoint
//! tracing spans/events
//!     → subscriber configured at startup (EnvFilter + fmt)
//! ```

pub mod metrics;
