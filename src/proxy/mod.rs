//! Proxy data plane.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → listener.rs (bounded accept, permit per connection)
//!     → server.rs (one HTTP/1.1 service per connection)
//!     → handler.rs (host resolution, selection, streaming, relay)
//!     → headers.rs (X-Forwarded-* rewrite, keep-alive decision)
//! ```

pub mod handler;
pub mod headers;
pub mod listener;
pub mod server;

pub use handler::ProxyService;
pub use listener::BoundedListener;
pub use server::ProxyServer;
