//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → farm seeding + subsystem settings at startup
//! ```
//!
//! # Design Decisions
//! - The file only seeds the registry; live changes arrive through the
//!   control-plane bus, not by re-reading the file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RoutingDefaults,
    SessionConfig, VirtualHostConfig,
};
