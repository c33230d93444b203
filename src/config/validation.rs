//! Configuration validation.
//!
//! Semantic checks on a parsed configuration, separate from the syntactic
//! checks serde already performs.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check the configuration; all problems are collected, not just the first.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "listener.bind_address '{}' is not a socket address",
            config.listener.bind_address
        )));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError(
            "listener.max_connections must be at least 1".to_string(),
        ));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "admin.bind_address '{}' is not a socket address",
            config.admin.bind_address
        )));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError(format!(
            "observability.metrics_address '{}' is not a socket address",
            config.observability.metrics_address
        )));
    }

    let mut seen_hosts = HashSet::new();
    for vhost in &config.virtualhosts {
        if vhost.host.is_empty() {
            errors.push(ValidationError("virtualhost with empty host".to_string()));
        }
        if !seen_hosts.insert(vhost.host.clone()) {
            errors.push(ValidationError(format!(
                "duplicate virtualhost '{}'",
                vhost.host
            )));
        }
        for backend in &vhost.backends {
            let valid = match backend.split_once(':') {
                Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
                None => false,
            };
            if !valid {
                errors.push(ValidationError(format!(
                    "backend '{}' of '{}' is not host:port",
                    backend, vhost.host
                )));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
