//! Error taxonomy for the proxy pipeline.
//!
//! # Responsibilities
//! - Classify routing/session failures into a small closed set
//! - Map each failure to the client-facing HTTP status code
//!
//! # Design Decisions
//! - Errors that produce a response always carry an empty body and close
//!   the client connection
//! - A missing Host header produces no response at all; the connection is
//!   dropped before any virtual-host context exists

use axum::http::StatusCode;
use thiserror::Error;

/// Failures the pipeline can surface for a single request.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request carried no Host header. Logged and the connection is
    /// dropped without a response.
    #[error("request without Host header")]
    MissingHost,

    /// No virtual host matched the Host header.
    #[error("no virtual host for '{0}'")]
    NotFound(String),

    /// The virtual host has no backends, or no usable client handle could
    /// be obtained for the chosen backend.
    #[error("no backend available for '{0}'")]
    ServiceUnavailable(String),

    /// The per-request timer fired before backend response headers arrived.
    #[error("backend response timed out for '{0}'")]
    GatewayTimeout(String),

    /// The backend connection was obtained but failed at the transport
    /// level afterwards.
    #[error("backend {backend} transport failure: {source}")]
    BackendTransportFailure {
        backend: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The client connection failed while the request body was being read.
    /// Nothing can be answered; the connection is dropped.
    #[error("client aborted while sending the request body: {0}")]
    ClientAbort(#[source] hyper::Error),
}

impl RouterError {
    /// Client-facing status code for this failure, or `None` when the
    /// connection is dropped without a response.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            RouterError::MissingHost | RouterError::ClientAbort(_) => None,
            RouterError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            RouterError::ServiceUnavailable(_) => Some(StatusCode::SERVICE_UNAVAILABLE),
            RouterError::GatewayTimeout(_) => Some(StatusCode::GATEWAY_TIMEOUT),
            RouterError::BackendTransportFailure { source, .. } => {
                if source.is_connect() {
                    Some(StatusCode::SERVICE_UNAVAILABLE)
                } else {
                    Some(StatusCode::BAD_GATEWAY)
                }
            }
        }
    }
}
