//! Per-request proxy pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → Host extraction (missing → log, drop connection)
//!     → Farm lookup (miss → 404) → backend set check (empty → 503)
//!     → sticky cache or criterion selection
//!     → session connect → header rewrite → body streaming
//!     → per-request timeout around the backend call (fire → 504)
//!     → response relayed back, status and bytes preserved
//! ```
//!
//! # Design Decisions
//! - The sticky cache lives in this per-connection service, so concurrent
//!   connections never observe each other's sticky state
//! - The timeout future is dropped on every exit path, which cancels the
//!   in-flight backend call

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{Request, Response, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use uuid::Uuid;

use crate::backend::{AccountingGuard, Backend, RemoteIdentity};
use crate::bus::QueueService;
use crate::criteria::RequestContext;
use crate::errors::RouterError;
use crate::farm::{Farm, VirtualHost};
use crate::observability::metrics;
use crate::proxy::headers::{host_of, is_http_keep_alive, rewrite_forwarding_headers};

/// Single-entry memo of the last (remote, host) → backend mapping.
#[derive(Debug)]
struct StickyRoute {
    remote: RemoteIdentity,
    host: String,
    backend: Arc<Backend>,
}

/// Pipeline instance owning one client connection.
#[derive(Debug)]
pub struct ProxyService {
    farm: Arc<Farm>,
    queue: Arc<dyn QueueService>,
    remote: RemoteIdentity,
    sticky: Mutex<Option<StickyRoute>>,
}

impl ProxyService {
    pub fn new(farm: Arc<Farm>, queue: Arc<dyn QueueService>, remote: RemoteIdentity) -> Self {
        Self {
            farm,
            queue,
            remote,
            sticky: Mutex::new(None),
        }
    }

    /// Drive one request through the pipeline. An `Err` drops the client
    /// connection without a response.
    pub async fn handle(&self, req: Request<Incoming>) -> Result<Response<Body>, RouterError> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let method = req.method().clone();

        let Some(host) = host_of(req.headers()) else {
            tracing::warn!(remote = %self.remote, "Request without Host header, dropping connection");
            return Err(RouterError::MissingHost);
        };

        tracing::debug!(
            request_id = %request_id,
            host = %host,
            method = %method,
            uri = %req.uri(),
            "Proxying request"
        );

        let Some(vhost) = self.farm.get_virtualhost(&host) else {
            tracing::warn!(request_id = %request_id, host = %host, "No virtual host for request");
            return Ok(self.finish(
                &RouterError::NotFound(host),
                &method,
                "none",
                start,
            ));
        };
        let settings = *vhost.settings();
        let keepalive = is_http_keep_alive(req.headers(), req.version());

        if !vhost.has_backends() {
            tracing::warn!(request_id = %request_id, host = %host, "Virtual host without backends");
            return Ok(self.finish(
                &RouterError::ServiceUnavailable(host),
                &method,
                "none",
                start,
            ));
        }

        let ctx = RequestContext {
            method: method.clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
            remote: self.remote.clone(),
        };

        let Some(backend) = self.route(&host, &vhost, &ctx) else {
            tracing::warn!(request_id = %request_id, host = %host, "Criterion produced no backend");
            return Ok(self.finish(
                &RouterError::ServiceUnavailable(host),
                &method,
                "none",
                start,
            ));
        };

        let client = backend.connect(&self.remote);
        let _accounting = AccountingGuard::new(backend.accounting().clone(), self.remote.clone());

        let (parts, body) = req.into_parts();

        let mut headers = parts.headers;
        rewrite_forwarding_headers(&mut headers, &self.remote.ip_string(), &host);
        // hyper frames the outbound body itself.
        headers.remove(TRANSFER_ENCODING);

        let outbound_body = if settings.chunked {
            Body::new(body)
        } else {
            let bytes = body
                .collect()
                .await
                .map_err(RouterError::ClientAbort)?
                .to_bytes();
            headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
            Body::from(bytes)
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = match format!("http://{}{}", backend.authority(), path_and_query).parse() {
            Ok(uri) => uri,
            Err(_) => {
                tracing::warn!(request_id = %request_id, backend = %backend.id(), "Unbuildable outbound URI");
                return Ok(self.finish(
                    &RouterError::ServiceUnavailable(host),
                    &method,
                    backend.id(),
                    start,
                ));
            }
        };

        let mut outbound = Request::builder()
            .method(method.clone())
            .uri(uri)
            .body(outbound_body)
            .expect("outbound request parts are valid");
        *outbound.headers_mut() = headers;

        match tokio::time::timeout(settings.request_timeout, client.request(outbound)).await {
            Err(_elapsed) => {
                tracing::warn!(
                    request_id = %request_id,
                    host = %host,
                    backend = %backend.id(),
                    timeout_ms = settings.request_timeout.as_millis() as u64,
                    "Backend response timed out"
                );
                Ok(self.finish(
                    &RouterError::GatewayTimeout(host),
                    &method,
                    backend.id(),
                    start,
                ))
            }
            Ok(Err(e)) => {
                self.queue.publish_backend_fail(backend.id());
                backend.accounting().publish_zero();
                let error = RouterError::BackendTransportFailure {
                    backend: backend.id().to_string(),
                    source: e,
                };
                tracing::error!(request_id = %request_id, host = %host, error = %error, "Outbound request failed");
                Ok(self.finish(&error, &method, backend.id(), start))
            }
            Ok(Ok(response)) => {
                let status = response.status();
                let (parts, body) = response.into_parts();
                let mut response = Response::from_parts(parts, Body::new(body));
                if !keepalive {
                    response
                        .headers_mut()
                        .insert(CONNECTION, HeaderValue::from_static("close"));
                }

                metrics::record_request(method.as_str(), status.as_u16(), backend.id(), start);
                if settings.access_log {
                    tracing::info!(
                        request_id = %request_id,
                        remote = %self.remote,
                        host = %host,
                        method = %method,
                        status = status.as_u16(),
                        backend = %backend.id(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Access"
                    );
                }
                Ok(response)
            }
        }
    }

    /// Sticky fast path: consecutive requests from the same remote to the
    /// same host reuse the cached backend without invoking the criterion.
    fn route(
        &self,
        host: &str,
        vhost: &VirtualHost,
        ctx: &RequestContext,
    ) -> Option<Arc<Backend>> {
        let mut sticky = self.sticky.lock().expect("sticky cache poisoned");
        if let Some(entry) = sticky.as_ref() {
            if entry.host == host && entry.remote == ctx.remote {
                return Some(entry.backend.clone());
            }
        }
        let backend = vhost.choose_backend(ctx)?;
        *sticky = Some(StickyRoute {
            remote: ctx.remote.clone(),
            host: host.to_string(),
            backend: backend.clone(),
        });
        Some(backend)
    }

    /// Build the error response for a failed request and record it. Every
    /// generated error carries an empty body and closes the connection.
    fn finish(
        &self,
        error: &RouterError,
        method: &axum::http::Method,
        backend: &str,
        start: Instant,
    ) -> Response<Body> {
        let status = error
            .status_code()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        metrics::record_request(method.as_str(), status.as_u16(), backend, start);
        error_response(status)
    }
}

/// Empty-body response with `Connection: close`.
pub fn error_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendProperties;
    use crate::bus::LogQueueService;
    use crate::criteria::test_support::context;
    use crate::farm::{FarmDefaults, VirtualHostSettings};

    fn service(farm: Arc<Farm>) -> ProxyService {
        ProxyService::new(
            farm,
            Arc::new(LogQueueService),
            RemoteIdentity::new([192, 168, 1, 50].into(), 50000),
        )
    }

    #[test]
    fn sticky_reuses_backend_for_same_remote_and_host() {
        let farm = Arc::new(Farm::new(FarmDefaults::default()));
        let vhost = farm
            .add_virtualhost("a.test", "RoundRobin", VirtualHostSettings::default())
            .unwrap();
        vhost
            .add_backend("10.0.0.1:80", BackendProperties::default())
            .unwrap();
        vhost
            .add_backend("10.0.0.2:80", BackendProperties::default())
            .unwrap();

        let service = service(farm);
        let mut ctx = context([192, 168, 1, 50]);
        ctx.remote = service.remote.clone();

        let first = service.route("a.test", &vhost, &ctx).unwrap();
        // RoundRobin would rotate; the sticky cache pins the first choice.
        for _ in 0..5 {
            assert_eq!(
                service.route("a.test", &vhost, &ctx).unwrap().id(),
                first.id()
            );
        }
    }

    #[test]
    fn sticky_invalidated_on_host_change() {
        let farm = Arc::new(Farm::new(FarmDefaults::default()));
        for host in ["a.test", "b.test"] {
            let vhost = farm
                .add_virtualhost(host, "RoundRobin", VirtualHostSettings::default())
                .unwrap();
            vhost
                .add_backend("10.0.0.1:80", BackendProperties::default())
                .unwrap();
        }
        let service = service(farm.clone());
        let mut ctx = context([192, 168, 1, 50]);
        ctx.remote = service.remote.clone();

        let a = farm.get_virtualhost("a.test").unwrap();
        let b = farm.get_virtualhost("b.test").unwrap();
        service.route("a.test", &a, &ctx).unwrap();
        service.route("b.test", &b, &ctx).unwrap();
        let sticky = service.sticky.lock().unwrap();
        assert_eq!(sticky.as_ref().unwrap().host, "b.test");
    }

    #[test]
    fn error_responses_are_empty_and_close() {
        let response = error_response(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONNECTION], "close");
    }
}
