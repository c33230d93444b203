//! Header rewriting for the outbound leg.
//!
//! # Responsibilities
//! - Extract the routing host from the Host header
//! - Set/append the X-Forwarded-* family before forwarding
//! - Decide client-facing keep-alive from the inbound request

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use axum::http::Version;

const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const FORWARDED_FOR: HeaderName = HeaderName::from_static("forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Host header value with any `:port` suffix stripped, or `None` when the
/// header is missing or unreadable.
pub fn host_of(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(HOST)?.to_str().ok()?;
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Rewrite the forwarding headers in place before the outbound request:
/// X-Real-IP set if absent, X-Forwarded-For and Forwarded-For appended,
/// X-Forwarded-Host and X-Forwarded-Proto set if absent, and Connection
/// forced to keep-alive regardless of the inbound value.
pub fn rewrite_forwarding_headers(headers: &mut HeaderMap, remote_ip: &str, header_host: &str) {
    if !headers.contains_key(&X_REAL_IP) {
        if let Ok(value) = HeaderValue::from_str(remote_ip) {
            headers.insert(X_REAL_IP, value);
        }
    }

    append_forwarded(headers, X_FORWARDED_FOR, remote_ip);
    append_forwarded(headers, FORWARDED_FOR, remote_ip);

    if !headers.contains_key(&X_FORWARDED_HOST) {
        if let Ok(value) = HeaderValue::from_str(header_host) {
            headers.insert(X_FORWARDED_HOST, value);
        }
    }

    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }

    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
}

fn append_forwarded(headers: &mut HeaderMap, name: HeaderName, remote_ip: &str) {
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, remote_ip),
        None => remote_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Client-facing keep-alive decision: an explicit Connection header other
/// than `close` keeps the connection; absent it defaults by HTTP version.
pub fn is_http_keep_alive(headers: &HeaderMap, version: Version) -> bool {
    match headers.get(CONNECTION).and_then(|v| v.to_str().ok()) {
        Some(value) => !value.eq_ignore_ascii_case("close"),
        None => version == Version::HTTP_11,
    }
}
