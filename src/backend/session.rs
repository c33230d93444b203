//! Pooled outbound client session for one backend.
//!
//! # Responsibilities
//! - Lazily create and reuse the pooled HTTP client handle
//! - Enforce keep-alive expiry by request count and by elapsed time
//! - Run the periodic eviction check without overlapping an explicit close
//!
//! # Design Decisions
//! - `is_keep_alive_limit` doubles as the per-request tick: calling it
//!   counts a request and may reset the cycle
//! - The eviction tick and `close` are serialized by an atomic
//!   compare-and-set; a trigger that loses the race is dropped, not queued
//! - `close` is idempotent

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::task::JoinHandle;

use crate::backend::accounting::{ConnectionAccounting, RemoteIdentity};

/// Outbound client handle type shared by the session and the pipeline.
pub type HttpClient = Client<HttpConnector, Body>;

/// Interval between keep-alive limit checks.
const EVICTION_PERIOD: Duration = Duration::from_millis(1000);

/// Keep-alive policy for one backend session.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlivePolicy {
    /// Whether the outbound client keeps connections alive at all.
    pub enabled: bool,
    /// Requests after which the session is rotated.
    pub max_requests: u64,
    /// Elapsed time after which the session is rotated.
    pub timeout: Duration,
    /// Idle connections kept per backend by the pooled client.
    pub max_pool_size: usize,
}

impl Default for KeepAlivePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: u64::MAX,
            timeout: Duration::from_millis(86_400_000),
            max_pool_size: 1,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    client: Option<HttpClient>,
    request_count: u64,
    keep_alive_mark: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            client: None,
            request_count: 0,
            keep_alive_mark: Instant::now(),
        }
    }

    /// The per-request tick. Increments the request counter (saturating)
    /// and returns true, resetting counter and time mark, when either
    /// limit is reached.
    fn keep_alive_limit_reached(&mut self, policy: &KeepAlivePolicy) -> bool {
        let now = Instant::now();
        if self.request_count < policy.max_requests {
            self.request_count += 1;
        }
        if self.request_count == u64::MAX
            || self.request_count >= policy.max_requests
            || now.duration_since(self.keep_alive_mark) > policy.timeout
        {
            self.keep_alive_mark = now;
            self.request_count = 0;
            return true;
        }
        false
    }
}

/// The pooled, keep-alive-managed connection state to one backend.
///
/// State machine: Unconnected -> Connected -> (Evicting) -> Unconnected.
#[derive(Debug)]
pub struct BackendSession {
    backend_id: String,
    policy: KeepAlivePolicy,
    state: Mutex<SessionState>,
    /// Single-owner flag serializing the eviction tick and explicit close.
    evicting: AtomicBool,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
    accounting: Arc<ConnectionAccounting>,
}

impl BackendSession {
    pub fn new(backend_id: impl Into<String>, policy: KeepAlivePolicy) -> Self {
        let backend_id = backend_id.into();
        Self {
            accounting: Arc::new(ConnectionAccounting::new(backend_id.clone())),
            backend_id,
            policy,
            state: Mutex::new(SessionState::new()),
            evicting: AtomicBool::new(false),
            eviction_task: Mutex::new(None),
        }
    }

    pub fn accounting(&self) -> &Arc<ConnectionAccounting> {
        &self.accounting
    }

    /// Obtain the pooled client handle, creating it on first use, and
    /// register `remote` with the accounting. Counts as one request
    /// against the keep-alive limit; a session at its limit is rotated
    /// (closed and recreated) here.
    pub fn connect(self: &Arc<Self>, remote: &RemoteIdentity) -> HttpClient {
        if self.policy.enabled {
            self.ensure_eviction_task();
        }

        let client = {
            let mut state = self.state.lock().expect("session state poisoned");
            if state.keep_alive_limit_reached(&self.policy) && state.client.is_some() {
                tracing::debug!(backend = %self.backend_id, "Keep-alive limit reached, rotating session");
                state.client = None;
                self.accounting.clear();
            }
            state
                .client
                .get_or_insert_with(|| {
                    tracing::debug!(backend = %self.backend_id, "Creating outbound client");
                    build_client(&self.policy)
                })
                .clone()
        };

        if self.accounting.open(remote) {
            metrics::counter!(
                "gannet_backend_sessions_total",
                "backend" => self.backend_id.clone()
            )
            .increment(1);
        }
        client
    }

    /// The per-request tick, exposed for the eviction task. Not free of
    /// state mutation: every call counts as a request.
    pub fn is_keep_alive_limit(&self) -> bool {
        self.state
            .lock()
            .expect("session state poisoned")
            .keep_alive_limit_reached(&self.policy)
    }

    /// True when no usable client handle exists.
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .expect("session state poisoned")
            .client
            .is_none()
    }

    /// Cancel the eviction task, clear accounting, discard the handle.
    /// Idempotent; a close racing the eviction tick is dropped.
    pub fn close(&self) {
        if self
            .evicting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.close_owned();
        self.evicting.store(false, Ordering::Release);
    }

    /// The close body, entered only while holding the `evicting` flag.
    fn close_owned(&self) {
        if let Some(task) = self
            .eviction_task
            .lock()
            .expect("eviction slot poisoned")
            .take()
        {
            task.abort();
        }
        self.accounting.clear();
        let mut state = self.state.lock().expect("session state poisoned");
        if state.client.take().is_some() {
            tracing::debug!(backend = %self.backend_id, "Session closed");
        }
    }

    fn ensure_eviction_task(self: &Arc<Self>) {
        let mut slot = self.eviction_task.lock().expect("eviction slot poisoned");
        if slot.is_some() {
            return;
        }
        let session = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately; skip it so the first real
            // check happens one period after connect.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session
                    .evicting
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
                if session.is_keep_alive_limit() && !session.is_closed() {
                    session.close_owned();
                }
                session.evicting.store(false, Ordering::Release);
            }
        }));
    }
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        if let Some(task) = self
            .eviction_task
            .lock()
            .expect("eviction slot poisoned")
            .take()
        {
            task.abort();
        }
    }
}

fn build_client(policy: &KeepAlivePolicy) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    connector.set_keepalive(policy.enabled.then(|| Duration::from_secs(60)));

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(if policy.enabled {
            policy.max_pool_size
        } else {
            0
        })
        .pool_idle_timeout(Duration::from_secs(90))
        .build(connector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn remote() -> RemoteIdentity {
        RemoteIdentity::new(IpAddr::from([127, 0, 0, 1]), 4000)
    }

    fn session(policy: KeepAlivePolicy) -> Arc<BackendSession> {
        Arc::new(BackendSession::new("127.0.0.1:9000", policy))
    }

    #[test]
    fn limit_reached_exactly_at_max_requests() {
        let session = BackendSession::new(
            "127.0.0.1:9000",
            KeepAlivePolicy {
                max_requests: 3,
                ..KeepAlivePolicy::default()
            },
        );
        assert!(!session.is_keep_alive_limit());
        assert!(!session.is_keep_alive_limit());
        assert!(session.is_keep_alive_limit());
        // The cycle restarts after the reset.
        assert!(!session.is_keep_alive_limit());
        assert!(!session.is_keep_alive_limit());
        assert!(session.is_keep_alive_limit());
    }

    #[test]
    fn limit_reached_after_timeout_elapsed() {
        let session = BackendSession::new(
            "127.0.0.1:9000",
            KeepAlivePolicy {
                timeout: Duration::from_millis(0),
                ..KeepAlivePolicy::default()
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(session.is_keep_alive_limit());
    }

    #[tokio::test]
    async fn connect_creates_handle_lazily_and_close_discards_it() {
        let session = session(KeepAlivePolicy::default());
        assert!(session.is_closed());

        session.connect(&remote());
        assert!(!session.is_closed());
        assert_eq!(session.accounting().active_count(), 1);

        session.close();
        assert!(session.is_closed());
        assert_eq!(session.accounting().active_count(), 0);

        // Idempotent.
        session.close();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn rotation_at_limit_recreates_handle() {
        let session = session(KeepAlivePolicy {
            max_requests: 2,
            ..KeepAlivePolicy::default()
        });
        session.connect(&remote());
        // Second connect trips the limit; the session rotates but still
        // hands back a usable client.
        session.connect(&remote());
        assert!(!session.is_closed());
        assert_eq!(session.accounting().active_count(), 1);
    }
}
