//! Data-plane server: accept loop and per-connection services.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Serve each connection with its own pipeline instance (HTTP/1.1)
//! - Stop accepting on the shutdown signal
//!
//! One [`ProxyService`] per connection keeps the sticky route cache scoped
//! to that connection.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::bus::QueueService;
use crate::farm::Farm;
use crate::proxy::handler::ProxyService;
use crate::proxy::listener::BoundedListener;

/// The proxy data plane.
pub struct ProxyServer {
    farm: Arc<Farm>,
    queue: Arc<dyn QueueService>,
    max_connections: usize,
}

impl ProxyServer {
    pub fn new(farm: Arc<Farm>, queue: Arc<dyn QueueService>, max_connections: usize) -> Self {
        Self {
            farm,
            queue,
            max_connections,
        }
    }

    /// Run the accept loop until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        let listener = BoundedListener::new(listener, self.max_connections);

        tracing::info!(
            address = %local_addr,
            max_connections = self.max_connections,
            "Proxy server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    stream.set_nodelay(true).ok();

                    let service = Arc::new(ProxyService::new(
                        self.farm.clone(),
                        self.queue.clone(),
                        peer_addr.into(),
                    ));

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let connection = http1::Builder::new().serve_connection(
                            io,
                            service_fn(move |req| {
                                let service = service.clone();
                                async move { service.handle(req).await }
                            }),
                        );
                        if let Err(e) = connection.await {
                            tracing::debug!(peer_addr = %peer_addr, error = %e, "Connection ended with error");
                        }
                        drop(permit);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Proxy server received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}
