//! Read-only admin API.
//!
//! Exposes the registry as JSON: `GET /version`, `GET /farm`,
//! `GET /virtualhost/{id}`, `GET /backend/{id}`. Mutation is not served
//! here; it flows through the control-plane bus.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::farm::Farm;

/// State injected into the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub farm: Arc<Farm>,
}

/// Build the admin router.
pub fn admin_router(farm: Arc<Farm>) -> Router {
    Router::new()
        .route("/version", get(handlers::get_version))
        .route("/farm", get(handlers::get_farm))
        .route("/virtualhost/{id}", get(handlers::get_virtualhost))
        .route("/backend/{id}", get(handlers::get_backend))
        .with_state(AdminState { farm })
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(
    farm: Arc<Farm>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API starting");

    axum::serve(listener, admin_router(farm))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
