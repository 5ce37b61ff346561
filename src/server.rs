//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe, 200 once every managed kind has been listed
//!   and until shutdown begins
//!
//! The server starts before the Kubernetes client exists, so the watch sync
//! handle is attached later with [`ServerState::attach_sync`].

use crate::runtime::InitialSync;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// What `/readyz` reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The controller has not been initialized yet
    Starting,
    /// Waiting for the first list of these kinds
    Syncing(Vec<String>),
    Draining,
}

impl Readiness {
    fn status_code(&self) -> StatusCode {
        match self {
            Readiness::Ready => StatusCode::OK,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            Readiness::Ready => "ok".to_string(),
            Readiness::Starting => "starting".to_string(),
            Readiness::Syncing(kinds) => format!("waiting for initial list of {}", kinds.join(", ")),
            Readiness::Draining => "shutting down".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerState {
    sync: OnceLock<Arc<InitialSync>>,
    draining: AtomicBool,
}

impl ServerState {
    /// Tie readiness to the watches' first list
    pub fn attach_sync(&self, sync: Arc<InitialSync>) {
        if self.sync.set(sync).is_err() {
            error!("Watch sync handle attached twice, keeping the first");
        }
    }

    /// Report not ready from now on so traffic drains before exit
    pub fn mark_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        if self.draining.load(Ordering::Relaxed) {
            return Readiness::Draining;
        }
        match self.sync.get() {
            None => Readiness::Starting,
            Some(sync) if sync.is_synced() => Readiness::Ready,
            Some(sync) => Readiness::Syncing(
                sync.pending().iter().map(ToString::to_string).collect(),
            ),
        }
    }
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Encode every registered metric in the Prometheus text format
fn render_metrics() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&crate::observability::metrics::REGISTRY.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

async fn metrics_handler() -> impl IntoResponse {
    match render_metrics() {
        Ok((content_type, body)) => (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let readiness = state.readiness();
    (readiness.status_code(), readiness.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::key::ManagedKind;

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_not_ready_before_initialization() {
        let state = ServerState::default();
        assert_eq!(state.readiness(), Readiness::Starting);
    }

    #[tokio::test]
    async fn test_readyz_waits_for_every_kind_to_list() {
        let state = Arc::new(ServerState::default());
        let sync = Arc::new(InitialSync::new(&ManagedKind::ALL));
        state.attach_sync(Arc::clone(&sync));

        sync.mark_listed(ManagedKind::ArgoCluster);
        let response = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "waiting for initial list of ArgoNamespace");

        sync.mark_listed(ManagedKind::ArgoNamespace);
        let response = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_draining_overrides_sync() {
        let state = Arc::new(ServerState::default());
        state.attach_sync(Arc::new(InitialSync::new(&[])));
        assert_eq!(state.readiness(), Readiness::Ready);

        state.mark_draining();
        let response = readyz_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "shutting down");
    }

    #[tokio::test]
    async fn test_healthz_always_ok() {
        assert_eq!(healthz_handler().await.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_renders_text() {
        crate::observability::metrics::set_queue_depth(0);
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));
    }
}
