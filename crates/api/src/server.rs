//! Router assembly and server lifecycle.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::middleware::logging;
use crate::routes;
use crate::state::AppState;

/// Upper bound on an inbound request body (webhook batches included).
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/firecrawl", post(routes::webhooks::receive_webhook))
        .route("/query", post(routes::query::query))
        .route("/graph/search", post(routes::query::graph_search))
        .route("/graph/entities/search", get(routes::graph::search_entities))
        .route(
            "/graph/entities/:id/connections",
            get(routes::graph::entity_connections),
        )
        .route("/health", get(routes::health::health))
        // Completed-crawl batches can be large; the axum default of 2MB
        // would reject them before validation runs.
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(logging::logging_middleware))
        .layer(logging::get_tracing_layer())
        .with_state(state)
}

pub struct GraphragServer {
    state: AppState,
}

impl GraphragServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until SIGINT, then drain background work before returning.
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(addr, "GraphRAG server listening");

        let router = build_router(self.state.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("HTTP server stopped; draining ingest queue");
        self.state.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Background page processing is tied to process lifetime, not to any
    // request: only this signal starts the teardown.
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
