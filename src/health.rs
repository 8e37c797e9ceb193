// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Liveness and metrics HTTP endpoints.
//!
//! - `GET /healthz`: `503` until the controller's main loop has started, `200 ok` after
//! - `GET /metrics`: Prometheus text exposition of [`crate::metrics::METRICS_REGISTRY`]

use crate::constants::{HEALTHZ_PATH, METRICS_PATH};
use crate::metrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared flag flipped once the main loop runs.
#[derive(Clone, Debug, Default)]
pub struct HealthState {
    started: Arc<AtomicBool>,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Build the health router.
pub fn health_routes(state: HealthState) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.is_started() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the health router on `0.0.0.0:<port>` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve_health(
    port: u16,
    state: HealthState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health server started");

    axum::serve(listener, health_routes(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Health server stopped");
    Ok(())
}
