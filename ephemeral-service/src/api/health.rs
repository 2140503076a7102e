//! `/health` endpoint.
//!
//! The endpoint includes a `Cache-Control: no-cache` header to prevent
//! caching of responses.

use std::sync::Arc;

use axum::http::{HeaderValue, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::Engine;
use crate::services::workspace_manager::now_ms;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_ms: i64,
    version: &'static str,
    workspaces: usize,
    participants: usize,
}

/// Creates a router containing the `/health` endpoint.
pub(crate) fn routes(engine: Arc<Engine>) -> Router {
    Router::new().route("/health", get(move || health(engine))).layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    ))
}

async fn health(engine: Arc<Engine>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp_ms: now_ms(),
        version: env!("CARGO_PKG_VERSION"),
        workspaces: engine.workspace_manager.active_workspace_count(),
        participants: engine.participant_manager.total_participant_count(),
    })
}
