//! HTTP surface of the reference channel server.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::{freespace, PathsRequest, PathsResponse};

pub fn router() -> Router {
    Router::new()
        .route("/paths", post(paths))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn paths(Json(request): Json<PathsRequest>) -> Result<Json<PathsResponse>, (StatusCode, String)> {
    if request.frequency_hz <= 0.0 || request.bandwidth_hz <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "frequency_hz and bandwidth_hz must be positive".into(),
        ));
    }
    Ok(Json(freespace::trace(&request)))
}

async fn health() -> &'static str {
    "ok"
}

/// Run the channel server until the task is cancelled.
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "channel server listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
