//! Mobility REST API.
//!
//! POST /api/mobility/update          — accept a position update
//! GET  /api/mobility/position/{node} — current position
//! GET  /api/nodes                    — nodes with positions and radio info
//! GET  /health                       — 200 unless tearing down
//!
//! Updates are fire-and-forget: the handler validates, writes the shared
//! position snapshot, enqueues an event for the reactor, and answers 200.
//! Clients confirm by polling the position back.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sine_common::Position;

use crate::engine::Event;
use crate::model::Topology;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// ── State ───────────────────────────────────────────────────────────

/// Radio summary exposed on `/api/nodes`.
#[derive(Debug, Clone, Serialize)]
pub struct WirelessInfo {
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub tx_power_dbm: f64,
    pub antenna: String,
}

#[derive(Clone)]
pub struct ApiState {
    inner: Arc<Inner>,
}

struct Inner {
    events: mpsc::Sender<Event>,
    positions: Arc<DashMap<String, Position>>,
    /// Known nodes; wireless ones carry radio info.
    nodes: BTreeMap<String, Option<WirelessInfo>>,
    teardown: watch::Receiver<bool>,
}

impl ApiState {
    pub fn new(
        topology: &Topology,
        events: mpsc::Sender<Event>,
        positions: Arc<DashMap<String, Position>>,
        teardown: watch::Receiver<bool>,
    ) -> Self {
        let nodes = topology
            .nodes
            .iter()
            .map(|node| {
                let info = node.wireless().map(|w| WirelessInfo {
                    frequency_hz: w.radio.frequency_hz,
                    bandwidth_hz: w.radio.bandwidth_hz,
                    tx_power_dbm: w.radio.tx_power_dbm,
                    antenna: w.radio.antenna.to_string(),
                });
                (node.name.clone(), info)
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                events,
                positions,
                nodes,
                teardown,
            }),
        }
    }

    fn tearing_down(&self) -> bool {
        *self.inner.teardown.borrow()
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/mobility/update", post(update_position))
        .route("/api/mobility/position/{node}", get(get_position))
        .route("/api/nodes", get(list_nodes))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    node: String,
    x: f64,
    y: f64,
    z: f64,
}

async fn update_position(
    State(state): State<ApiState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.tearing_down() {
        return Err(ApiError::unavailable("orchestrator is shutting down"));
    }
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.to_string()))?;
    if !body.x.is_finite() || !body.y.is_finite() || !body.z.is_finite() {
        return Err(ApiError::bad_request("coordinates must be finite"));
    }

    let wireless = state
        .inner
        .nodes
        .get(&body.node)
        .ok_or_else(|| ApiError::not_found(format!("unknown node `{}`", body.node)))?;
    if wireless.is_none() {
        return Err(ApiError::bad_request(format!(
            "node `{}` has no wireless interface",
            body.node
        )));
    }

    state
        .inner
        .positions
        .insert(body.node.clone(), Position::new(body.x, body.y, body.z));
    state
        .inner
        .events
        .try_send(Event::PositionChanged {
            node: body.node.clone(),
        })
        .map_err(|_| ApiError::unavailable("event queue is full or closed"))?;

    tracing::debug!(node = %body.node, x = body.x, y = body.y, z = body.z, "position update accepted");
    Ok(Json(serde_json::json!({ "accepted": true })))
}

#[derive(Debug, Serialize)]
struct PositionResponse {
    node: String,
    x: f64,
    y: f64,
    z: f64,
}

async fn get_position(
    State(state): State<ApiState>,
    Path(node): Path<String>,
) -> Result<Json<PositionResponse>, ApiError> {
    if !state.inner.nodes.contains_key(&node) {
        return Err(ApiError::not_found(format!("unknown node `{node}`")));
    }
    let position = state
        .inner
        .positions
        .get(&node)
        .map(|entry| *entry.value())
        .ok_or_else(|| ApiError::not_found(format!("node `{node}` has no position")))?;
    Ok(Json(PositionResponse {
        node,
        x: position.x,
        y: position.y,
        z: position.z,
    }))
}

#[derive(Debug, Serialize)]
struct NodeEntry {
    node: String,
    position: Option<Position>,
    wireless: Option<WirelessInfo>,
}

async fn list_nodes(State(state): State<ApiState>) -> Json<Vec<NodeEntry>> {
    let entries = state
        .inner
        .nodes
        .iter()
        .map(|(name, info)| NodeEntry {
            node: name.clone(),
            position: state.inner.positions.get(name).map(|e| *e.value()),
            wireless: info.clone(),
        })
        .collect();
    Json(entries)
}

async fn health(State(state): State<ApiState>) -> Response {
    if state.tearing_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "tearing down").into_response()
    } else {
        (StatusCode::OK, "ok").into_response()
    }
}
