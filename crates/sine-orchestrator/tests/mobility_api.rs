//! Mobility API tests through axum's tower service interface (no TCP).

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use dashmap::DashMap;
use http_body_util::BodyExt;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

use sine_orchestrator::api::{router, ApiState};
use sine_orchestrator::engine::Event;
use sine_orchestrator::model::Topology;

fn topology() -> Topology {
    let yaml = r#"
topology:
  shared_bridge:
    nodes: [n1, n2, wired]
  nodes:
    n1:
      interfaces:
        eth1: {ip_address: 10.0.0.1/24, wireless: {position: {x: 0, y: 0, z: 1}}}
    n2:
      interfaces:
        eth1: {ip_address: 10.0.0.2/24, wireless: {position: {x: 20, y: 0, z: 1}}}
    wired:
      interfaces:
        eth1: {ip_address: 10.0.0.3/24, fixed_netem: {delay_ms: 5}}
"#;
    let file = serde_yaml::from_str(yaml).unwrap();
    Topology::resolve(file, "lab", Path::new(".")).unwrap()
}

struct Harness {
    app: axum::Router,
    events: mpsc::Receiver<Event>,
    teardown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let topo = topology();
    let (tx, rx) = mpsc::channel(16);
    let (teardown_tx, teardown_rx) = watch::channel(false);
    let positions = Arc::new(DashMap::new());
    for node in &topo.nodes {
        if let Some(w) = node.wireless() {
            positions.insert(node.name.clone(), w.position);
        }
    }
    let state = ApiState::new(&topo, tx, positions, teardown_rx);
    Harness {
        app: router(state),
        events: rx,
        teardown: teardown_tx,
    }
}

fn post_update(body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri("/api/mobility/update")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn update_accepts_and_enqueues() {
    let mut h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(post_update(
            serde_json::json!({"node": "n2", "x": 42.0, "y": 1.0, "z": 1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["accepted"], serde_json::json!(true));

    assert_eq!(
        h.events.recv().await,
        Some(Event::PositionChanged { node: "n2".into() })
    );

    // The snapshot reflects the update immediately.
    let resp = h
        .app
        .clone()
        .oneshot(get("/api/mobility/position/n2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["x"], serde_json::json!(42.0));
}

#[tokio::test]
async fn unknown_node_is_404() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(post_update(
            serde_json::json!({"node": "ghost", "x": 0.0, "y": 0.0, "z": 0.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .app
        .oneshot(get("/api/mobility/position/ghost"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_wireless_node_is_400() {
    let h = harness();
    let resp = h
        .app
        .oneshot(post_update(
            serde_json::json!({"node": "wired", "x": 0.0, "y": 0.0, "z": 0.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let h = harness();
    let req = axum::http::Request::builder()
        .uri("/api/mobility/update")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from("{\"node\": \"n1\""))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .app
        .oneshot(post_update(serde_json::json!({"node": "n1", "x": 1.0})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn teardown_refuses_updates() {
    let h = harness();
    h.teardown.send(true).unwrap();

    let resp = h
        .app
        .clone()
        .oneshot(post_update(
            serde_json::json!({"node": "n1", "x": 0.0, "y": 0.0, "z": 0.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = h.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_and_node_listing() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h.app.oneshot(get("/api/nodes")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let nodes: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(nodes.len(), 3);
    let n1 = nodes.iter().find(|n| n["node"] == "n1").unwrap();
    assert_eq!(n1["wireless"]["frequency_hz"], serde_json::json!(5.18e9));
    let wired = nodes.iter().find(|n| n["node"] == "wired").unwrap();
    assert!(wired["wireless"].is_null());
}
