//! Client ↔ server integration over a real socket.

use std::time::Duration;

use sine_channel::{server, AntennaSpec, ChannelClient, ChannelError, PathsRequest};
use sine_common::{Antenna, Position};

async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router()).await.unwrap();
    });
    format!("http://{addr}")
}

fn request() -> PathsRequest {
    PathsRequest {
        tx_position: Position::new(0.0, 0.0, 1.0),
        rx_position: Position::new(20.0, 0.0, 1.0),
        frequency_hz: 5.18e9,
        bandwidth_hz: 80e6,
        antenna: AntennaSpec {
            pattern: Antenna::Dipole,
        },
    }
}

#[tokio::test]
async fn fetches_paths_from_live_server() {
    let url = spawn_server().await;
    let client = ChannelClient::new(url, Duration::from_secs(5));
    assert!(client.healthy().await);

    let paths = client.paths(&request()).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].gain.norm_sqr() > 0.0);
    assert!(paths[0].delay_s > 0.0);
}

#[tokio::test]
async fn unreachable_server_is_typed() {
    // Nothing listens on this port.
    let client = ChannelClient::new("http://127.0.0.1:1", Duration::from_secs(1));
    assert!(!client.healthy().await);
    match client.paths(&request()).await {
        Err(ChannelError::Unreachable(_)) | Err(ChannelError::Timeout(_)) => {}
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_status_is_typed() {
    let url = spawn_server().await;
    let client = ChannelClient::new(url, Duration::from_secs(5));
    let mut bad = request();
    bad.frequency_hz = -1.0;
    match client.paths(&bad).await {
        Err(ChannelError::Status(code)) => assert_eq!(code.as_u16(), 400),
        other => panic!("expected status error, got {other:?}"),
    }
}
