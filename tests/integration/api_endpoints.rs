//! Integration tests for the HTTP and WebSocket surface
//!
//! These tests verify that:
//! - The health endpoint reports inventory and subscriber counts
//! - A WebSocket client receives alerts once connected
//! - Closing the socket unsubscribes it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use host_monitoring::{
    Severity,
    alerts::AlertEmitter,
    api::{ApiState, HealthResponse, spawn_api_server},
    config::ApiSettings,
    hub::BroadcastHub,
    storage::{HostInventory, MemoryBackend, Storage},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::RecordingPublisher;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    backend: Arc<MemoryBackend>,
}

async fn spawn_test_api() -> TestServer {
    let backend = Arc::new(MemoryBackend::new());
    let hub = Arc::new(BroadcastHub::new());
    let state = ApiState::new(hub.clone(), Storage::from_backend(backend.clone()));

    let settings = ApiSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    let addr = spawn_api_server(&settings, state).await.unwrap();
    TestServer { addr, hub, backend }
}

async fn wait_for_subscribers(hub: &BroadcastHub, expected: usize) {
    for _ in 0..100 {
        if hub.subscriber_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {expected} subscribers, found {}",
        hub.subscriber_count().await
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = spawn_test_api().await;
    server.backend.register_host("a", "10.4.0.1").await.unwrap();
    server.backend.register_host("b", "10.4.0.2").await.unwrap();

    let response = reqwest::get(format!("http://{}/api/v1/health", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: HealthResponse = response.json().await.unwrap();
    assert_eq!(body.status, "ok");
    assert_eq!(body.hosts, 2);
    assert_eq!(body.subscribers, 0);
}

#[tokio::test]
async fn test_websocket_client_receives_alerts() {
    let server = spawn_test_api().await;
    let host = server.backend.register_host("web", "10.4.0.3").await.unwrap();

    let (mut socket, _) = connect_async(format!("ws://{}/ws/alerts", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.hub, 1).await;

    let emitter = AlertEmitter::new(
        server.backend.clone(),
        server.hub.clone(),
        Arc::new(RecordingPublisher::default()),
    );
    let report = emitter.emit(&host, Severity::Critical, "Host is DOWN").await;
    assert_eq!(report.broadcast, 1);

    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("no frame received")
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame.into_text().unwrap()).unwrap();

    assert_eq!(json["type"], "alert");
    assert_eq!(json["host_id"], host.id);
    assert_eq!(json["severity"], "CRITICAL");
    assert_eq!(json["message"], "Host is DOWN");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_closing_socket_unsubscribes() {
    let server = spawn_test_api().await;

    let (mut first, _) = connect_async(format!("ws://{}/ws/alerts", server.addr))
        .await
        .unwrap();
    let (_second, _) = connect_async(format!("ws://{}/ws/alerts", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&server.hub, 2).await;

    // Client chatter is ignored
    first.send(Message::Text("hello".to_string())).await.unwrap();
    first.close(None).await.unwrap();

    wait_for_subscribers(&server.hub, 1).await;

    let response: HealthResponse =
        reqwest::get(format!("http://{}/api/v1/health", server.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(response.subscribers, 1);
}
