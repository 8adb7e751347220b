//! Integration tests for inbound sensor events
//!
//! These tests verify that:
//! - Events for unknown hosts are dropped
//! - Ingestion and polling write into the same history without interfering

use std::sync::Arc;

use host_monitoring::{
    HostStatus, Severity,
    mqtt::{AlertIngestor, IngestOutcome, SensorEvent},
    storage::AlertStore,
};

use crate::helpers::Pipeline;

#[tokio::test]
async fn test_event_for_unknown_host_creates_no_alert() {
    let p = Pipeline::new().await;
    p.host("known", "10.2.0.1", HostStatus::Up).await;
    let ingestor = AlertIngestor::new(p.backend.clone(), p.backend.clone());

    let outcome = ingestor
        .ingest(br#"{"host_id": 999, "status": "DOWN", "message": "unreachable"}"#)
        .await;

    assert_eq!(outcome, IngestOutcome::UnknownHost(999));
    assert!(p.backend.recent_alerts(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sensor_event_round_trips_through_the_bus_format() {
    let p = Pipeline::new().await;
    let host = p.host("router", "10.2.0.2", HostStatus::Up).await;
    let ingestor = AlertIngestor::new(p.backend.clone(), p.backend.clone());

    let event = SensorEvent {
        host_id: host.id,
        status: Some("DOWN".to_string()),
        message: "fan failure".to_string(),
    };
    let payload = serde_json::to_vec(&event).unwrap();

    assert!(matches!(
        ingestor.ingest(&payload).await,
        IngestOutcome::Stored { .. }
    ));

    let alerts = p.backend.alerts_for(host.id).await;
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].message, "[MQTT] fan failure");

    // Recorded only; the host keeps its polled status
    assert_eq!(p.status_of(host.id).await, HostStatus::Up);
}

#[tokio::test]
async fn test_ingestion_concurrent_with_polling() {
    let mut p = Pipeline::new().await;
    let host = p.host("switch", "10.2.0.3", HostStatus::Unknown).await;
    p.script.push("10.2.0.3", &[false, false, false, false, false]);

    let ingestor = Arc::new(AlertIngestor::new(p.backend.clone(), p.backend.clone()));
    let payload = format!(r#"{{"host_id": {}, "status": "UP", "message": "ping"}}"#, host.id);

    let ingest_task = {
        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                ingestor.ingest(payload.as_bytes()).await;
                tokio::task::yield_now().await;
            }
        })
    };

    p.cycles(5).await;
    ingest_task.await.unwrap();

    let alerts = p.backend.alerts_for(host.id).await;
    let polled: Vec<_> = alerts
        .iter()
        .filter(|alert| !alert.message.starts_with("[MQTT]"))
        .collect();
    let ingested = alerts.len() - polled.len();

    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].message, "Host is DOWN");
    assert_eq!(ingested, 20);
    assert_eq!(p.status_of(host.id).await, HostStatus::Down);
}
