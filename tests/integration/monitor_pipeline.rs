//! End-to-end tests of the polling cycle
//!
//! These tests verify that:
//! - Transitions reach the store, the hub and the publisher
//! - Flapping hosts stay quiet
//! - A failing sink never blocks the others
//! - Slow probes and vanishing hosts do not stall the cycle

use std::sync::Arc;
use std::time::{Duration, Instant};

use host_monitoring::{
    HostStatus, Severity,
    actors::HostMonitor,
    alerts::AlertEmitter,
    config::MonitorConfig,
    hub::BroadcastHub,
    monitors::probe::Prober,
    mqtt::MqttPublisher,
    storage::{HostInventory, MemoryBackend},
};
use pretty_assertions::assert_eq;

use crate::helpers::{
    BrokenSubscriber, HangingTactic, Pipeline, RecordingPublisher, RecordingSubscriber,
    VanishingInventory,
};

#[tokio::test]
async fn test_outage_and_recovery_reach_every_sink() {
    let mut p = Pipeline::new().await;
    let host = p.host("web", "10.1.0.1", HostStatus::Up).await;
    p.script.push("10.1.0.1", &[false, false, false, true]);

    p.cycles(2).await;
    assert!(p.subscriber.received.lock().await.is_empty());
    assert_eq!(p.publisher.calls(), 0);

    p.cycles(1).await;
    assert_eq!(p.status_of(host.id).await, HostStatus::Down);

    p.cycles(1).await;
    assert_eq!(p.status_of(host.id).await, HostStatus::Up);

    let stored: Vec<(Severity, String)> = p
        .backend
        .alerts_for(host.id)
        .await
        .into_iter()
        .map(|alert| (alert.severity, alert.message))
        .collect();
    assert_eq!(
        stored,
        vec![
            (Severity::Critical, "Host is DOWN".to_string()),
            (Severity::Info, "Host recovered (UP)".to_string()),
        ]
    );

    let messages = p.subscriber.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["type"], "alert");
    assert_eq!(messages[0]["host_id"], host.id);
    assert_eq!(messages[0]["host_name"], "web");
    assert_eq!(messages[0]["severity"], "CRITICAL");
    assert_eq!(messages[1]["message"], "Host recovered (UP)");

    let events = p.publisher.events.lock().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].severity, Severity::Critical);
    assert_eq!(events[1].severity, Severity::Info);
}

#[tokio::test]
async fn test_flapping_host_emits_nothing() {
    let mut p = Pipeline::new().await;
    let host = p.host("flaky", "10.1.0.2", HostStatus::Up).await;
    p.script
        .push("10.1.0.2", &[false, true, false, false, true, false, false, true]);

    p.cycles(8).await;

    assert_eq!(p.status_of(host.id).await, HostStatus::Up);
    assert!(p.backend.alerts().await.is_empty());
    assert!(p.subscriber.received.lock().await.is_empty());
    assert_eq!(p.publisher.calls(), 0);
}

#[tokio::test]
async fn test_first_observation_decides_unknown_hosts() {
    let mut p = Pipeline::new().await;
    let up = p.host("fresh-up", "10.1.0.3", HostStatus::Unknown).await;
    let down = p.host("fresh-down", "10.1.0.4", HostStatus::Unknown).await;
    p.script.push("10.1.0.3", &[true]);
    p.script.push("10.1.0.4", &[false]);

    let report = p.monitor.run_cycle().await.unwrap();

    assert_eq!(report.transitions.len(), 2);
    assert_eq!(p.status_of(up.id).await, HostStatus::Up);
    assert_eq!(p.status_of(down.id).await, HostStatus::Down);
    assert_eq!(p.backend.alerts_for(up.id).await[0].message, "Host is UP");
    assert_eq!(p.backend.alerts_for(down.id).await[0].message, "Host is DOWN");
}

#[tokio::test]
async fn test_failing_publisher_does_not_block_store_or_hub() {
    let mut p = Pipeline::with_publisher(Arc::new(RecordingPublisher::failing())).await;
    let host = p.host("db", "10.1.0.5", HostStatus::Unknown).await;
    p.script.push("10.1.0.5", &[false]);

    p.cycles(1).await;

    assert_eq!(p.status_of(host.id).await, HostStatus::Down);
    assert_eq!(p.backend.alerts_for(host.id).await.len(), 1);
    assert_eq!(p.subscriber.received.lock().await.len(), 1);
    assert_eq!(p.publisher.calls(), 1);
}

#[tokio::test]
async fn test_broken_subscriber_is_pruned_without_affecting_others() {
    let mut p = Pipeline::new().await;
    p.hub.subscribe(Arc::new(BrokenSubscriber)).await;
    let second = Arc::new(RecordingSubscriber::default());
    p.hub.subscribe(second.clone()).await;
    assert_eq!(p.hub.subscriber_count().await, 3);

    let host = p.host("cache", "10.1.0.6", HostStatus::Unknown).await;
    p.script.push("10.1.0.6", &[true]);
    p.cycles(1).await;

    assert_eq!(p.hub.subscriber_count().await, 2);
    assert_eq!(p.subscriber.received.lock().await.len(), 1);
    assert_eq!(second.received.lock().await.len(), 1);
    assert_eq!(p.publisher.calls(), 1);
    assert_eq!(p.backend.alerts_for(host.id).await.len(), 1);
}

#[tokio::test]
async fn test_disconnected_broker_still_records_and_broadcasts() {
    let backend = Arc::new(MemoryBackend::new());
    let hub = Arc::new(BroadcastHub::new());
    let subscriber = Arc::new(RecordingSubscriber::default());
    hub.subscribe(subscriber.clone()).await;

    let script = Arc::new(crate::helpers::ScriptedTactic::default());
    let publisher = Arc::new(MqttPublisher::new("monitoring/events"));
    let emitter = AlertEmitter::new(backend.clone(), hub, publisher.clone());
    let mut monitor = HostMonitor::new(
        &MonitorConfig::default(),
        backend.clone(),
        Prober::new(vec![script.clone()]),
        emitter,
    );

    let host = backend.register_host("edge", "10.1.0.7").await.unwrap();
    script.push("10.1.0.7", &[false]);

    monitor.run_cycle().await.unwrap();

    assert!(!publisher.is_connected());
    assert_eq!(backend.host(host.id).await.unwrap().status, HostStatus::Down);
    assert_eq!(backend.alerts_for(host.id).await.len(), 1);
    assert_eq!(subscriber.received.lock().await.len(), 1);
}

#[tokio::test]
async fn test_hanging_probe_is_bounded_and_isolated() {
    let backend = Arc::new(MemoryBackend::new());
    let emitter = AlertEmitter::new(
        backend.clone(),
        Arc::new(BroadcastHub::new()),
        Arc::new(RecordingPublisher::default()),
    );
    let mut monitor = HostMonitor::new(
        &MonitorConfig::default(),
        backend.clone(),
        Prober::new(vec![Arc::new(HangingTactic {
            address: "10.1.0.66".to_string(),
        })]),
        emitter,
    )
    .with_probe_timeout(Duration::from_millis(100));

    let stuck = backend.register_host("stuck", "10.1.0.66").await.unwrap();
    let healthy = backend.register_host("healthy", "10.1.0.8").await.unwrap();

    let start = Instant::now();
    let report = monitor.run_cycle().await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.probed, 2);
    assert_eq!(report.alive, 1);
    assert_eq!(backend.host(stuck.id).await.unwrap().status, HostStatus::Down);
    assert_eq!(backend.host(healthy.id).await.unwrap().status, HostStatus::Up);
}

#[tokio::test]
async fn test_host_deleted_mid_cycle_is_absorbed() {
    let backend = Arc::new(MemoryBackend::new());
    let gone = backend.register_host("gone", "10.1.0.9").await.unwrap();
    let kept = backend.register_host("kept", "10.1.0.10").await.unwrap();

    let inventory = Arc::new(VanishingInventory {
        inner: backend.clone(),
        vanishing_host: gone.id,
    });
    let subscriber = Arc::new(RecordingSubscriber::default());
    let hub = Arc::new(BroadcastHub::new());
    hub.subscribe(subscriber.clone()).await;

    let script = Arc::new(crate::helpers::ScriptedTactic::default());
    script.push("10.1.0.9", &[true]);
    script.push("10.1.0.10", &[true]);

    let emitter = AlertEmitter::new(
        backend.clone(),
        hub,
        Arc::new(RecordingPublisher::default()),
    );
    let mut monitor = HostMonitor::new(
        &MonitorConfig::default(),
        inventory,
        Prober::new(vec![script]),
        emitter,
    );

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.store_errors, 1);
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].host_id, kept.id);
    assert_eq!(backend.host(kept.id).await.unwrap().status, HostStatus::Up);
    assert!(backend.host(gone.id).await.is_none());

    // No alert for the vanished host reached any sink
    let messages = subscriber.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["host_id"], kept.id);
}

#[tokio::test]
async fn test_localhost_is_reachable_with_standard_prober() {
    let backend = Arc::new(MemoryBackend::new());
    let emitter = AlertEmitter::new(
        backend.clone(),
        Arc::new(BroadcastHub::new()),
        Arc::new(RecordingPublisher::default()),
    );
    let mut monitor = HostMonitor::new(
        &MonitorConfig::default(),
        backend.clone(),
        Prober::standard(vec![]),
        emitter,
    );

    let host = backend.register_host("self", "127.0.0.1").await.unwrap();
    monitor.run_cycle().await.unwrap();

    let stored = backend.host(host.id).await.unwrap();
    assert_eq!(stored.status, HostStatus::Up);
    assert!(stored.last_seen.is_some());
}

#[tokio::test]
async fn test_last_seen_tracks_successful_probes_only() {
    let mut p = Pipeline::new().await;
    let host = p.host("api", "10.1.0.11", HostStatus::Unknown).await;
    p.script.push("10.1.0.11", &[true, false]);

    p.cycles(1).await;
    let seen = p.backend.host(host.id).await.unwrap().last_seen;
    assert!(seen.is_some());

    p.cycles(1).await;
    assert_eq!(p.backend.host(host.id).await.unwrap().last_seen, seen);
    assert_eq!(p.monitor.failure_count(host.id), 1);
}
