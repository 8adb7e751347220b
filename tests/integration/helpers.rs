//! Helper types for integration tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use host_monitoring::{
    Host, HostStatus,
    actors::HostMonitor,
    alerts::{AlertEmitter, AlertEvent, AlertPublisher},
    config::MonitorConfig,
    hub::{BroadcastHub, Subscriber},
    monitors::probe::{ProbeTactic, Prober},
    storage::{HostInventory, MemoryBackend, StorageResult},
};
use tokio::sync::Mutex;

/// Probe answers from per-address scripts; an exhausted script means "down"
#[derive(Default)]
pub struct ScriptedTactic {
    scripts: std::sync::Mutex<HashMap<String, VecDeque<bool>>>,
}

impl ScriptedTactic {
    pub fn push(&self, address: &str, observations: &[bool]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .extend(observations);
    }
}

#[async_trait]
impl ProbeTactic for ScriptedTactic {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn attempt(&self, address: &str, _timeout: Duration) -> bool {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(VecDeque::pop_front)
            .unwrap_or(false)
    }
}

/// Hangs for longer than any test waits on one address, answers on the rest
pub struct HangingTactic {
    pub address: String,
}

#[async_trait]
impl ProbeTactic for HangingTactic {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn attempt(&self, address: &str, _timeout: Duration) -> bool {
        if address == self.address {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        true
    }
}

#[derive(Default)]
pub struct RecordingSubscriber {
    pub received: Mutex<Vec<String>>,
}

impl RecordingSubscriber {
    pub async fn messages(&self) -> Vec<serde_json::Value> {
        self.received
            .lock()
            .await
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        self.received.lock().await.push(text.to_string());
        Ok(())
    }
}

pub struct BrokenSubscriber;

#[async_trait]
impl Subscriber for BrokenSubscriber {
    async fn send_text(&self, _text: &str) -> anyhow::Result<()> {
        anyhow::bail!("connection reset by peer")
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<AlertEvent>>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertPublisher for RecordingPublisher {
    async fn publish(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("broker rejected publish");
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Inventory that deletes the given host right after it has been listed,
/// the way an operator removing it mid-cycle would
pub struct VanishingInventory {
    pub inner: Arc<MemoryBackend>,
    pub vanishing_host: i64,
}

#[async_trait]
impl HostInventory for VanishingInventory {
    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        let hosts = self.inner.list_hosts().await?;
        self.inner.remove_host(self.vanishing_host).await;
        Ok(hosts)
    }

    async fn update_host_status(
        &self,
        host_id: i64,
        status: HostStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        self.inner
            .update_host_status(host_id, status, last_seen)
            .await
    }

    async fn host_exists(&self, host_id: i64) -> StorageResult<bool> {
        self.inner.host_exists(host_id).await
    }

    async fn register_host(&self, name: &str, address: &str) -> StorageResult<Host> {
        self.inner.register_host(name, address).await
    }
}

/// A monitor over an in-memory store with scripted probes and recording sinks
pub struct Pipeline {
    pub monitor: HostMonitor,
    pub backend: Arc<MemoryBackend>,
    pub script: Arc<ScriptedTactic>,
    pub hub: Arc<BroadcastHub>,
    pub subscriber: Arc<RecordingSubscriber>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Pipeline {
    pub async fn new() -> Self {
        Self::with_publisher(Arc::new(RecordingPublisher::default())).await
    }

    pub async fn with_publisher(publisher: Arc<RecordingPublisher>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let script = Arc::new(ScriptedTactic::default());
        let hub = Arc::new(BroadcastHub::new());
        let subscriber = Arc::new(RecordingSubscriber::default());
        hub.subscribe(subscriber.clone()).await;

        let emitter = AlertEmitter::new(backend.clone(), hub.clone(), publisher.clone());
        let monitor = HostMonitor::new(
            &MonitorConfig::default(),
            backend.clone(),
            Prober::new(vec![script.clone()]),
            emitter,
        );

        Self {
            monitor,
            backend,
            script,
            hub,
            subscriber,
            publisher,
        }
    }

    pub async fn host(&self, name: &str, address: &str, status: HostStatus) -> Host {
        let host = self.backend.register_host(name, address).await.unwrap();
        self.backend.set_host_status(host.id, status).await;
        self.backend.host(host.id).await.unwrap()
    }

    pub async fn status_of(&self, host_id: i64) -> HostStatus {
        self.backend.host(host_id).await.unwrap().status
    }

    pub async fn cycles(&mut self, count: usize) {
        for _ in 0..count {
            self.monitor.run_cycle().await.unwrap();
        }
    }
}
