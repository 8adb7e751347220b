//! Inbound alert ingestion
//!
//! External sensors publish [`SensorEvent`]s on the inbound topic. Each event
//! referencing a known host becomes an alert row tagged with its origin.
//! Host status is never touched here.

use std::sync::Arc;

use rumqttc::{AsyncClient, Event, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::Severity;
use crate::config::MqttConfig;
use crate::storage::{AlertStore, HostInventory, NewAlert};

use super::{CHANNEL_CAPACITY, RECONNECT_BACKOFF, SensorEvent, mqtt_options};

/// Prefix identifying alerts that came in over the bus
pub const INGESTED_TAG: &str = "[MQTT]";

/// What happened to one inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { alert_id: i64, host_id: i64 },
    UnknownHost(i64),
    Malformed(String),
    StoreFailed(String),
}

impl SensorEvent {
    pub fn severity(&self) -> Severity {
        match self.status.as_deref() {
            Some("DOWN") => Severity::Critical,
            _ => Severity::Info,
        }
    }

    pub fn tagged_message(&self) -> String {
        format!("{INGESTED_TAG} {}", self.message)
    }
}

pub struct AlertIngestor {
    inventory: Arc<dyn HostInventory>,
    alerts: Arc<dyn AlertStore>,
}

impl AlertIngestor {
    pub fn new(inventory: Arc<dyn HostInventory>, alerts: Arc<dyn AlertStore>) -> Self {
        Self { inventory, alerts }
    }

    /// Validate and record a single inbound payload
    ///
    /// Never fails outward; the outcome is logged and returned for callers
    /// that care.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn ingest(&self, payload: &[u8]) -> IngestOutcome {
        let event: SensorEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("discarding malformed sensor event: {e}");
                return IngestOutcome::Malformed(e.to_string());
            }
        };

        trace!("received {event:?}");

        match self.inventory.host_exists(event.host_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("host {} not found, discarding sensor event", event.host_id);
                return IngestOutcome::UnknownHost(event.host_id);
            }
            Err(e) => {
                error!("failed to look up host {}: {e}", event.host_id);
                return IngestOutcome::StoreFailed(e.to_string());
            }
        }

        let alert = NewAlert::new(event.host_id, event.severity(), event.tagged_message());
        match self.alerts.create_alert(alert).await {
            Ok(alert_id) => {
                debug!("stored sensor alert {alert_id} for host {}", event.host_id);
                IngestOutcome::Stored {
                    alert_id,
                    host_id: event.host_id,
                }
            }
            Err(e) => {
                error!("failed to store sensor alert for host {}: {e}", event.host_id);
                IngestOutcome::StoreFailed(e.to_string())
            }
        }
    }

    /// Subscribe to the inbound topic and ingest events until shut down
    ///
    /// The subscription is (re)issued on every broker acknowledgement so it
    /// survives reconnects.
    pub fn spawn(self: Arc<Self>, config: &MqttConfig) -> IngestorHandle {
        let client_id = format!("{}-ingest", config.client_id);
        let (client, mut event_loop) =
            AsyncClient::new(mqtt_options(config, &client_id), CHANNEL_CAPACITY);

        let topic = config.subscribe_topic.clone();
        let subscriber = client.clone();

        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("ingestor connected, subscribing to {topic}");
                        if let Err(e) = subscriber.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            error!("failed to subscribe to {topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == topic => {
                        self.ingest(&publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("ingestor connection error: {e}");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        });

        IngestorHandle { client, task }
    }
}

/// Running subscription returned by [`AlertIngestor::spawn`]
pub struct IngestorHandle {
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl IngestorHandle {
    pub async fn shutdown(self) {
        if let Err(e) = self.client.disconnect().await {
            trace!("disconnect request not delivered: {e}");
        }
        self.task.abort();
        debug!("ingestor stopped");
    }
}
