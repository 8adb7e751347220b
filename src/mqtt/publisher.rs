//! Outbound alert publisher
//!
//! Publishing never waits on the broker: events are queued with `try_publish`
//! and the event loop task delivers them with at-least-once semantics. While
//! no broker session is up, events are logged and dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::{AlertEvent, AlertPublisher};
use crate::config::MqttConfig;

use super::{CHANNEL_CAPACITY, RECONNECT_BACKOFF, mqtt_options};

pub struct MqttPublisher {
    topic: String,
    client: RwLock<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// A publisher with no broker session; every publish is dropped
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            client: RwLock::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            event_loop: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Start the broker session in the background
    ///
    /// Returns immediately; the session is usable once the broker acknowledges
    /// the connection. Calling this again replaces the previous session.
    #[instrument(skip(self, config), fields(broker = %config.host, port = config.port))]
    pub async fn connect(&self, config: &MqttConfig) {
        self.disconnect().await;

        let (client, event_loop) =
            AsyncClient::new(mqtt_options(config, &config.client_id), CHANNEL_CAPACITY);

        let handle = drive_event_loop(
            event_loop,
            self.connected.clone(),
            format!("{}:{}", config.host, config.port),
        );

        *self.client.write().await = Some(client);
        *self.event_loop.lock().await = Some(handle);
        debug!("publisher session started");
    }

    /// Tear the broker session down; a no-op when none is active
    pub async fn disconnect(&self) {
        if let Some(client) = self.client.write().await.take()
            && let Err(e) = client.disconnect().await
        {
            trace!("disconnect request not delivered: {e}");
        }

        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }

        if self.connected.swap(false, Ordering::SeqCst) {
            info!("publisher disconnected");
        }
    }
}

#[async_trait]
impl AlertPublisher for MqttPublisher {
    async fn publish(&self, event: &AlertEvent) -> anyhow::Result<()> {
        if !self.is_connected() {
            debug!(
                "broker not connected, dropping event for host {}",
                event.host_id
            );
            return Ok(());
        }

        let guard = self.client.read().await;
        let Some(client) = guard.as_ref() else {
            debug!("no broker session, dropping event for host {}", event.host_id);
            return Ok(());
        };

        let payload = serde_json::to_vec(event).context("failed to serialize alert event")?;
        client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .with_context(|| format!("failed to queue event on {}", self.topic))?;

        trace!("queued event for host {} on {}", event.host_id, self.topic);
        Ok(())
    }
}

fn drive_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    broker: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::SeqCst);
                    info!("connected to broker {broker}");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    connected.store(false, Ordering::SeqCst);
                    warn!("broker {broker} closed the session");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if connected.swap(false, Ordering::SeqCst) {
                        warn!("lost connection to broker {broker}: {e}");
                    } else {
                        debug!("broker {broker} unavailable: {e}");
                    }
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    })
}
