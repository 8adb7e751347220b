//! Alert emission
//!
//! On every status transition the [`AlertEmitter`]:
//!
//! 1. persists an alert row
//! 2. broadcasts the event to live subscribers
//! 3. hands the event to the outbound publisher
//!
//! Each step is independent. A failure is logged and the next step still runs;
//! nothing is retried synchronously (the next transition is the natural retry).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::hub::BroadcastHub;
use crate::storage::{AlertStore, NewAlert};
use crate::{Host, Severity};

/// Alert as delivered to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub host_id: i64,
    pub host_name: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    /// JSON text sent to hub subscribers
    pub fn to_subscriber_message(&self) -> serde_json::Result<String> {
        serde_json::to_string(&serde_json::json!({
            "type": "alert",
            "host_id": self.host_id,
            "host_name": self.host_name,
            "severity": self.severity,
            "message": self.message,
            "timestamp": self.timestamp.to_rfc3339(),
        }))
    }
}

/// Outbound sink for alert events
///
/// Implementations must not wait for downstream acknowledgement.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, event: &AlertEvent) -> anyhow::Result<()>;
}

/// Outcome of one emission, one flag per step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub persisted: bool,
    /// Number of subscribers the event reached
    pub broadcast: usize,
    pub published: bool,
}

#[derive(Clone)]
pub struct AlertEmitter {
    store: Arc<dyn AlertStore>,
    hub: Arc<BroadcastHub>,
    publisher: Arc<dyn AlertPublisher>,
}

impl AlertEmitter {
    pub fn new(
        store: Arc<dyn AlertStore>,
        hub: Arc<BroadcastHub>,
        publisher: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self {
            store,
            hub,
            publisher,
        }
    }

    #[instrument(skip(self, host), fields(host_id = host.id, host = %host.name))]
    pub async fn emit(&self, host: &Host, severity: Severity, message: &str) -> EmitReport {
        let alert = NewAlert::new(host.id, severity, message);
        let event = AlertEvent {
            host_id: host.id,
            host_name: host.name.clone(),
            severity,
            message: message.to_string(),
            timestamp: alert.timestamp,
        };

        let mut report = EmitReport::default();

        match self.store.create_alert(alert).await {
            Ok(id) => {
                debug!("persisted alert {id}: {severity} {message}");
                report.persisted = true;
            }
            Err(e) => error!("failed to persist alert: {e}"),
        }

        match event.to_subscriber_message() {
            Ok(text) => report.broadcast = self.hub.broadcast(&text).await,
            Err(e) => error!("failed to serialize alert for subscribers: {e}"),
        }

        match self.publisher.publish(&event).await {
            Ok(()) => report.published = true,
            Err(e) => warn!("failed to publish alert event: {e:#}"),
        }

        report
    }
}
