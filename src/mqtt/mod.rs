//! Message bus plumbing
//!
//! - [`publisher::MqttPublisher`] sends this process's own alert events out.
//! - [`ingestor::AlertIngestor`] records alert events published by external
//!   sensors.
//!
//! Both poll their own `rumqttc` event loop in a dedicated task and keep
//! reconnecting with a fixed back-off until shut down.

pub mod ingestor;
pub mod publisher;

use std::time::Duration;

use rumqttc::MqttOptions;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::MqttConfig;

pub use ingestor::{AlertIngestor, IngestOutcome, IngestorHandle};
pub use publisher::MqttPublisher;

/// Pause between event loop errors before polling again
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Capacity of the request channel between a client and its event loop
const CHANNEL_CAPACITY: usize = 64;

/// Event published by an external sensor on the inbound topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub host_id: i64,
    /// `"UP"` or `"DOWN"`; anything else is informational
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<String>,
    /// Missing and `null` both read as empty
    #[serde(default, deserialize_with = "nullable_message")]
    pub message: String,
}

/// Accept any JSON value as a status; only strings are kept
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(status)) => Some(status),
        _ => None,
    })
}

fn nullable_message<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

pub(crate) fn mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive.max(5)));
    options
}
