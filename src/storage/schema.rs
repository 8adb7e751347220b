//! Row types for the alert history
//!
//! Hosts are passed around as [`crate::Host`] directly; alerts have a
//! separate insert shape because the store assigns the id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Severity;

/// An alert about to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub host_id: i64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NewAlert {
    pub fn new(host_id: i64, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            host_id,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub host_id: i64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    pub fn from_new(id: i64, alert: NewAlert) -> Self {
        Self {
            id,
            host_id: alert.host_id,
            severity: alert.severity,
            message: alert.message,
            timestamp: alert.timestamp,
        }
    }
}
