//! Storage trait definitions
//!
//! The monitor only ever reads hosts and updates their status fields, while
//! alerts are plain inserts. The two concerns are split into separate traits
//! so a component can be handed exactly the access it needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{AlertRecord, NewAlert};
use crate::{Host, HostStatus};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Read access to monitored hosts plus the status write path
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the monitor, the inbound ingestor
/// and the API all hold the same instance.
#[async_trait]
pub trait HostInventory: Send + Sync {
    /// All hosts, ordered by id
    async fn list_hosts(&self) -> StorageResult<Vec<Host>>;

    /// Write the status of one host
    ///
    /// `last_seen = None` leaves the stored value untouched. Returns
    /// [`StorageError::HostNotFound`](super::StorageError::HostNotFound) if
    /// the host no longer exists.
    async fn update_host_status(
        &self,
        host_id: i64,
        status: HostStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    async fn host_exists(&self, host_id: i64) -> StorageResult<bool>;

    /// Create a host in status `unknown`
    ///
    /// Used for startup seeding; the monitor itself never creates hosts.
    async fn register_host(&self, name: &str, address: &str) -> StorageResult<Host>;
}

/// Append-only alert history
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert one alert and return its id
    async fn create_alert(&self, alert: NewAlert) -> StorageResult<i64>;

    /// Most recent alerts first
    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRecord>>;

    /// Lightweight operation verifying the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
