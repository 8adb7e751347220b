//! In-memory storage backend (no persistence)
//!
//! Used when `storage.backend` is `"none"` and throughout the tests. Deleting
//! a host drops its alerts, matching the cascade of the SQLite schema.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{AlertStore, HealthStatus, HostInventory};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRecord, NewAlert};
use crate::{Host, HostStatus};

#[derive(Debug, Default)]
struct MemoryState {
    hosts: BTreeMap<i64, Host>,
    alerts: Vec<AlertRecord>,
    next_host_id: i64,
    next_alert_id: i64,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a host and every alert referencing it
    pub async fn remove_host(&self, host_id: i64) -> bool {
        let mut state = self.state.write().await;
        let removed = state.hosts.remove(&host_id).is_some();
        if removed {
            state.alerts.retain(|alert| alert.host_id != host_id);
        }
        removed
    }

    /// Overwrite a host's status directly, bypassing the monitor
    pub async fn set_host_status(&self, host_id: i64, status: HostStatus) -> bool {
        let mut state = self.state.write().await;
        match state.hosts.get_mut(&host_id) {
            Some(host) => {
                host.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn host(&self, host_id: i64) -> Option<Host> {
        self.state.read().await.hosts.get(&host_id).cloned()
    }

    /// All alerts in insertion order
    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.state.read().await.alerts.clone()
    }

    pub async fn alerts_for(&self, host_id: i64) -> Vec<AlertRecord> {
        self.state
            .read()
            .await
            .alerts
            .iter()
            .filter(|alert| alert.host_id == host_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HostInventory for MemoryBackend {
    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        Ok(self.state.read().await.hosts.values().cloned().collect())
    }

    async fn update_host_status(
        &self,
        host_id: i64,
        status: HostStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let host = state
            .hosts
            .get_mut(&host_id)
            .ok_or(StorageError::HostNotFound(host_id))?;

        host.status = status;
        if last_seen.is_some() {
            host.last_seen = last_seen;
        }
        Ok(())
    }

    async fn host_exists(&self, host_id: i64) -> StorageResult<bool> {
        Ok(self.state.read().await.hosts.contains_key(&host_id))
    }

    async fn register_host(&self, name: &str, address: &str) -> StorageResult<Host> {
        let mut state = self.state.write().await;
        state.next_host_id += 1;

        let host = Host {
            id: state.next_host_id,
            name: name.to_string(),
            address: address.to_string(),
            status: HostStatus::Unknown,
            last_seen: None,
        };
        state.hosts.insert(host.id, host.clone());

        debug!("registered in-memory host {} ({})", host.name, host.address);
        Ok(host)
    }
}

#[async_trait]
impl AlertStore for MemoryBackend {
    async fn create_alert(&self, alert: NewAlert) -> StorageResult<i64> {
        let mut state = self.state.write().await;
        if !state.hosts.contains_key(&alert.host_id) {
            return Err(StorageError::HostNotFound(alert.host_id));
        }

        state.next_alert_id += 1;
        let id = state.next_alert_id;
        state.alerts.push(AlertRecord::from_new(id, alert));
        Ok(id)
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRecord>> {
        Ok(self
            .state
            .read()
            .await
            .alerts
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("hosts".to_string(), state.hosts.len().to_string()),
                ("alerts".to_string(), state.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
