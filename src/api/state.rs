//! API shared state

use std::sync::Arc;

use crate::hub::BroadcastHub;
use crate::storage::Storage;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Hub the alert stream connections register with
    pub hub: Arc<BroadcastHub>,

    /// Inventory and alert store
    pub storage: Storage,
}

impl ApiState {
    pub fn new(hub: Arc<BroadcastHub>, storage: Storage) -> Self {
        Self { hub, storage }
    }
}
