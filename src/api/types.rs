//! API response types

use serde::{Deserialize, Serialize};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Hosts currently in the inventory
    pub hosts: usize,
    /// Live alert stream connections
    pub subscribers: usize,
}
