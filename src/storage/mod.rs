//! Host inventory and alert persistence
//!
//! ## Design
//!
//! - **Trait-based**: [`HostInventory`] and [`AlertStore`] allow swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Single-row writes**: every write stands alone, concurrent flows need no shared lock
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or quick trials
//!
//! ## Usage
//!
//! ```no_run
//! use host_monitoring::{config::StorageConfig, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = storage::open(&StorageConfig::default()).await?;
//!     let hosts = storage.inventory.list_hosts().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{AlertStore, HealthStatus, HostInventory};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{AlertRecord, NewAlert};

use crate::config::StorageConfig;

/// Both storage seams, backed by the same instance
#[derive(Clone)]
pub struct Storage {
    pub inventory: Arc<dyn HostInventory>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Storage {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: HostInventory + AlertStore + 'static,
    {
        Self {
            inventory: backend.clone(),
            alerts: backend,
        }
    }
}

/// Open the configured backend
///
/// Failing here is fatal for the process: the monitor must not start
/// against an unreachable store.
pub async fn open(config: &StorageConfig) -> StorageResult<Storage> {
    match config {
        StorageConfig::None => {
            tracing::info!("using in-memory storage (no persistence)");
            Ok(Storage::from_backend(Arc::new(MemoryBackend::new())))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = sqlite::SqliteBackend::new(path).await?;
            Ok(Storage::from_backend(Arc::new(backend)))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite backend requested but the storage-sqlite feature is disabled".to_string(),
        )),
    }
}
