//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (API, ingestor) do not block the monitor's writes
//! - **Connection pooling**: Shared by every flow writing alerts
//! - **Migrations**: Schema versioning with sqlx
//!
//! Every write is a single-row statement; no flow needs a multi-row
//! transaction. Foreign keys are enforced so deleting a host cascades to its
//! alerts.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{AlertStore, HealthStatus, HostInventory};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRecord, NewAlert};
use crate::{Host, HostStatus, Severity};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite (WAL mode, foreign keys)
    ///
    /// ```no_run
    /// # use host_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./monitoring.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Delete a host; its alerts go with it
    pub async fn delete_host(&self, host_id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(host_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a single host
    pub async fn get_host(&self, host_id: i64) -> StorageResult<Option<Host>> {
        let row = sqlx::query("SELECT id, name, address, status, last_seen FROM hosts WHERE id = ?")
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::host_from_row).transpose()
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn host_from_row(row: &SqliteRow) -> StorageResult<Host> {
        let status: String = row.try_get("status")?;
        let last_seen: Option<i64> = row.try_get("last_seen")?;

        Ok(Host {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            status: HostStatus::from_str(&status).unwrap_or_default(),
            last_seen: last_seen.map(Self::millis_to_timestamp),
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertRecord> {
        let severity: String = row.try_get("severity")?;
        let severity = Severity::from_str(&severity)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        Ok(AlertRecord {
            id: row.try_get("id")?,
            host_id: row.try_get("host_id")?,
            severity,
            message: row.try_get("message")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }
}

#[async_trait]
impl HostInventory for SqliteBackend {
    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        let rows = sqlx::query("SELECT id, name, address, status, last_seen FROM hosts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::host_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn update_host_status(
        &self,
        host_id: i64,
        status: HostStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE hosts
            SET status = ?, last_seen = COALESCE(?, last_seen)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(last_seen.as_ref().map(Self::timestamp_to_millis))
        .bind(host_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::HostNotFound(host_id));
        }

        Ok(())
    }

    async fn host_exists(&self, host_id: i64) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM hosts WHERE id = ?")
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn register_host(&self, name: &str, address: &str) -> StorageResult<Host> {
        let result = sqlx::query("INSERT INTO hosts (name, address, status) VALUES (?, ?, ?)")
            .bind(name)
            .bind(address)
            .bind(HostStatus::Unknown.as_str())
            .execute(&self.pool)
            .await?;

        debug!("registered host {name} ({address})");

        Ok(Host {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            address: address.to_string(),
            status: HostStatus::Unknown,
            last_seen: None,
        })
    }
}

#[async_trait]
impl AlertStore for SqliteBackend {
    #[instrument(skip(self, alert), fields(host_id = alert.host_id))]
    async fn create_alert(&self, alert: NewAlert) -> StorageResult<i64> {
        let host_id = alert.host_id;

        let result = sqlx::query(
            "INSERT INTO alerts (host_id, severity, message, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(alert.host_id)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(Self::timestamp_to_millis(&alert.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageError::HostNotFound(host_id)
            }
            _ => StorageError::from(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, host_id, severity, message, timestamp
            FROM alerts
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let counts = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM hosts) AS hosts, (SELECT COUNT(*) FROM alerts) AS alerts",
        )
        .fetch_one(&self.pool)
        .await?;

        let hosts: i64 = counts.try_get("hosts")?;
        let alerts: i64 = counts.try_get("alerts")?;

        Ok(HealthStatus {
            healthy: true,
            message: "SQLite backend operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
                ("hosts".to_string(), hosts.to_string()),
                ("alerts".to_string(), alerts.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend at {}", self.db_path);
        self.pool.close().await;
        Ok(())
    }
}
