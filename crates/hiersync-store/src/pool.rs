//! Connection pool for the asset database
//!
//! File-backed stores use WAL journaling so a second reader (for example
//! `hiersync config show` pointing at the same file) never blocks a
//! running sync. In-memory stores keep a single connection because SQLite
//! memory databases are per-connection.

use std::path::Path;
use std::time::Duration;

use hiersync_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the SQLite pool and applies the document schema on open
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (or create) the store at `db_path`
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// `StoreError::ConnectionFailed` when the file cannot be opened,
    /// `StoreError::MigrationFailed` when the schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Cannot create directory {} for the asset database: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Cannot open asset database {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), "Asset database opened");
        Ok(Self { pool })
    }

    /// Open the store configured in the `database` section
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Self::new(&config.path).await
    }

    /// Fresh in-memory store, used by tests
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Cannot open in-memory asset database: {}", e))
            })?;

        migrate(&pool).await?;
        tracing::debug!("In-memory asset database opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(include_str!("migrations/20260301_documents.sql"))
        .execute(pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("documents schema: {}", e)))?;
    tracing::debug!("Document schema ready");
    Ok(())
}
