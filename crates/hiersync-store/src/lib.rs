//! HierSync Store - Asset database persistence
//!
//! SQLite-backed document store holding:
//! - The project document of each synchronized project
//! - Asset documents with their `data` section serialized as JSON
//!
//! ## Architecture
//!
//! This crate implements the `IAssetDatabase` port from `hiersync-core`.
//! It is a driven (secondary) adapter in the hexagonal architecture; the
//! synchronizer never sees SQL.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use hiersync_store::{DatabasePool, SqliteAssetDatabase};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/hiersync/assets.db")).await?;
//! let database = SqliteAssetDatabase::new(pool.pool().clone());
//! // Use database as IAssetDatabase...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteAssetDatabase;

/// Errors that can occur in the document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be mapped to a document
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The document to update does not exist
    #[error("Document not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
