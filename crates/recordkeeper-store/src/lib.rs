//! Recordkeeper Store - SQLite persistence
//!
//! Durable storage for:
//! - Personal-data records with consent and retention metadata
//! - The append-only audit ledger, one sequence per record
//!
//! ## Architecture
//!
//! This crate implements the `IRecordRepository` port from
//! `recordkeeper-core` on top of SQLite. Record writes and the audit entry
//! describing them share one transaction, so either both land or neither
//! does. The audit table rejects `UPDATE` and `DELETE` at the schema level.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use recordkeeper_store::{DatabasePool, SqliteRecordRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/recordkeeper/records.db")).await?;
//! let repo = SqliteRecordRepository::new(pool.pool().clone());
//! // Use repo as IRecordRepository...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteRecordRepository;

/// Errors that can occur in the storage adapter
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

    /// A stored value could not be mapped back to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
