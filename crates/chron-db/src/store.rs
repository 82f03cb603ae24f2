//! The durable change-history store.
//!
//! `ChangeStore` wraps a [`ChronDb`] opened on the history schema. Writes go
//! through [`ChangeStore::flush`] and [`ChangeStore::record_gap`], each one
//! libSQL transaction; everything else in [`crate::repos`] is read-only.
//!
//! Reads and writes share one connection, so a query issued while a flush
//! transaction is open would see its uncommitted rows. An in-process
//! read/write gate keeps queries out until the writer commits or rolls back.

use chron_config::QueryConfig;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ChronDb;
use crate::error::DatabaseError;

/// Change history plus the query API over it.
pub struct ChangeStore {
    db: ChronDb,
    query: QueryConfig,
    gate: RwLock<()>,
}

impl ChangeStore {
    /// Open a local history database.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    /// * `query` - Page size limits for the query API.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn open_local(db_path: &str, query: QueryConfig) -> Result<Self, DatabaseError> {
        let db = ChronDb::open_local(db_path).await?;
        Ok(Self::from_db(db, query))
    }

    /// Create from an existing `ChronDb`.
    #[must_use]
    pub fn from_db(db: ChronDb, query: QueryConfig) -> Self {
        Self {
            db,
            query,
            gate: RwLock::new(()),
        }
    }

    /// Access the underlying database.
    #[must_use]
    pub const fn db(&self) -> &ChronDb {
        &self.db
    }

    /// Held by every query for its duration.
    pub(crate) async fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Held by every write transaction from begin to commit or rollback.
    pub(crate) async fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    /// Resolve a requested page size against the configured limits.
    pub(crate) fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.query.default_page_size)
            .clamp(1, self.query.max_page_size.max(1))
    }
}
