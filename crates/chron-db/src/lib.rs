//! # chron-db
//!
//! libSQL storage for Chronicle.
//!
//! Holds the durable change history (change sets, change records, the
//! reference index, pipeline checkpoints, and recorded capture gaps), the
//! read-only change query API, and [`capture::LibsqlCaptureSource`], the
//! reference capture source that keeps its log in a libSQL database.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29).

pub mod capture;
pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod store;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;
use migrations::Migration;

/// Central database handle.
///
/// Wraps a libSQL database and one connection. Both the history store and
/// the capture log open through here; each applies its own migrations.
pub struct ChronDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl ChronDb {
    /// Open (or create) a change-history database at `path`.
    ///
    /// Runs the history migrations on open. Pass `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Self::open(path, migrations::HISTORY).await
    }

    /// Open (or create) a capture-log database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_capture(path: &str) -> Result<Self, DatabaseError> {
        Self::open(path, migrations::CAPTURE).await
    }

    async fn open(path: &str, migrations: &[Migration]) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let chron_db = Self { db, conn };
        chron_db.run_migrations(migrations).await?;
        Ok(chron_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(db: &ChronDb, table: &str) -> bool {
        let mut rows = db
            .conn()
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
            )
            .await
            .unwrap();
        rows.next().await.unwrap().is_some()
    }

    #[tokio::test]
    async fn open_local_creates_history_schema() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        for table in [
            "operations",
            "change_sets",
            "change_records",
            "change_references",
            "pipeline_checkpoints",
            "capture_gaps",
        ] {
            assert!(table_exists(&db, table).await, "table '{table}' should exist");
        }
        assert!(!table_exists(&db, "capture_log").await);
    }

    #[tokio::test]
    async fn open_capture_creates_capture_schema() {
        let db = ChronDb::open_capture(":memory:").await.unwrap();
        for table in [
            "capture_state",
            "capture_instances",
            "capture_log",
            "capture_pending_gaps",
            "capture_dropped_transactions",
        ] {
            assert!(table_exists(&db, table).await, "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn operations_lookup_is_seeded() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        let mut rows = db
            .conn()
            .query("SELECT id, name FROM operations ORDER BY id", ())
            .await
            .unwrap();
        let mut seen = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            seen.push((row.get::<i64>(0).unwrap(), row.get::<String>(1).unwrap()));
        }
        let expected: Vec<(i64, String)> = chron_core::enums::Operation::ALL
            .iter()
            .map(|op| (op.id(), op.as_str().to_string()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        db.run_migrations(migrations::HISTORY).await.unwrap();
    }

    #[tokio::test]
    async fn change_sets_reject_duplicate_transaction() {
        let db = ChronDb::open_local(":memory:").await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO change_sets (id, transaction_id, commit_position, created_at)
                 VALUES ('cs-1', 'tx-1', 1, '2009-04-02T22:05:00.000000Z')",
                (),
            )
            .await
            .unwrap();
        let result = db
            .conn()
            .execute(
                "INSERT INTO change_sets (id, transaction_id, commit_position, created_at)
                 VALUES ('cs-2', 'tx-1', 2, '2009-04-02T22:05:00.000000Z')",
                (),
            )
            .await;
        assert!(result.is_err(), "transaction ids are unique");
    }
}
