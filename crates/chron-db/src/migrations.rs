//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` (or `INSERT OR IGNORE`)
//! for idempotent re-running.

use crate::ChronDb;
use crate::error::DatabaseError;

/// A named, embedded migration script.
pub(crate) struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Change history: 6 tables, 4 indexes.
pub(crate) const HISTORY: &[Migration] = &[Migration {
    name: "001_history",
    sql: include_str!("../migrations/001_history.sql"),
}];

/// Reference capture log: 5 tables, 2 indexes.
pub(crate) const CAPTURE: &[Migration] = &[Migration {
    name: "002_capture",
    sql: include_str!("../migrations/002_capture.sql"),
}];

impl ChronDb {
    /// Run the given embedded migrations in sequence.
    pub(crate) async fn run_migrations(
        &self,
        migrations: &[Migration],
    ) -> Result<(), DatabaseError> {
        for migration in migrations {
            self.conn
                .execute_batch(migration.sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{}: {e}", migration.name)))?;
        }
        Ok(())
    }
}
