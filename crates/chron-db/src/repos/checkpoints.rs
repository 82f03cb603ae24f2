//! Pipeline checkpoints: the low-water capture position per source.

use chron_core::capture::LogPosition;

use crate::error::DatabaseError;
use crate::repos::flush::upsert_checkpoint;
use crate::store::ChangeStore;

impl ChangeStore {
    /// Current checkpoint for `source`, or [`LogPosition::ZERO`] before the
    /// first cycle.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn checkpoint(&self, source: &str) -> Result<LogPosition, DatabaseError> {
        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT position FROM pipeline_checkpoints WHERE source = ?1",
                [source],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(LogPosition::new(row.get::<i64>(0)?)),
            None => Ok(LogPosition::ZERO),
        }
    }

    /// Advance the checkpoint without flushing anything, e.g. after a cycle
    /// that only consumed commit markers of empty transactions.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the upsert fails.
    pub async fn advance_checkpoint(
        &self,
        source: &str,
        position: LogPosition,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_gate().await;
        upsert_checkpoint(self.db().conn(), source, position).await
    }
}
