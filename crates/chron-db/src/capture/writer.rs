//! Writer side of the reference capture log.

use std::collections::BTreeSet;

use chron_core::capture::{LogPosition, RowImage};
use chron_core::enums::Operation;
use chrono::Utc;

use super::LibsqlCaptureSource;
use crate::error::DatabaseError;
use crate::helpers::{format_timestamp, to_json_text};

/// One upstream transaction being captured.
///
/// Each mutation is appended to the log as soon as it is captured, so a
/// transaction that has not committed yet is visible to readers as events
/// without a commit marker. Sequence numbers start at 1 and follow call order.
///
/// Writes are silently dropped (returning `None`) while capture is disabled
/// and for transactions discarded by an administrative action.
pub struct CaptureTransaction<'a> {
    source: &'a LibsqlCaptureSource,
    transaction_id: String,
    next_sequence: i64,
}

impl LibsqlCaptureSource {
    /// Start capturing a transaction.
    #[must_use]
    pub fn begin(&self, transaction_id: impl Into<String>) -> CaptureTransaction<'_> {
        CaptureTransaction {
            source: self,
            transaction_id: transaction_id.into(),
            next_sequence: 1,
        }
    }

    /// Whether writes for `transaction_id` should reach the log.
    async fn accepts(&self, transaction_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT s.enabled, EXISTS (
                        SELECT 1 FROM capture_dropped_transactions WHERE transaction_id = ?1
                    )
                 FROM capture_state s WHERE s.id = 1",
                [transaction_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<i64>(0)? != 0 && row.get::<i64>(1)? == 0)
    }

    /// Newest capture instance for `source_table`, created on first use.
    async fn current_instance(&self, source_table: &str) -> Result<i64, DatabaseError> {
        if let Some(id) = self.instances(source_table).await?.last() {
            return Ok(*id);
        }
        self.create_instance(source_table).await
    }

    pub(crate) async fn create_instance(&self, source_table: &str) -> Result<i64, DatabaseError> {
        self.db()
            .conn()
            .execute(
                "INSERT INTO capture_instances (source_table, created_at) VALUES (?1, ?2)",
                libsql::params![source_table, format_timestamp(&Utc::now())],
            )
            .await?;
        Ok(self.db().conn().last_insert_rowid())
    }
}

impl CaptureTransaction<'_> {
    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Capture an inserted row.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the log write fails.
    pub async fn insert(
        &mut self,
        source_table: &str,
        after: RowImage,
    ) -> Result<Option<LogPosition>, DatabaseError> {
        self.capture(source_table, Operation::Insert, None, Some(after), None)
            .await
    }

    /// Capture an updated row. `update_mask` lists the columns the statement
    /// modified; pass `None` to let readers compare the images.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the log write fails.
    pub async fn update(
        &mut self,
        source_table: &str,
        before: RowImage,
        after: RowImage,
        update_mask: Option<BTreeSet<String>>,
    ) -> Result<Option<LogPosition>, DatabaseError> {
        self.capture(source_table, Operation::Update, Some(before), Some(after), update_mask)
            .await
    }

    /// Capture a deleted row.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the log write fails.
    pub async fn delete(
        &mut self,
        source_table: &str,
        before: RowImage,
    ) -> Result<Option<LogPosition>, DatabaseError> {
        self.capture(source_table, Operation::Delete, Some(before), None, None)
            .await
    }

    /// Append one event. Images are stored as given; the pipeline rejects
    /// malformed combinations when it records them.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the log write fails.
    pub async fn capture(
        &mut self,
        source_table: &str,
        operation: Operation,
        before: Option<RowImage>,
        after: Option<RowImage>,
        update_mask: Option<BTreeSet<String>>,
    ) -> Result<Option<LogPosition>, DatabaseError> {
        if !self.source.accepts(&self.transaction_id).await? {
            return Ok(None);
        }
        let instance_id = self.source.current_instance(source_table).await?;
        let sequence = self.next_sequence;

        let conn = self.source.db().conn();
        conn.execute(
            "INSERT INTO capture_log
                (entry_type, transaction_id, sequence, instance_id, source_table, operation,
                 before_image, after_image, update_mask, recorded_at)
             VALUES ('event', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            libsql::params![
                self.transaction_id.as_str(),
                sequence,
                instance_id,
                source_table,
                operation.as_str(),
                before.as_ref().map(to_json_text).transpose()?,
                after.as_ref().map(to_json_text).transpose()?,
                update_mask.as_ref().map(to_json_text).transpose()?,
                format_timestamp(&Utc::now())
            ],
        )
        .await?;
        self.next_sequence += 1;
        Ok(Some(LogPosition::new(conn.last_insert_rowid())))
    }

    /// Append the commit marker. Returns its position, which becomes the
    /// change set's commit position.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the log write fails.
    pub async fn commit(self) -> Result<Option<LogPosition>, DatabaseError> {
        if !self.source.accepts(&self.transaction_id).await? {
            return Ok(None);
        }
        let conn = self.source.db().conn();
        conn.execute(
            "INSERT INTO capture_log (entry_type, transaction_id, recorded_at)
             VALUES ('commit', ?1, ?2)",
            libsql::params![self.transaction_id.as_str(), format_timestamp(&Utc::now())],
        )
        .await?;
        Ok(Some(LogPosition::new(conn.last_insert_rowid())))
    }
}
