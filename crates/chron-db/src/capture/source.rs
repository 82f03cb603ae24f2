use std::collections::BTreeSet;

use chron_core::capture::{CaptureGap, CaptureItem, LogPosition, RawChangeEvent, TransactionCommit};
use chron_core::errors::CaptureError;
use chron_core::source::CaptureSource;

use crate::ChronDb;
use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_optional_object};

/// Capture log kept in a libSQL database.
pub struct LibsqlCaptureSource {
    db: ChronDb,
}

impl LibsqlCaptureSource {
    /// Open (or create) a capture log at `path`. Capture starts disabled.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Ok(Self::from_db(ChronDb::open_capture(path).await?))
    }

    #[must_use]
    pub const fn from_db(db: ChronDb) -> Self {
        Self { db }
    }

    pub(crate) const fn db(&self) -> &ChronDb {
        &self.db
    }

    /// Whether capture is currently enabled.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn is_enabled(&self) -> Result<bool, DatabaseError> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT enabled FROM capture_state WHERE id = 1", ())
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<i64>(0)? != 0)
    }

    /// Highest position acknowledged through `advance_checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn acknowledged(&self) -> Result<LogPosition, DatabaseError> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT acknowledged FROM capture_state WHERE id = 1", ())
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(LogPosition::new(row.get::<i64>(0)?))
    }

    /// Ids of the capture instances retained for `source_table`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn instances(&self, source_table: &str) -> Result<Vec<i64>, DatabaseError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT id FROM capture_instances WHERE source_table = ?1 ORDER BY id",
                [source_table],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    async fn read_log(
        &self,
        since: LogPosition,
        limit: u32,
    ) -> Result<Vec<CaptureItem>, DatabaseError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT position, entry_type, transaction_id, sequence, source_table, operation,
                        before_image, after_image, update_mask, recorded_at
                 FROM capture_log WHERE position > ?1 ORDER BY position LIMIT ?2",
                libsql::params![since.get(), limit],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            let position = LogPosition::new(row.get::<i64>(0)?);
            let transaction_id = row.get::<String>(2)?;
            let recorded_at = parse_datetime(&row.get::<String>(9)?)?;
            let item = match row.get::<String>(1)?.as_str() {
                "commit" => CaptureItem::Commit(TransactionCommit {
                    transaction_id,
                    commit_position: position,
                    committed_at: recorded_at,
                }),
                "event" => {
                    let update_mask = get_opt_string(&row, 8)?
                        .map(|s| serde_json::from_str::<BTreeSet<String>>(&s))
                        .transpose()
                        .map_err(|e| {
                            DatabaseError::Query(format!("Invalid update mask at {position}: {e}"))
                        })?;
                    CaptureItem::Event(RawChangeEvent {
                        transaction_id,
                        log_position: position,
                        sequence: row.get::<i64>(3)?,
                        kind: row.get::<String>(4)?,
                        operation: parse_enum(&row.get::<String>(5)?)?,
                        before_image: parse_optional_object(get_opt_string(&row, 6)?.as_deref())?,
                        after_image: parse_optional_object(get_opt_string(&row, 7)?.as_deref())?,
                        update_mask,
                        captured_at: recorded_at,
                    })
                }
                other => {
                    return Err(DatabaseError::InvalidState(format!(
                        "unknown capture entry type '{other}' at {position}"
                    )));
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    async fn read_gaps(
        &self,
        since: LogPosition,
        limit: u32,
    ) -> Result<Vec<CaptureItem>, DatabaseError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT after_position, through_position, reason, detail
                 FROM capture_pending_gaps WHERE through_position > ?1
                 ORDER BY through_position LIMIT ?2",
                libsql::params![since.get(), limit],
            )
            .await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(CaptureItem::Gap(CaptureGap {
                after: LogPosition::new(row.get::<i64>(0)?),
                through: LogPosition::new(row.get::<i64>(1)?),
                reason: parse_enum(&row.get::<String>(2)?)?,
                detail: row.get::<String>(3)?,
            }));
        }
        Ok(items)
    }

    async fn acknowledge(&self, position: LogPosition) -> Result<(), DatabaseError> {
        self.db
            .conn()
            .execute(
                "UPDATE capture_state SET acknowledged = MAX(acknowledged, ?1) WHERE id = 1",
                [position.get()],
            )
            .await?;
        // Delivered gaps at or below the acknowledgement are recorded downstream.
        self.db
            .conn()
            .execute(
                "DELETE FROM capture_pending_gaps WHERE through_position <= ?1",
                [position.get()],
            )
            .await?;
        Ok(())
    }
}

impl CaptureSource for LibsqlCaptureSource {
    async fn poll_changes(
        &self,
        since: LogPosition,
        limit: u32,
    ) -> Result<Vec<CaptureItem>, CaptureError> {
        if limit == 0 {
            return Err(CaptureError::InvalidRequest("page limit must be at least 1".into()));
        }
        let mut items = self.read_log(since, limit).await?;
        items.extend(self.read_gaps(since, limit).await?);
        items.sort_by_key(CaptureItem::position);
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn advance_checkpoint(&self, position: LogPosition) -> Result<(), CaptureError> {
        Ok(self.acknowledge(position).await?)
    }
}
