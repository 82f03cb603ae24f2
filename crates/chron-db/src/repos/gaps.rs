//! Recorded capture gaps.

use chron_core::capture::{CaptureGap, LogPosition};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::helpers::{parse_datetime, parse_enum};
use crate::store::ChangeStore;

/// A capture gap as stored in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedGap {
    pub id: String,
    pub source: String,
    #[serde(flatten)]
    pub gap: CaptureGap,
    pub detected_at: DateTime<Utc>,
}

impl ChangeStore {
    /// Every recorded gap, oldest range first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn gaps(&self) -> Result<Vec<RecordedGap>, DatabaseError> {
        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, source, after_position, through_position, reason, detail, detected_at
                 FROM capture_gaps ORDER BY through_position, source",
                (),
            )
            .await?;

        let mut gaps = Vec::new();
        while let Some(row) = rows.next().await? {
            gaps.push(RecordedGap {
                id: row.get::<String>(0)?,
                source: row.get::<String>(1)?,
                gap: CaptureGap {
                    after: LogPosition::new(row.get::<i64>(2)?),
                    through: LogPosition::new(row.get::<i64>(3)?),
                    reason: parse_enum(&row.get::<String>(4)?)?,
                    detail: row.get::<String>(5)?,
                },
                detected_at: parse_datetime(&row.get::<String>(6)?)?,
            });
        }
        Ok(gaps)
    }
}
