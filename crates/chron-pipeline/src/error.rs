//! Error types for the pipeline.

use std::time::Duration;

use chron_core::capture::LogPosition;
use chron_core::errors::CaptureError;
use chron_db::error::DatabaseError;

/// Errors turning one captured event into a change record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The event came from a table the pipeline does not track.
    /// This is a configuration problem and aborts the cycle.
    #[error("unknown source table '{table}' at {position}")]
    UnknownKind { table: String, position: LogPosition },

    /// The event is missing a required image, carries a non-object image,
    /// holds a value of the wrong type, or collides with another event.
    #[error("malformed change event at {position}: {reason}")]
    MalformedEvent { position: LogPosition, reason: String },

    /// The schema registry could not check a row image.
    #[error("schema error: {0}")]
    Schema(#[from] chron_schema::SchemaError),
}

impl RecordError {
    pub(crate) fn malformed(position: LogPosition, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            position,
            reason: reason.into(),
        }
    }
}

/// Errors that end a processing cycle. The checkpoint is never advanced past
/// the work a failed cycle did not finish.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// A cycle ran longer than the configured timeout.
    #[error("cycle timed out after {0:?}")]
    Timeout(Duration),

    /// Consecutive cycles failed more often than the retry budget allows.
    #[error("giving up after {attempts} failed cycles: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<PipelineError>,
    },
}
