//! Response types returned by the pipeline and the query API.
//!
//! These are serialized as JSON by `chrond` commands.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capture::LogPosition;
use crate::entities::ChangeRecord;

/// Summary of one processing cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CycleReport {
    pub checkpoint_before: LogPosition,
    pub checkpoint_after: LogPosition,
    /// Capture items read from the source.
    pub items_read: u32,
    pub change_sets_flushed: u32,
    /// Change sets found already flushed (redelivery after a crash).
    pub change_sets_skipped: u32,
    pub records_written: u32,
    pub gaps_recorded: u32,
    /// Transactions seen but not yet complete; redelivered next cycle.
    pub pending_transactions: u32,
    pub duration_ms: u64,
}

/// What the history knows about one entity id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityHistory {
    /// No change record ever mentioned this id.
    NotFound,
    /// The entity's most recent record is not a delete.
    Live { records: Vec<ChangeRecord> },
    /// The entity existed and its most recent record deleted it.
    Deleted {
        deleted_in: String,
        records: Vec<ChangeRecord>,
    },
}

impl EntityHistory {
    /// Records in playback order; empty for `NotFound`.
    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        match self {
            Self::NotFound => &[],
            Self::Live { records } | Self::Deleted { records, .. } => records,
        }
    }
}
