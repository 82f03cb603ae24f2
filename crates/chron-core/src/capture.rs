//! Capture envelope types.
//!
//! A capture source delivers an ordered, restartable sequence of
//! [`CaptureItem`]s keyed by [`LogPosition`]. Row-level mutations arrive as
//! [`RawChangeEvent`]s; a [`TransactionCommit`] marks that a transaction will
//! receive no more events; a [`CaptureGap`] reports positions whose events were
//! lost upstream before they could be processed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{GapReason, Operation};

/// A row image: column name to JSON value. SQL NULL is `Value::Null`.
pub type RowImage = serde_json::Map<String, serde_json::Value>;

/// Monotonically increasing position in the capture log.
///
/// Displayed as 16-digit zero-padded lowercase hex so that string order
/// matches numeric order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct LogPosition(i64);

impl LogPosition {
    /// Position before any captured entry.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A single captured row mutation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RawChangeEvent {
    /// Upstream transaction that applied the mutation.
    pub transaction_id: String,

    /// Position of this event in the capture log.
    pub log_position: LogPosition,

    /// Order of the mutation within its transaction, as recorded by the log.
    pub sequence: i64,

    /// Source table the row belongs to.
    pub kind: String,

    pub operation: Operation,

    /// Row state before the mutation. Present for updates and deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_image: Option<RowImage>,

    /// Row state after the mutation. Present for inserts and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_image: Option<RowImage>,

    /// Columns the source reports as modified by an update. When absent,
    /// changes are detected by comparing the images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<BTreeSet<String>>,

    /// When the capture source recorded the event.
    pub captured_at: DateTime<Utc>,
}

impl RawChangeEvent {
    /// Whether the source flags `column` as modified. Without a mask every
    /// column is a candidate and the images decide.
    #[must_use]
    pub fn mask_allows(&self, column: &str) -> bool {
        self.update_mask
            .as_ref()
            .is_none_or(|mask| mask.contains(column))
    }
}

/// Boundary marker: the transaction committed and will receive no more events.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TransactionCommit {
    pub transaction_id: String,
    pub commit_position: LogPosition,
    pub committed_at: DateTime<Utc>,
}

/// A range of positions `(after, through]` whose entries were lost upstream.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CaptureGap {
    /// Last position known to be intact before the gap.
    pub after: LogPosition,
    /// Last position lost.
    pub through: LogPosition,
    pub reason: GapReason,
    pub detail: String,
}

/// One entry of the capture sequence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureItem {
    Event(RawChangeEvent),
    Commit(TransactionCommit),
    Gap(CaptureGap),
}

impl CaptureItem {
    /// Position used to resume the sequence after this item.
    #[must_use]
    pub const fn position(&self) -> LogPosition {
        match self {
            Self::Event(e) => e.log_position,
            Self::Commit(c) => c.commit_position,
            Self::Gap(g) => g.through,
        }
    }
}
