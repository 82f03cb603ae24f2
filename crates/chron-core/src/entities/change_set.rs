use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capture::LogPosition;

/// The recorded effects of one captured upstream transaction.
///
/// Append-only: a change set is written once together with all of its
/// records and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChangeSet {
    /// Derived from `commit_position`; sorts in commit order.
    pub id: String,
    pub transaction_id: String,
    pub commit_position: LogPosition,
    pub created_at: DateTime<Utc>,
}
