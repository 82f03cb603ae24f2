//! ID prefixes and deterministic ID derivation.
//!
//! Change set and change record ids are derived from capture log positions,
//! never generated randomly. Reprocessing the same capture entries therefore
//! produces the same ids, which is what makes the flush idempotent.

use crate::capture::LogPosition;

pub const PREFIX_CHANGE_SET: &str = "cs";
pub const PREFIX_RECORD: &str = "rec";
pub const PREFIX_GAP: &str = "gap";

pub const ALL_PREFIXES: &[&str] = &[PREFIX_CHANGE_SET, PREFIX_RECORD, PREFIX_GAP];

/// Change set id for a transaction committed at `commit_position`.
///
/// Ids sort as strings in commit order.
#[must_use]
pub fn change_set_id(commit_position: LogPosition) -> String {
    format!("{PREFIX_CHANGE_SET}-{commit_position}")
}

/// Change record id for the capture event at `log_position`.
#[must_use]
pub fn record_id(log_position: LogPosition) -> String {
    format!("{PREFIX_RECORD}-{log_position}")
}

/// Gap id for a lost range ending at `through`.
#[must_use]
pub fn gap_id(through: LogPosition) -> String {
    format!("{PREFIX_GAP}-{through}")
}
