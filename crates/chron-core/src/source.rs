//! The capture source contract consumed by the pipeline.

use std::future::Future;

use crate::capture::{CaptureItem, LogPosition};
use crate::errors::CaptureError;

/// Delivers the capture log as a lazy, restartable sequence of pages.
///
/// Items are returned in strictly increasing [`CaptureItem::position`] order.
/// Callers page by passing the last position they received as `since`.
pub trait CaptureSource: Send + Sync {
    /// Up to `limit` items positioned strictly after `since`.
    fn poll_changes(
        &self,
        since: LogPosition,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<CaptureItem>, CaptureError>> + Send;

    /// Acknowledge that every item at or below `position` is accounted for.
    /// The source may release retention for acknowledged items.
    fn advance_checkpoint(
        &self,
        position: LogPosition,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;
}

/// Administrative toggle over a capture source.
///
/// These calls must not run concurrently with a processing cycle.
pub trait CaptureAdmin: Send + Sync {
    /// Turn capture on. `storage_path` names where capture tables live.
    fn enable_capture(
        &self,
        storage_path: &str,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Turn capture off. Unacknowledged entries are discarded and reported
    /// as a [`crate::enums::GapReason::CaptureDisabled`] gap.
    fn disable_capture(&self) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Create a new capture instance for `source_table` after a schema change.
    /// Only two instances are kept per table; creating a third drops the
    /// oldest and reports its unacknowledged entries as a
    /// [`crate::enums::GapReason::InstanceReplaced`] gap.
    fn replace_capture_instance(
        &self,
        source_table: &str,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Retention cleanup: drop every entry at or below `position`. Entries
    /// that were never acknowledged are reported as a
    /// [`crate::enums::GapReason::RetentionCleanup`] gap.
    fn purge_through(
        &self,
        position: LogPosition,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;
}
