//! Repository methods on [`crate::store::ChangeStore`].
//!
//! `flush` and `checkpoints` write; the remaining modules make up the change
//! query API and never modify the store.

pub mod change_records;
pub mod change_sets;
pub mod checkpoints;
pub mod flush;
pub mod gaps;
pub mod history;
pub mod paging;

pub use change_records::RecordFilter;
pub use change_sets::ChangeSetFilter;
pub use flush::{ChangeSetBatch, FlushOutcome};
pub use gaps::RecordedGap;
pub use paging::{Page, PageCursor, PageRequest};
