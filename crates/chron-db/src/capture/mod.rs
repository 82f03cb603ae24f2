//! Reference capture source backed by a libSQL capture log.
//!
//! [`LibsqlCaptureSource`] stands in for the live repository's native change
//! capture. Writers record row mutations through [`CaptureTransaction`]
//! (`begin` -> `insert`/`update`/`delete` -> `commit`); the pipeline reads
//! them back through [`chron_core::source::CaptureSource`]; operators toggle
//! capture through [`chron_core::source::CaptureAdmin`].
//!
//! Every event and commit marker gets a position from an `AUTOINCREMENT` key,
//! so positions are never reused, even after entries are purged.

mod admin;
mod source;
mod writer;

pub use source::LibsqlCaptureSource;
pub use writer::CaptureTransaction;
