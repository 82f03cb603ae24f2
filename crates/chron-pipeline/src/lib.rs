//! # chron-pipeline
//!
//! Turns a capture source's raw row-level events into the durable change
//! history.
//!
//! One processing cycle:
//! 1. Pages capture items from the last checkpoint until the source is drained
//! 2. Groups events by transaction in the [`assembler::ChangeSetAssembler`]
//! 3. Converts each event into a typed change record with the [`recorder::Recorder`]
//! 4. Flushes complete transactions in commit order, each atomically
//! 5. Records reported gaps and advances the low-water checkpoint
//!
//! The [`worker::Worker`] repeats cycles on an interval with a per-cycle
//! timeout, bounded retry, and cooperative shutdown.

pub mod assembler;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod retry;
pub mod worker;

pub use assembler::{Assembly, ChangeSetAssembler, CompletionPolicy, ReadyTransaction};
pub use error::{PipelineError, RecordError};
pub use pipeline::Pipeline;
pub use recorder::Recorder;
pub use retry::RetryConfig;
pub use worker::Worker;
