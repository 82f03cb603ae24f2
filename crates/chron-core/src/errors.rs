//! Cross-cutting error types for Chronicle.
//!
//! Domain-specific errors (e.g., `DatabaseError`, `RecordError`) are defined in
//! their respective crates. `PipelineError` in `chron-pipeline` is where they
//! converge.

use thiserror::Error;

/// Errors that can be raised by any Chronicle crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_kind} {id}")]
    NotFound { entity_kind: String, id: String },

    /// Data failed validation (format, constraints, unknown enum values).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from building, encoding, or decoding a property diff document.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The document is not valid JSON or does not match the document shape.
    #[error("Diff document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document declares a version this build cannot read.
    #[error("Unsupported diff document version {0}")]
    UnsupportedVersion(u32),

    /// The document parsed but violates a diff invariant.
    #[error("Invalid diff document: {0}")]
    Invalid(String),
}

/// Errors raised by a capture source or its administrative surface.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture is disabled; there is nothing to read or administer.
    #[error("Capture is disabled")]
    Disabled,

    /// The source table has no capture instance.
    #[error("No capture instance for source table '{0}'")]
    NoInstance(String),

    /// A capture call was made with arguments the source cannot honor.
    #[error("Invalid capture request: {0}")]
    InvalidRequest(String),

    /// The source's backing storage failed.
    #[error("Capture storage error: {0}")]
    Storage(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
