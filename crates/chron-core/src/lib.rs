//! # chron-core
//!
//! Core types for Chronicle, the change-capture to audit-trail pipeline.
//!
//! This crate provides the foundational types shared across all Chronicle crates:
//! - Change sets and the tagged `EntityChange` record variant
//! - `Operation` and `EntityKind` enums with their storage representations
//! - The property diff document used by resource change records
//! - Capture envelope types and the `CaptureSource`/`CaptureAdmin` contract
//! - ID prefix constants and deterministic ID derivation
//! - Cross-cutting error types
//! - Cycle report and entity history response types

pub mod capture;
pub mod diff;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod responses;
pub mod source;
