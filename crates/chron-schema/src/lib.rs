//! # chron-schema
//!
//! JSON Schema generation, validation, and registry for Chronicle.
//!
//! This crate provides:
//! - `SchemaRegistry`: central store of all JSON Schemas in the system
//! - Row image schemas for each captured source table, used by the pipeline's
//!   strict validation mode
//!
//! ## Architecture
//!
//! Change types are defined in `chron-core` with `#[derive(JsonSchema)]`.
//! Row image shapes live here in [`rows`] because only validation needs them.

mod error;
mod registry;
pub mod rows;

pub use error::SchemaError;
pub use registry::SchemaRegistry;
