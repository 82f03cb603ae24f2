//! Central schema registry for Chronicle types.
//!
//! The `SchemaRegistry` builds JSON Schemas from chron-core types and the
//! [`crate::rows`] shapes at construction time using [`schemars::schema_for!`]
//! and provides validation via `jsonschema`.

use std::collections::HashMap;

use chron_core::capture::RowImage;
use chron_core::enums::EntityKind;
use schemars::schema_for;

use crate::error::SchemaError;
use crate::rows;

/// Central store of all JSON Schemas in Chronicle.
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, serde_json::Value>,
}

/// Insert a schema into the map, converting the `schemars` output to a
/// `serde_json::Value`. Panics if `serde_json::to_value` fails (should be
/// infallible for valid `schemars` output).
macro_rules! register {
    ($map:expr, $name:expr, $ty:ty) => {
        $map.insert($name, serde_json::to_value(schema_for!($ty)).unwrap());
    };
}

impl SchemaRegistry {
    /// Build a new registry containing the capture, change, response, and
    /// row image schemas.
    ///
    /// # Panics
    ///
    /// Panics if `serde_json::to_value` fails on any `schemars`-generated
    /// schema. This is not expected in practice because `schemars` always
    /// produces valid JSON-serialisable output.
    #[must_use]
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        // --- Capture envelope (3) ---
        register!(schemas, "raw_change_event", chron_core::capture::RawChangeEvent);
        register!(schemas, "capture_item", chron_core::capture::CaptureItem);
        register!(schemas, "capture_gap", chron_core::capture::CaptureGap);

        // --- Change history (3) ---
        register!(schemas, "change_set", chron_core::entities::ChangeSet);
        register!(schemas, "change_record", chron_core::entities::ChangeRecord);
        register!(schemas, "diff_document", chron_core::diff::DiffDocument);

        // --- Responses (2) ---
        register!(schemas, "cycle_report", chron_core::responses::CycleReport);
        register!(schemas, "entity_history", chron_core::responses::EntityHistory);

        // --- Row images (12) ---
        register!(schemas, "row_resources", rows::ResourceRow);
        register!(schemas, "row_relationships", rows::RelationshipRow);
        register!(schemas, "row_resource_types", rows::ResourceTypeRow);
        register!(schemas, "row_scalar_properties", rows::ScalarPropertyRow);
        register!(schemas, "row_navigation_properties", rows::NavigationPropertyRow);
        register!(schemas, "row_predicates", rows::NamedUriRow);
        register!(schemas, "row_data_model_modules", rows::DataModelModuleRow);
        register!(schemas, "row_associations", rows::AssociationRow);
        register!(schemas, "row_properties", rows::NamedUriRow);
        register!(schemas, "row_predicate_properties", rows::PredicatePropertyRow);
        register!(schemas, "row_resource_properties", rows::ResourcePropertyRow);
        register!(schemas, "row_relationship_properties", rows::RelationshipPropertyRow);

        Self { schemas }
    }

    /// Get a schema by name. Returns `None` if not found.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(name)
    }

    /// Validate a JSON value against a named schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotFound` if the schema name is unknown, or
    /// `SchemaError::ValidationFailed` if validation produces errors.
    pub fn validate(&self, name: &str, instance: &serde_json::Value) -> Result<(), SchemaError> {
        let schema = self
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;

        let validator = jsonschema::validator_for(schema)
            .map_err(|e| SchemaError::Generation(format!("{e}")))?;

        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|e| format!("{e}"))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed { errors })
        }
    }

    /// Validate a captured row image against the shape of its source table.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::UnknownTable` when no row schema is registered
    /// for the kind's table, or `SchemaError::ValidationFailed`.
    pub fn validate_row(&self, kind: EntityKind, image: &RowImage) -> Result<(), SchemaError> {
        let name = rows::row_schema_name(kind.source_table());
        if self.get(&name).is_none() {
            return Err(SchemaError::UnknownTable(kind.source_table().to_string()));
        }
        self.validate(&name, &serde_json::Value::Object(image.clone()))
    }

    /// List all registered schema names.
    #[must_use]
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.schemas.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
