//! Row image shapes of the captured source tables.
//!
//! Every tracked column is optional because a nullable column arrives as JSON
//! `null`; only `id` is required. Columns not listed here are allowed, so
//! resource rows can carry their open property bag.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResourceRow {
    pub id: String,
    pub resource_type_id: Option<String>,
    pub resource_type_full_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelationshipRow {
    pub id: String,
    pub subject_resource_id: Option<String>,
    pub object_resource_id: Option<String>,
    pub predicate_id: Option<String>,
    pub ordinal_position: Option<i64>,
    pub reverse_ordinal_position: Option<i64>,
    pub date_added: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResourceTypeRow {
    pub id: String,
    pub data_model_module_id: Option<String>,
    pub base_type_id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScalarPropertyRow {
    pub id: String,
    pub resource_type_id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub description: Option<String>,
    pub data_type: Option<String>,
    pub nullable: Option<bool>,
    pub max_length: Option<i64>,
    pub scale: Option<i64>,
    pub precision: Option<i64>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NavigationPropertyRow {
    pub id: String,
    pub resource_type_id: Option<String>,
    pub association_id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub description: Option<String>,
}

/// Predicates and properties share a shape.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NamedUriRow {
    pub id: String,
    pub name: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DataModelModuleRow {
    pub id: String,
    pub namespace: Option<String>,
    pub uri: Option<String>,
    pub description: Option<String>,
    pub is_system: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AssociationRow {
    pub id: String,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub subject_navigation_property_id: Option<String>,
    pub object_navigation_property_id: Option<String>,
    pub predicate_id: Option<String>,
    pub subject_multiplicity: Option<String>,
    pub object_multiplicity: Option<String>,
    pub view_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PredicatePropertyRow {
    pub id: String,
    pub predicate_id: Option<String>,
    pub property_id: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResourcePropertyRow {
    pub id: String,
    pub resource_id: Option<String>,
    pub property_id: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelationshipPropertyRow {
    pub id: String,
    pub relationship_id: Option<String>,
    pub property_id: Option<String>,
    pub value: Option<String>,
}

/// Registry name of the row schema for a source table.
#[must_use]
pub fn row_schema_name(source_table: &str) -> String {
    format!("row_{source_table}")
}
