//! Operations, entity kinds, gap reasons, and completion modes.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! `as_str()` returns the representation used in SQL storage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The kind of mutation a change record describes.
///
/// Stored in the `operations` lookup table; records reference it by `id()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Primary key of this operation in the `operations` lookup table.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Insert => 1,
            Self::Update => 2,
            Self::Delete => 3,
        }
    }

    /// Resolve an `operations.id` value.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for ids outside the lookup table.
    pub fn from_id(id: i64) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|op| op.id() == id)
            .ok_or_else(|| CoreError::Validation(format!("unknown operation id {id}")))
    }

    /// Whether records of this operation may carry `previous` values.
    #[must_use]
    pub const fn has_before_image(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Whether records of this operation may carry `next` values.
    #[must_use]
    pub const fn has_after_image(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Kind of repository entity a change record describes.
///
/// Each kind is captured from exactly one source table in the live repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Resource,
    Relationship,
    ResourceType,
    ScalarProperty,
    NavigationProperty,
    Predicate,
    DataModelModule,
    Association,
    Property,
    PredicateProperty,
    ResourceProperty,
    RelationshipProperty,
}

impl EntityKind {
    pub const ALL: [Self; 12] = [
        Self::Resource,
        Self::Relationship,
        Self::ResourceType,
        Self::ScalarProperty,
        Self::NavigationProperty,
        Self::Predicate,
        Self::DataModelModule,
        Self::Association,
        Self::Property,
        Self::PredicateProperty,
        Self::ResourceProperty,
        Self::RelationshipProperty,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Relationship => "relationship",
            Self::ResourceType => "resource_type",
            Self::ScalarProperty => "scalar_property",
            Self::NavigationProperty => "navigation_property",
            Self::Predicate => "predicate",
            Self::DataModelModule => "data_model_module",
            Self::Association => "association",
            Self::Property => "property",
            Self::PredicateProperty => "predicate_property",
            Self::ResourceProperty => "resource_property",
            Self::RelationshipProperty => "relationship_property",
        }
    }

    /// Name of the live-repository table whose captured rows produce this kind.
    ///
    #[must_use]
    pub const fn source_table(self) -> &'static str {
        match self {
            Self::Resource => "resources",
            Self::Relationship => "relationships",
            Self::ResourceType => "resource_types",
            Self::ScalarProperty => "scalar_properties",
            Self::NavigationProperty => "navigation_properties",
            Self::Predicate => "predicates",
            Self::DataModelModule => "data_model_modules",
            Self::Association => "associations",
            Self::Property => "properties",
            Self::PredicateProperty => "predicate_properties",
            Self::ResourceProperty => "resource_properties",
            Self::RelationshipProperty => "relationship_properties",
        }
    }

    /// Classify a captured source table. Returns `None` for tables that are
    /// not tracked.
    #[must_use]
    pub fn from_source_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.source_table() == table)
    }

    /// Attributes of this kind that hold the id of another repository entity.
    ///
    /// These are indexed in `change_references` so history can be joined on
    /// either end of a reference after the referenced entity is gone.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub const fn reference_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Resource | Self::Predicate | Self::DataModelModule | Self::Property => &[],
            Self::Relationship => &["subject_resource_id", "object_resource_id", "predicate_id"],
            Self::ResourceType => &["data_model_module_id", "base_type_id"],
            Self::ScalarProperty => &["resource_type_id"],
            Self::NavigationProperty => &["resource_type_id", "association_id"],
            Self::Association => &[
                "subject_navigation_property_id",
                "object_navigation_property_id",
                "predicate_id",
            ],
            Self::PredicateProperty => &["predicate_id", "property_id"],
            Self::ResourceProperty => &["resource_id", "property_id"],
            Self::RelationshipProperty => &["relationship_id", "property_id"],
        }
    }

    /// Image columns recorded as attribute pairs for this kind.
    ///
    /// Empty for resources, whose properties go into a diff document.
    #[must_use]
    pub const fn tracked_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Resource => &[],
            Self::Relationship => &[
                "subject_resource_id",
                "object_resource_id",
                "predicate_id",
                "ordinal_position",
                "reverse_ordinal_position",
                "date_added",
            ],
            Self::ResourceType => &[
                "data_model_module_id",
                "base_type_id",
                "name",
                "uri",
                "description",
            ],
            Self::ScalarProperty => &[
                "resource_type_id",
                "name",
                "uri",
                "description",
                "data_type",
                "nullable",
                "max_length",
                "scale",
                "precision",
                "table_name",
                "column_name",
            ],
            Self::NavigationProperty => &[
                "resource_type_id",
                "association_id",
                "name",
                "uri",
                "description",
            ],
            Self::Predicate | Self::Property => &["name", "uri"],
            Self::DataModelModule => &["namespace", "uri", "description", "is_system"],
            Self::Association => &[
                "name",
                "uri",
                "subject_navigation_property_id",
                "object_navigation_property_id",
                "predicate_id",
                "subject_multiplicity",
                "object_multiplicity",
                "view_name",
            ],
            Self::PredicateProperty => &["predicate_id", "property_id", "value"],
            Self::ResourceProperty => &["resource_id", "property_id", "value"],
            Self::RelationshipProperty => &["relationship_id", "property_id", "value"],
        }
    }

    /// Schema-level kinds describe the data model rather than data.
    #[must_use]
    pub const fn is_schema_level(self) -> bool {
        matches!(
            self,
            Self::ResourceType
                | Self::ScalarProperty
                | Self::NavigationProperty
                | Self::DataModelModule
                | Self::Association
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown entity kind '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// GapReason
// ---------------------------------------------------------------------------

/// Why a range of capture positions was lost before it could be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Retention cleanup removed entries that were never acknowledged.
    RetentionCleanup,
    /// Capture was disabled with unprocessed entries outstanding.
    CaptureDisabled,
    /// A schema change created a third capture instance and the oldest was dropped.
    InstanceReplaced,
    /// Events arrived for a transaction whose change set was already flushed.
    LateEvents,
}

impl GapReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetentionCleanup => "retention_cleanup",
            Self::CaptureDisabled => "capture_disabled",
            Self::InstanceReplaced => "instance_replaced",
            Self::LateEvents => "late_events",
        }
    }
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CompletionMode
// ---------------------------------------------------------------------------

/// How the assembler decides that a transaction will receive no more events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Wait for the source's explicit commit marker.
    #[default]
    CommitMarker,
    /// Treat a transaction as complete once its newest event has aged past
    /// the quiescence window.
    Quiescence,
}

impl CompletionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommitMarker => "commit_marker",
            Self::Quiescence => "quiescence",
        }
    }
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
