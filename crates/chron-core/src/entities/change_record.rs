use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::diff::DiffDocument;
use crate::enums::{EntityKind, Operation};
use crate::errors::CoreError;

/// Previous and next value of one tracked attribute.
///
/// Each side is independently optional. Insert records never carry
/// `previous`, delete records never carry `next`, and an update that left the
/// attribute untouched carries neither.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AttributeChange<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<T>,
}

impl<T> Default for AttributeChange<T> {
    fn default() -> Self {
        Self {
            previous: None,
            next: None,
        }
    }
}

impl<T: PartialEq> AttributeChange<T> {
    /// Apply the per-operation presence rules to the values read from the
    /// before and after images.
    #[must_use]
    pub fn from_images(operation: Operation, before: Option<T>, after: Option<T>) -> Self {
        match operation {
            Operation::Insert => Self {
                previous: None,
                next: after,
            },
            Operation::Delete => Self {
                previous: before,
                next: None,
            },
            Operation::Update if before == after => Self::default(),
            Operation::Update => Self {
                previous: before,
                next: after,
            },
        }
    }
}

impl<T> AttributeChange<T> {
    /// True when neither side is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.previous.is_none() && self.next.is_none()
    }
}

/// Which side of an attribute change a value was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueSide {
    Previous,
    Next,
}

impl ValueSide {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Next => "next",
        }
    }
}

/// An id of another repository entity held by a change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReference {
    pub attribute: &'static str,
    pub side: ValueSide,
    pub referenced_id: String,
}

/// Presence of an attribute's values in a change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePresence {
    pub name: String,
    pub previous: bool,
    pub next: bool,
}

// ---------------------------------------------------------------------------
// Per-kind attribute sets
// ---------------------------------------------------------------------------

/// Resources have an open property bag; their changes are carried by a diff
/// document rather than fixed attribute pairs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceChange {
    pub resource_type_id: Option<String>,
    pub resource_type_full_name: Option<String>,
    pub property_changes: DiffDocument,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RelationshipChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub subject_resource_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub object_resource_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub predicate_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub ordinal_position: AttributeChange<i64>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub reverse_ordinal_position: AttributeChange<i64>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub date_added: AttributeChange<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceTypeChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub data_model_module_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub base_type_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub description: AttributeChange<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ScalarPropertyChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub resource_type_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub description: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub data_type: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub nullable: AttributeChange<bool>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub max_length: AttributeChange<i64>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub scale: AttributeChange<i64>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub precision: AttributeChange<i64>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub table_name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub column_name: AttributeChange<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NavigationPropertyChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub resource_type_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub association_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub description: AttributeChange<String>,
}

/// Shared by predicates and properties, which track the same attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NamedUriChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DataModelModuleChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub namespace: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub description: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub is_system: AttributeChange<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AssociationChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub name: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub uri: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub subject_navigation_property_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub object_navigation_property_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub predicate_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub subject_multiplicity: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub object_multiplicity: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub view_name: AttributeChange<String>,
}

/// A property value attached to a predicate, resource, or relationship.
///
/// `owner_id` holds the predicate, resource, or relationship id depending on
/// the kind; it is serialized under the kind's own attribute name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PropertyValueChange {
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub owner_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub property_id: AttributeChange<String>,
    #[serde(default, skip_serializing_if = "AttributeChange::is_empty")]
    pub value: AttributeChange<String>,
}

// ---------------------------------------------------------------------------
// EntityChange
// ---------------------------------------------------------------------------

/// Kind-specific content of a change record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityChange {
    Resource(ResourceChange),
    Relationship(RelationshipChange),
    ResourceType(ResourceTypeChange),
    ScalarProperty(ScalarPropertyChange),
    NavigationProperty(NavigationPropertyChange),
    Predicate(NamedUriChange),
    DataModelModule(DataModelModuleChange),
    Association(AssociationChange),
    Property(NamedUriChange),
    PredicateProperty(PropertyValueChange),
    ResourceProperty(PropertyValueChange),
    RelationshipProperty(PropertyValueChange),
}

impl EntityChange {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Resource(_) => EntityKind::Resource,
            Self::Relationship(_) => EntityKind::Relationship,
            Self::ResourceType(_) => EntityKind::ResourceType,
            Self::ScalarProperty(_) => EntityKind::ScalarProperty,
            Self::NavigationProperty(_) => EntityKind::NavigationProperty,
            Self::Predicate(_) => EntityKind::Predicate,
            Self::DataModelModule(_) => EntityKind::DataModelModule,
            Self::Association(_) => EntityKind::Association,
            Self::Property(_) => EntityKind::Property,
            Self::PredicateProperty(_) => EntityKind::PredicateProperty,
            Self::ResourceProperty(_) => EntityKind::ResourceProperty,
            Self::RelationshipProperty(_) => EntityKind::RelationshipProperty,
        }
    }

    /// Attribute pairs as a JSON object keyed by attribute name.
    ///
    /// Property-value kinds rename `owner_id` to their own owner attribute so
    /// that stored attributes line up with `EntityKind::reference_attributes`.
    /// Resources have no fixed pairs and yield an empty object.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn attributes(
        &self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        let mut value = match self {
            Self::Resource(_) => return Ok(serde_json::Map::new()),
            Self::Relationship(c) => serde_json::to_value(c)?,
            Self::ResourceType(c) => serde_json::to_value(c)?,
            Self::ScalarProperty(c) => serde_json::to_value(c)?,
            Self::NavigationProperty(c) => serde_json::to_value(c)?,
            Self::Predicate(c) | Self::Property(c) => serde_json::to_value(c)?,
            Self::DataModelModule(c) => serde_json::to_value(c)?,
            Self::Association(c) => serde_json::to_value(c)?,
            Self::PredicateProperty(c)
            | Self::ResourceProperty(c)
            | Self::RelationshipProperty(c) => serde_json::to_value(c)?,
        };
        let map = value.as_object_mut().map(std::mem::take).unwrap_or_default();
        Ok(match owner_attribute(self.kind()) {
            Some(owner) => map
                .into_iter()
                .map(|(k, v)| if k == "owner_id" { (owner.to_string(), v) } else { (k, v) })
                .collect(),
            None => map,
        })
    }

    /// Rebuild a non-resource change from its stored attribute object.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for the resource kind (which is stored
    /// as a diff document) or when the attributes do not match the kind.
    pub fn from_attributes(
        kind: EntityKind,
        mut attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, CoreError> {
        if let Some(owner) = owner_attribute(kind) {
            if let Some(v) = attributes.remove(owner) {
                attributes.insert("owner_id".to_string(), v);
            }
        }
        let value = serde_json::Value::Object(attributes);
        Ok(match kind {
            EntityKind::Resource => {
                return Err(CoreError::Validation(
                    "resource changes are stored as diff documents".into(),
                ));
            }
            EntityKind::Relationship => Self::Relationship(parse_attributes(kind, value)?),
            EntityKind::ResourceType => Self::ResourceType(parse_attributes(kind, value)?),
            EntityKind::ScalarProperty => Self::ScalarProperty(parse_attributes(kind, value)?),
            EntityKind::NavigationProperty => {
                Self::NavigationProperty(parse_attributes(kind, value)?)
            }
            EntityKind::Predicate => Self::Predicate(parse_attributes(kind, value)?),
            EntityKind::DataModelModule => Self::DataModelModule(parse_attributes(kind, value)?),
            EntityKind::Association => Self::Association(parse_attributes(kind, value)?),
            EntityKind::Property => Self::Property(parse_attributes(kind, value)?),
            EntityKind::PredicateProperty => {
                Self::PredicateProperty(parse_attributes(kind, value)?)
            }
            EntityKind::ResourceProperty => Self::ResourceProperty(parse_attributes(kind, value)?),
            EntityKind::RelationshipProperty => {
                Self::RelationshipProperty(parse_attributes(kind, value)?)
            }
        })
    }

    /// Which attributes carry a previous and/or next value.
    ///
    /// For resources, the diff document's properties are reported instead of
    /// fixed attributes.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn attribute_presence(&self) -> Result<Vec<AttributePresence>, serde_json::Error> {
        if let Self::Resource(r) = self {
            return Ok(r
                .property_changes
                .properties
                .iter()
                .map(|p| AttributePresence {
                    name: p.name.clone(),
                    previous: p.previous.is_some(),
                    next: p.next.is_some(),
                })
                .collect());
        }
        Ok(self
            .attributes()?
            .into_iter()
            .map(|(name, pair)| AttributePresence {
                previous: pair.get("previous").is_some(),
                next: pair.get("next").is_some(),
                name,
            })
            .collect())
    }

    /// Ids of other entities this change mentions, on either side.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn references(&self) -> Result<Vec<EntityReference>, serde_json::Error> {
        let attributes = self.attributes()?;
        let mut refs = Vec::new();
        for &attribute in self.kind().reference_attributes() {
            let Some(pair) = attributes.get(attribute) else {
                continue;
            };
            for side in [ValueSide::Previous, ValueSide::Next] {
                if let Some(id) = pair.get(side.as_str()).and_then(serde_json::Value::as_str) {
                    refs.push(EntityReference {
                        attribute,
                        side,
                        referenced_id: id.to_string(),
                    });
                }
            }
        }
        Ok(refs)
    }
}

/// Stored attribute name of `PropertyValueChange::owner_id` for each
/// property-value kind.
fn parse_attributes<T: serde::de::DeserializeOwned>(
    kind: EntityKind,
    value: serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(format!("stored attributes do not match {kind}: {e}")))
}

const fn owner_attribute(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::PredicateProperty => Some("predicate_id"),
        EntityKind::ResourceProperty => Some("resource_id"),
        EntityKind::RelationshipProperty => Some("relationship_id"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ChangeRecord
// ---------------------------------------------------------------------------

/// One entity's state transition within a change set. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChangeRecord {
    pub id: String,
    pub change_set_id: String,
    /// Position of the mutation within its transaction.
    pub sequence_number: i64,
    pub operation: Operation,
    /// Last known id of the described entity; it may no longer exist.
    pub entity_id: String,
    pub change: EntityChange,
}

impl ChangeRecord {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.change.kind()
    }

    /// Check the insert/delete presence rules.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` naming the first offending attribute.
    pub fn check_presence(&self) -> Result<(), CoreError> {
        let presence = self
            .change
            .attribute_presence()
            .map_err(|e| CoreError::Other(e.into()))?;
        for attr in presence {
            if self.operation == Operation::Insert && attr.previous {
                return Err(CoreError::Validation(format!(
                    "insert record {} carries previous {}",
                    self.id, attr.name
                )));
            }
            if self.operation == Operation::Delete && attr.next {
                return Err(CoreError::Validation(format!(
                    "delete record {} carries next {}",
                    self.id, attr.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn relationship_update() -> EntityChange {
        EntityChange::Relationship(RelationshipChange {
            subject_resource_id: AttributeChange::from_images(
                Operation::Update,
                Some("res-a".to_string()),
                Some("res-b".to_string()),
            ),
            object_resource_id: AttributeChange::from_images(
                Operation::Update,
                Some("res-c".to_string()),
                Some("res-c".to_string()),
            ),
            ordinal_position: AttributeChange::from_images(Operation::Update, None, Some(2)),
            ..RelationshipChange::default()
        })
    }

    #[test]
    fn from_images_applies_operation_rules() {
        let ins = AttributeChange::from_images(Operation::Insert, Some(1), Some(2));
        assert_eq!((ins.previous, ins.next), (None, Some(2)));

        let del = AttributeChange::from_images(Operation::Delete, Some(1), Some(2));
        assert_eq!((del.previous, del.next), (Some(1), None));

        let same = AttributeChange::from_images(Operation::Update, Some(1), Some(1));
        assert!(same.is_empty());

        let cleared = AttributeChange::<i64>::from_images(Operation::Update, Some(1), None);
        assert_eq!((cleared.previous, cleared.next), (Some(1), None));
    }

    #[test]
    fn unchanged_attributes_are_omitted() {
        let attrs = relationship_update().attributes().unwrap();
        assert_eq!(
            serde_json::Value::Object(attrs),
            json!({
                "subject_resource_id": {"previous": "res-a", "next": "res-b"},
                "ordinal_position": {"next": 2}
            })
        );
    }

    #[test]
    fn references_cover_both_sides() {
        let refs = relationship_update().references().unwrap();
        let ids: Vec<(&str, ValueSide, &str)> = refs
            .iter()
            .map(|r| (r.attribute, r.side, r.referenced_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("subject_resource_id", ValueSide::Previous, "res-a"),
                ("subject_resource_id", ValueSide::Next, "res-b"),
            ]
        );
    }

    #[test]
    fn property_value_owner_is_renamed_per_kind() {
        let change = EntityChange::ResourceProperty(PropertyValueChange {
            owner_id: AttributeChange::from_images(Operation::Insert, None, Some("res-1".into())),
            property_id: AttributeChange::from_images(
                Operation::Insert,
                None,
                Some("prp-1".into()),
            ),
            value: AttributeChange::from_images(Operation::Insert, None, Some(String::new())),
        });
        let attrs = change.attributes().unwrap();
        assert!(attrs.contains_key("resource_id"));
        assert!(!attrs.contains_key("owner_id"));

        let rebuilt = EntityChange::from_attributes(EntityKind::ResourceProperty, attrs).unwrap();
        assert_eq!(rebuilt, change);

        let refs = change.references().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].attribute, "resource_id");
    }

    #[test]
    fn attributes_roundtrip_for_every_fixed_kind() {
        let change = EntityChange::ScalarProperty(ScalarPropertyChange {
            name: AttributeChange::from_images(Operation::Insert, None, Some("Title".into())),
            nullable: AttributeChange::from_images(Operation::Insert, None, Some(true)),
            max_length: AttributeChange::from_images(Operation::Insert, None, Some(-1)),
            ..ScalarPropertyChange::default()
        });
        let attrs = change.attributes().unwrap();
        assert_eq!(
            EntityChange::from_attributes(EntityKind::ScalarProperty, attrs).unwrap(),
            change
        );
    }

    #[test]
    fn from_attributes_rejects_resource_and_mismatch() {
        assert!(
            EntityChange::from_attributes(EntityKind::Resource, serde_json::Map::new()).is_err()
        );

        let bad = json!({"name": {"next": 5}}).as_object().cloned().unwrap();
        assert!(EntityChange::from_attributes(EntityKind::Predicate, bad).is_err());
    }

    #[test]
    fn check_presence_flags_insert_with_previous() {
        let record = ChangeRecord {
            id: "rec-1".into(),
            change_set_id: "cs-1".into(),
            sequence_number: 1,
            operation: Operation::Insert,
            entity_id: "rel-1".into(),
            change: relationship_update(),
        };
        assert!(record.check_presence().is_err());
    }
}
