//! Entity change recorder.
//!
//! Converts one raw capture event into a typed [`ChangeRecord`]: the source
//! table picks the entity kind, the row images supply the attribute pairs,
//! and resource rows get a property diff document instead of pairs.

use chron_core::capture::{RawChangeEvent, RowImage};
use chron_core::diff::DiffDocument;
use chron_core::entities::{
    AttributeChange, ChangeRecord, ChangeSet, EntityChange, ResourceChange,
};
use chron_core::enums::{EntityKind, Operation};
use chron_core::ids;
use chron_schema::{SchemaError, SchemaRegistry};
use serde_json::Value;

use crate::error::RecordError;

/// Builds change records from capture events.
pub struct Recorder {
    /// Present in strict mode: row images are checked against their table's
    /// schema before recording.
    schemas: Option<SchemaRegistry>,
}

impl Recorder {
    #[must_use]
    pub fn new(strict_validation: bool) -> Self {
        Self {
            schemas: strict_validation.then(SchemaRegistry::new),
        }
    }

    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.schemas.is_some()
    }

    /// Record `event` as part of `change_set`.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::UnknownKind` for untracked source tables and
    /// `RecordError::MalformedEvent` when the images do not fit the operation
    /// or the kind's attribute types.
    pub fn record(
        &self,
        change_set: &ChangeSet,
        event: &RawChangeEvent,
    ) -> Result<ChangeRecord, RecordError> {
        let position = event.log_position;
        let kind =
            EntityKind::from_source_table(&event.kind).ok_or_else(|| RecordError::UnknownKind {
                table: event.kind.clone(),
                position,
            })?;

        let before = required_image(
            event,
            "before",
            event.operation.has_before_image(),
            event.before_image.as_ref(),
        )?;
        let after = required_image(
            event,
            "after",
            event.operation.has_after_image(),
            event.after_image.as_ref(),
        )?;

        if let Some(ref schemas) = self.schemas {
            for image in before.iter().chain(after.iter()) {
                validate(schemas, kind, event, image)?;
            }
        }

        let identity = if event.operation == Operation::Delete { before } else { after };
        let entity_id = identity
            .and_then(|img| img.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RecordError::malformed(position, format!("{kind} row has no string id"))
            })?
            .to_string();

        let change = match kind {
            EntityKind::Resource => {
                EntityChange::Resource(resource_change(event, &entity_id, before, after)?)
            }
            _ => {
                let mut attributes = serde_json::Map::new();
                for &column in kind.tracked_attributes() {
                    if let Some(pair) = attribute_pair(event, column, before, after) {
                        attributes.insert(column.to_string(), pair);
                    }
                }
                EntityChange::from_attributes(kind, attributes)
                    .map_err(|e| RecordError::malformed(position, e.to_string()))?
            }
        };

        Ok(ChangeRecord {
            id: ids::record_id(position),
            change_set_id: change_set.id.clone(),
            sequence_number: event.sequence,
            operation: event.operation,
            entity_id,
            change,
        })
    }
}

fn validate(
    schemas: &SchemaRegistry,
    kind: EntityKind,
    event: &RawChangeEvent,
    image: &RowImage,
) -> Result<(), RecordError> {
    match schemas.validate_row(kind, image) {
        Ok(()) => Ok(()),
        Err(SchemaError::ValidationFailed { errors }) => {
            tracing::warn!(
                position = %event.log_position,
                transaction = %event.transaction_id,
                %kind,
                ?errors,
                "row image failed schema validation"
            );
            Err(RecordError::malformed(
                event.log_position,
                format!("{kind} row image failed validation: {}", errors.join("; ")),
            ))
        }
        Err(other) => Err(other.into()),
    }
}

/// The image the operation requires, as a row. `Ok(None)` when the operation
/// does not use this side.
fn required_image<'a>(
    event: &'a RawChangeEvent,
    side: &str,
    required: bool,
    image: Option<&'a RowImage>,
) -> Result<Option<&'a RowImage>, RecordError> {
    match (required, image) {
        (false, _) => Ok(None),
        (true, Some(image)) => Ok(Some(image)),
        (true, None) => Err(RecordError::malformed(
            event.log_position,
            format!("{} event without {side} image", event.operation),
        )),
    }
}

/// The `{previous, next}` pair for one column, or `None` when the column is
/// unchanged. SQL NULL is an absent side.
fn attribute_pair(
    event: &RawChangeEvent,
    column: &str,
    before: Option<&RowImage>,
    after: Option<&RowImage>,
) -> Option<Value> {
    if event.operation == Operation::Update && !event.mask_allows(column) {
        return None;
    }
    let side = |image: Option<&RowImage>| {
        image
            .and_then(|img| img.get(column))
            .filter(|v| !v.is_null())
            .cloned()
    };
    let change = AttributeChange::from_images(event.operation, side(before), side(after));
    if change.is_empty() {
        return None;
    }
    let mut pair = serde_json::Map::new();
    if let Some(previous) = change.previous {
        pair.insert("previous".into(), previous);
    }
    if let Some(next) = change.next {
        pair.insert("next".into(), next);
    }
    Some(Value::Object(pair))
}

fn resource_change(
    event: &RawChangeEvent,
    entity_id: &str,
    before: Option<&RowImage>,
    after: Option<&RowImage>,
) -> Result<ResourceChange, RecordError> {
    let text = |column: &str| -> Result<Option<String>, RecordError> {
        let value = after
            .and_then(|img| img.get(column))
            .filter(|v| !v.is_null())
            .or_else(|| before.and_then(|img| img.get(column)).filter(|v| !v.is_null()));
        match value {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(RecordError::malformed(
                event.log_position,
                format!("resource column {column} is not text: {other}"),
            )),
        }
    };
    let resource_type_id = text("resource_type_id")?;
    let Some(type_name) = text("resource_type_full_name")? else {
        return Err(RecordError::malformed(
            event.log_position,
            format!("resource {entity_id} has no resource_type_full_name"),
        ));
    };

    let property_changes = DiffDocument::from_images(
        entity_id,
        type_name.as_str(),
        event.operation,
        before,
        after,
        event.update_mask.as_ref(),
    );
    Ok(ResourceChange {
        resource_type_id,
        resource_type_full_name: Some(type_name),
        property_changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chron_core::capture::LogPosition;
    use chron_core::diff::{PropertyDelta, PropertyValue};
    use chron_core::entities::{NamedUriChange, ScalarPropertyChange};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn image(value: serde_json::Value) -> RowImage {
        value.as_object().cloned().unwrap()
    }

    fn change_set() -> ChangeSet {
        ChangeSet {
            id: ids::change_set_id(LogPosition::new(9)),
            transaction_id: "tx-1".into(),
            commit_position: LogPosition::new(9),
            created_at: Utc::now(),
        }
    }

    fn event(
        table: &str,
        operation: Operation,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> RawChangeEvent {
        RawChangeEvent {
            transaction_id: "tx-1".into(),
            log_position: LogPosition::new(4),
            sequence: 2,
            kind: table.into(),
            operation,
            before_image: before.map(image),
            after_image: after.map(image),
            update_mask: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn predicate_insert_records_next_values_only() {
        let ev = event(
            "predicates",
            Operation::Insert,
            None,
            Some(json!({"id": "prd-1", "name": "cites", "uri": null})),
        );
        let record = Recorder::new(false).record(&change_set(), &ev).unwrap();
        assert_eq!(record.id, ids::record_id(LogPosition::new(4)));
        assert_eq!(record.change_set_id, change_set().id);
        assert_eq!(record.sequence_number, 2);
        assert_eq!(record.entity_id, "prd-1");
        assert_eq!(
            record.change,
            EntityChange::Predicate(NamedUriChange {
                name: AttributeChange {
                    previous: None,
                    next: Some("cites".into()),
                },
                uri: AttributeChange::default(),
            })
        );
    }

    #[test]
    fn update_omits_unchanged_attributes() {
        let ev = event(
            "scalar_properties",
            Operation::Update,
            Some(json!({"id": "scp-1", "name": "Title", "nullable": true, "max_length": 256})),
            Some(json!({"id": "scp-1", "name": "Title", "nullable": false, "max_length": 256})),
        );
        let record = Recorder::new(false).record(&change_set(), &ev).unwrap();
        assert_eq!(
            record.change,
            EntityChange::ScalarProperty(ScalarPropertyChange {
                nullable: AttributeChange {
                    previous: Some(true),
                    next: Some(false),
                },
                ..ScalarPropertyChange::default()
            })
        );
    }

    #[test]
    fn update_mask_hides_unlisted_columns() {
        let mut ev = event(
            "predicates",
            Operation::Update,
            Some(json!({"id": "prd-1", "name": "cites", "uri": "urn:a"})),
            Some(json!({"id": "prd-1", "name": "quotes", "uri": "urn:b"})),
        );
        ev.update_mask = Some(["uri".to_string()].into_iter().collect());
        let record = Recorder::new(false).record(&change_set(), &ev).unwrap();
        let EntityChange::Predicate(change) = record.change else {
            panic!("expected predicate change");
        };
        assert!(change.name.is_empty());
        assert_eq!(change.uri.next.as_deref(), Some("urn:b"));
    }

    #[test]
    fn delete_takes_identity_from_before_image() {
        let ev = event(
            "relationship_properties",
            Operation::Delete,
            Some(json!({
                "id": "rlp-1",
                "relationship_id": "rel-1",
                "property_id": "prp-1",
                "value": ""
            })),
            None,
        );
        let record = Recorder::new(false).record(&change_set(), &ev).unwrap();
        assert_eq!(record.entity_id, "rlp-1");
        assert!(record.check_presence().is_ok());
        let refs = record.change.references().unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn resource_update_builds_diff_document() {
        let ev = event(
            "resources",
            Operation::Update,
            Some(json!({
                "id": "res-1",
                "resource_type_id": "rt-lecture",
                "resource_type_full_name": "Zentity.ScholarlyWorks.Lecture",
                "Title": "Lecture1",
                "Abstract": null
            })),
            Some(json!({
                "id": "res-1",
                "resource_type_id": "rt-lecture",
                "resource_type_full_name": "Zentity.ScholarlyWorks.Lecture",
                "Title": "Lecture1",
                "Abstract": ""
            })),
        );
        let record = Recorder::new(false).record(&change_set(), &ev).unwrap();
        let EntityChange::Resource(resource) = record.change else {
            panic!("expected resource change");
        };
        assert_eq!(resource.resource_type_id.as_deref(), Some("rt-lecture"));
        let diff = resource.property_changes;
        assert_eq!(diff.resource_type, "Zentity.ScholarlyWorks.Lecture");
        assert_eq!(
            diff.property("Title").unwrap().delta(Operation::Update),
            PropertyDelta::Unchanged
        );
        assert_eq!(
            diff.property("Abstract").unwrap().delta(Operation::Update),
            PropertyDelta::Set {
                previous: PropertyValue::Null,
                next: PropertyValue::Text(String::new()),
            }
        );
    }

    #[test]
    fn unknown_table_is_rejected() {
        let ev = event("sessions", Operation::Insert, None, Some(json!({"id": "s-1"})));
        let result = Recorder::new(false).record(&change_set(), &ev);
        assert!(matches!(
            result,
            Err(RecordError::UnknownKind { ref table, .. }) if table == "sessions"
        ));
    }

    #[rstest]
    #[case::insert_without_after(Operation::Insert, Some(json!({"id": "prd-1"})), None)]
    #[case::delete_without_before(Operation::Delete, None, Some(json!({"id": "prd-1"})))]
    #[case::update_without_before(Operation::Update, None, Some(json!({"id": "prd-1"})))]
    #[case::missing_id(Operation::Insert, None, Some(json!({"name": "cites"})))]
    #[case::numeric_id(Operation::Insert, None, Some(json!({"id": 7, "name": "cites"})))]
    #[case::wrong_type(Operation::Insert, None, Some(json!({"id": "prd-1", "name": 12})))]
    fn malformed_events_are_rejected(
        #[case] operation: Operation,
        #[case] before: Option<serde_json::Value>,
        #[case] after: Option<serde_json::Value>,
    ) {
        let ev = event("predicates", operation, before, after);
        let result = Recorder::new(false).record(&change_set(), &ev);
        assert!(
            matches!(result, Err(RecordError::MalformedEvent { .. })),
            "expected malformed event, got {result:?}"
        );
    }

    #[rstest]
    #[case::insert_without_column(
        Operation::Insert,
        None,
        Some(json!({"id": "res-1", "resource_type_id": "rt-lecture", "Title": "Lecture1"}))
    )]
    #[case::delete_with_null_column(
        Operation::Delete,
        Some(json!({"id": "res-1", "resource_type_full_name": null, "Title": "Lecture1"})),
        None
    )]
    fn resource_without_type_name_is_malformed(
        #[case] operation: Operation,
        #[case] before: Option<serde_json::Value>,
        #[case] after: Option<serde_json::Value>,
    ) {
        let ev = event("resources", operation, before, after);
        let result = Recorder::new(false).record(&change_set(), &ev);
        assert!(
            matches!(result, Err(RecordError::MalformedEvent { .. })),
            "expected malformed event, got {result:?}"
        );
    }

    #[test]
    fn strict_mode_checks_columns_the_record_skips() {
        // `uri` is unchanged, so the lenient recorder never reads its type.
        let ev = event(
            "predicates",
            Operation::Update,
            Some(json!({"id": "prd-1", "name": "cites", "uri": 5})),
            Some(json!({"id": "prd-1", "name": "quotes", "uri": 5})),
        );
        assert!(Recorder::new(false).record(&change_set(), &ev).is_ok());

        let strict = Recorder::new(true);
        assert!(strict.is_strict());
        assert!(matches!(
            strict.record(&change_set(), &ev),
            Err(RecordError::MalformedEvent { .. })
        ));
    }
}
