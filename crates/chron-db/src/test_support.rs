//! Shared test utilities for chron-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use chron_config::QueryConfig;
    use chron_core::capture::{LogPosition, RowImage};
    use chron_core::diff::DiffDocument;
    use chron_core::entities::{
        AttributeChange, ChangeRecord, ChangeSet, EntityChange, RelationshipChange, ResourceChange,
    };
    use chron_core::enums::Operation;
    use chron_core::ids;
    use chrono::{DateTime, Duration, Utc};

    use crate::capture::LibsqlCaptureSource;
    use crate::repos::ChangeSetBatch;
    use crate::store::ChangeStore;

    /// In-memory history store with default page sizes.
    pub async fn test_store() -> ChangeStore {
        ChangeStore::open_local(":memory:", QueryConfig::default())
            .await
            .unwrap()
    }

    /// In-memory capture source with capture enabled.
    pub async fn test_capture() -> LibsqlCaptureSource {
        use chron_core::source::CaptureAdmin;
        let source = LibsqlCaptureSource::open_local(":memory:").await.unwrap();
        source.enable_capture(":memory:").await.unwrap();
        source
    }

    pub fn image(value: serde_json::Value) -> RowImage {
        value.as_object().cloned().unwrap()
    }

    /// Fixed base time; `minutes` offsets keep change sets in a known order.
    pub fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2009-04-02T22:05:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    pub fn change_set(commit: i64, tx: &str, minutes: i64) -> ChangeSet {
        let commit_position = LogPosition::new(commit);
        ChangeSet {
            id: ids::change_set_id(commit_position),
            transaction_id: tx.to_string(),
            commit_position,
            created_at: at(minutes),
        }
    }

    /// Resource record for an insert with one `Title` property.
    pub fn resource_insert(
        cs: &ChangeSet,
        position: i64,
        sequence: i64,
        id: &str,
        title: &str,
    ) -> ChangeRecord {
        let after = image(serde_json::json!({
            "id": id,
            "resource_type_id": "rt-lecture",
            "resource_type_full_name": "Zentity.ScholarlyWorks.Lecture",
            "Title": title
        }));
        ChangeRecord {
            id: ids::record_id(LogPosition::new(position)),
            change_set_id: cs.id.clone(),
            sequence_number: sequence,
            operation: Operation::Insert,
            entity_id: id.to_string(),
            change: EntityChange::Resource(ResourceChange {
                resource_type_id: Some("rt-lecture".into()),
                resource_type_full_name: Some("Zentity.ScholarlyWorks.Lecture".into()),
                property_changes: DiffDocument::from_images(
                    id,
                    "Zentity.ScholarlyWorks.Lecture",
                    Operation::Insert,
                    None,
                    Some(&after),
                    None,
                ),
            }),
        }
    }

    /// Relationship record linking `subject` to `object` via `predicate`.
    pub fn relationship(
        cs: &ChangeSet,
        position: i64,
        sequence: i64,
        operation: Operation,
        id: &str,
        subject: &str,
        object: &str,
    ) -> ChangeRecord {
        let (before, after) = match operation {
            Operation::Insert => (None, Some(())),
            Operation::Delete => (Some(()), None),
            Operation::Update => (Some(()), Some(())),
        };
        let side = |present: Option<()>, value: &str| present.map(|()| value.to_string());
        ChangeRecord {
            id: ids::record_id(LogPosition::new(position)),
            change_set_id: cs.id.clone(),
            sequence_number: sequence,
            operation,
            entity_id: id.to_string(),
            change: EntityChange::Relationship(RelationshipChange {
                subject_resource_id: AttributeChange::from_images(
                    operation,
                    side(before, subject),
                    side(after, subject),
                ),
                object_resource_id: AttributeChange::from_images(
                    operation,
                    side(before, object),
                    side(after, object),
                ),
                predicate_id: AttributeChange::from_images(
                    operation,
                    side(before, "prd-author"),
                    side(after, "prd-author"),
                ),
                ..RelationshipChange::default()
            }),
        }
    }

    pub fn batch(change_set: ChangeSet, records: Vec<ChangeRecord>) -> ChangeSetBatch {
        ChangeSetBatch { change_set, records }
    }
}
