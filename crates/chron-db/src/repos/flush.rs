//! Atomic, idempotent change set flush.

use chron_core::capture::{CaptureGap, LogPosition};
use chron_core::entities::{ChangeRecord, ChangeSet, EntityChange};
use chron_core::errors::CoreError;
use chron_core::ids;
use chrono::Utc;

use crate::error::DatabaseError;
use crate::helpers::{format_timestamp, to_json_text};
use crate::store::ChangeStore;

/// A change set with every record produced for its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetBatch {
    pub change_set: ChangeSet,
    pub records: Vec<ChangeRecord>,
}

impl ChangeSetBatch {
    /// Check that every record belongs to the change set, carries a unique
    /// sequence number, and follows the insert/delete presence rules.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` describing the first violation.
    pub fn check(&self) -> Result<(), CoreError> {
        let mut sequences = std::collections::HashSet::new();
        for record in &self.records {
            if record.change_set_id != self.change_set.id {
                return Err(CoreError::Validation(format!(
                    "record {} belongs to {}, not {}",
                    record.id, record.change_set_id, self.change_set.id
                )));
            }
            if !sequences.insert(record.sequence_number) {
                return Err(CoreError::Validation(format!(
                    "duplicate sequence number {} in {}",
                    record.sequence_number, self.change_set.id
                )));
            }
            record.check_presence()?;
        }
        Ok(())
    }
}

/// Result of [`ChangeStore::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The change set and all its records were written.
    Flushed { records: usize },
    /// A change set for the transaction already existed; nothing was written.
    ///
    /// `missing` lists the batch's record ids that the stored history does
    /// not contain. It is empty for a plain redelivery.
    AlreadyFlushed { missing: Vec<String> },
}

impl FlushOutcome {
    /// True when the batch carried records the stored change set lacks.
    #[must_use]
    pub fn has_late_records(&self) -> bool {
        matches!(self, Self::AlreadyFlushed { missing } if !missing.is_empty())
    }
}

impl ChangeStore {
    /// Write a change set, its records, their reference rows, and the new
    /// checkpoint in one transaction.
    ///
    /// Flushing a transaction whose change set is already stored writes
    /// nothing and returns [`FlushOutcome::AlreadyFlushed`] with the ids of
    /// any batch records the stored history lacks. Readers of this store
    /// never observe a change set without all of its records.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Core` if the batch fails [`ChangeSetBatch::check`],
    /// or `DatabaseError` if any statement fails (the transaction is rolled back).
    pub async fn flush(
        &self,
        batch: &ChangeSetBatch,
        source: &str,
        checkpoint: LogPosition,
    ) -> Result<FlushOutcome, DatabaseError> {
        batch.check()?;

        let _write = self.write_gate().await;
        let tx = self.db().conn().transaction().await?;
        match write_batch(&tx, batch, source, checkpoint).await {
            Ok(outcome @ FlushOutcome::AlreadyFlushed { .. }) => {
                tx.rollback().await?;
                tracing::warn!(
                    change_set = %batch.change_set.id,
                    transaction = %batch.change_set.transaction_id,
                    late_records = outcome.has_late_records(),
                    "change set already flushed; skipping"
                );
                Ok(outcome)
            }
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Persist a capture gap and advance the checkpoint in one transaction.
    ///
    /// Returns `false` when the gap was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if any statement fails.
    pub async fn record_gap(
        &self,
        source: &str,
        gap: &CaptureGap,
        checkpoint: LogPosition,
    ) -> Result<bool, DatabaseError> {
        let _write = self.write_gate().await;
        let tx = self.db().conn().transaction().await?;
        let result = async {
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO capture_gaps
                        (id, source, after_position, through_position, reason, detail, detected_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    libsql::params![
                        ids::gap_id(gap.through),
                        source,
                        gap.after.get(),
                        gap.through.get(),
                        gap.reason.as_str(),
                        gap.detail.as_str(),
                        format_timestamp(&Utc::now())
                    ],
                )
                .await?;
            upsert_checkpoint(&tx, source, checkpoint).await?;
            Ok::<_, DatabaseError>(inserted > 0)
        }
        .await;

        match result {
            Ok(inserted) => {
                tx.commit().await?;
                Ok(inserted)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

async fn write_batch(
    conn: &libsql::Connection,
    batch: &ChangeSetBatch,
    source: &str,
    checkpoint: LogPosition,
) -> Result<FlushOutcome, DatabaseError> {
    let cs = &batch.change_set;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO change_sets (id, transaction_id, commit_position, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                cs.id.as_str(),
                cs.transaction_id.as_str(),
                cs.commit_position.get(),
                format_timestamp(&cs.created_at)
            ],
        )
        .await?;
    if inserted == 0 {
        let missing = missing_records(conn, &batch.records).await?;
        return Ok(FlushOutcome::AlreadyFlushed { missing });
    }

    for record in &batch.records {
        insert_record(conn, record).await?;
        tracing::debug!(
            record = %record.id,
            kind = %record.kind(),
            operation = %record.operation,
            entity = %record.entity_id,
            "recorded change"
        );
    }

    upsert_checkpoint(conn, source, checkpoint).await?;
    Ok(FlushOutcome::Flushed {
        records: batch.records.len(),
    })
}

/// Ids of `records` with no stored row.
async fn missing_records(
    conn: &libsql::Connection,
    records: &[ChangeRecord],
) -> Result<Vec<String>, DatabaseError> {
    let mut missing = Vec::new();
    for record in records {
        let mut rows = conn
            .query(
                "SELECT 1 FROM change_records WHERE id = ?1",
                libsql::params![record.id.as_str()],
            )
            .await?;
        if rows.next().await?.is_none() {
            missing.push(record.id.clone());
        }
    }
    Ok(missing)
}

async fn insert_record(
    conn: &libsql::Connection,
    record: &ChangeRecord,
) -> Result<(), DatabaseError> {
    let (attributes, resource_type_id, resource_type_full_name, property_changes) =
        match &record.change {
            EntityChange::Resource(r) => (
                None,
                r.resource_type_id.clone(),
                r.resource_type_full_name.clone(),
                Some(r.property_changes.encode()?),
            ),
            other => {
                let attrs = other.attributes().map_err(|e| {
                    DatabaseError::Query(format!("Failed to serialize attributes: {e}"))
                })?;
                (Some(to_json_text(&attrs)?), None, None, None)
            }
        };

    conn.execute(
        "INSERT INTO change_records
            (id, change_set_id, sequence_number, operation_id, kind, entity_id,
             attributes, resource_type_id, resource_type_full_name, property_changes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        libsql::params![
            record.id.as_str(),
            record.change_set_id.as_str(),
            record.sequence_number,
            record.operation.id(),
            record.kind().as_str(),
            record.entity_id.as_str(),
            attributes,
            resource_type_id,
            resource_type_full_name,
            property_changes
        ],
    )
    .await?;

    let references = record
        .change
        .references()
        .map_err(|e| DatabaseError::Query(format!("Failed to read references: {e}")))?;
    for reference in references {
        conn.execute(
            "INSERT INTO change_references (record_id, attribute, side, referenced_id)
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                record.id.as_str(),
                reference.attribute,
                reference.side.as_str(),
                reference.referenced_id
            ],
        )
        .await?;
    }
    Ok(())
}

/// Move the checkpoint for `source` forward. Never moves it backwards.
pub(crate) async fn upsert_checkpoint(
    conn: &libsql::Connection,
    source: &str,
    position: LogPosition,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pipeline_checkpoints (source, position, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(source) DO UPDATE SET
            position = MAX(position, excluded.position),
            updated_at = excluded.updated_at",
        libsql::params![source, position.get(), format_timestamp(&Utc::now())],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::repos::{PageRequest, RecordFilter};
    use crate::test_support::helpers::{
        batch, change_set, relationship, resource_insert, test_store,
    };
    use chron_core::enums::Operation;
    use pretty_assertions::assert_eq;

    async fn count(store: &ChangeStore, table: &str) -> i64 {
        let mut rows = store
            .db()
            .conn()
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn flush_writes_change_set_records_and_references() {
        let store = test_store().await;
        let cs = change_set(5, "tx-1", 0);
        let records = vec![
            resource_insert(&cs, 1, 1, "res-a", "Lecture1"),
            resource_insert(&cs, 2, 2, "res-b", "Lecture2"),
            relationship(&cs, 3, 3, Operation::Insert, "rel-1", "res-a", "res-b"),
        ];

        let outcome = store
            .flush(&batch(cs.clone(), records), "default", LogPosition::new(5))
            .await
            .unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed { records: 3 });
        assert_eq!(store.get_change_set(&cs.id).await.unwrap(), Some(cs));
        assert_eq!(count(&store, "change_records").await, 3);
        // subject, object, predicate on the next side only
        assert_eq!(count(&store, "change_references").await, 3);
        assert_eq!(store.checkpoint("default").await.unwrap(), LogPosition::new(5));
    }

    #[tokio::test]
    async fn reflushing_a_change_set_is_a_noop() {
        let store = test_store().await;
        let cs = change_set(5, "tx-1", 0);
        let b = batch(cs.clone(), vec![resource_insert(&cs, 1, 1, "res-a", "Lecture1")]);

        store.flush(&b, "default", LogPosition::new(5)).await.unwrap();
        let again = store.flush(&b, "default", LogPosition::new(5)).await.unwrap();
        assert_eq!(again, FlushOutcome::AlreadyFlushed { missing: vec![] });
        assert!(!again.has_late_records());
        assert_eq!(count(&store, "change_sets").await, 1);
        assert_eq!(count(&store, "change_records").await, 1);
    }

    #[tokio::test]
    async fn reflushing_a_transaction_with_new_records_lists_them() {
        let store = test_store().await;
        let first = change_set(5, "tx-1", 0);
        store
            .flush(
                &batch(first.clone(), vec![resource_insert(&first, 1, 1, "res-a", "A")]),
                "default",
                LogPosition::new(5),
            )
            .await
            .unwrap();

        // Same transaction again, now with an event the stored change set lacks.
        let later = change_set(7, "tx-1", 1);
        let records = vec![
            resource_insert(&later, 1, 1, "res-a", "A"),
            resource_insert(&later, 6, 2, "res-b", "B"),
        ];
        let outcome = store
            .flush(&batch(later.clone(), records), "default", LogPosition::new(7))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FlushOutcome::AlreadyFlushed {
                missing: vec![ids::record_id(LogPosition::new(6))],
            }
        );
        assert!(outcome.has_late_records());
        assert!(store.get_change_set(&later.id).await.unwrap().is_none());
        assert_eq!(count(&store, "change_records").await, 1);
        assert_eq!(store.checkpoint("default").await.unwrap(), LogPosition::new(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queries_never_observe_a_partial_change_set() {
        const RECORDS: usize = 400;

        let store = Arc::new(test_store().await);
        let cs = change_set(5_000, "tx-big", 0);
        let records = (1..=i64::try_from(RECORDS).unwrap())
            .map(|i| resource_insert(&cs, i, i, &format!("res-{i}"), "Title"))
            .collect();
        let big = batch(cs.clone(), records);

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store.flush(&big, "default", LogPosition::new(5_000)).await
            })
        };

        let filter = RecordFilter {
            change_set_id: Some(cs.id.clone()),
            ..RecordFilter::default()
        };
        let page = PageRequest {
            size: Some(1000),
            after: None,
        };
        let mut observed = Vec::new();
        loop {
            let finished = writer.is_finished();
            let change_set = store.get_change_set(&cs.id).await.unwrap();
            let seen = store.change_records(&filter, &page).await.unwrap().items.len();
            assert!(seen == 0 || seen == RECORDS, "observed {seen} of {RECORDS} records");
            if change_set.is_some() {
                assert_eq!(seen, RECORDS);
            }
            observed.push(seen);
            if finished {
                break;
            }
            tokio::task::yield_now().await;
        }

        let outcome = writer.await.unwrap().unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed { records: RECORDS });
        assert_eq!(observed.last(), Some(&RECORDS));
    }

    #[tokio::test]
    async fn failed_flush_leaves_nothing_behind() {
        let store = test_store().await;
        let first = change_set(5, "tx-1", 0);
        store
            .flush(
                &batch(first.clone(), vec![resource_insert(&first, 1, 1, "res-a", "A")]),
                "default",
                LogPosition::new(5),
            )
            .await
            .unwrap();

        // Second change set reuses record id rec-...01 and fails mid-transaction.
        let second = change_set(9, "tx-2", 1);
        let records = vec![
            resource_insert(&second, 6, 1, "res-b", "B"),
            resource_insert(&second, 1, 2, "res-c", "C"),
        ];
        let result = store
            .flush(&batch(second.clone(), records), "default", LogPosition::new(9))
            .await;
        assert!(result.is_err());

        assert!(store.get_change_set(&second.id).await.unwrap().is_none());
        assert_eq!(count(&store, "change_records").await, 1);
        assert_eq!(store.checkpoint("default").await.unwrap(), LogPosition::new(5));
    }

    #[tokio::test]
    async fn batch_check_rejects_presence_violations() {
        let store = test_store().await;
        let cs = change_set(5, "tx-1", 0);
        let mut bad = relationship(&cs, 1, 1, Operation::Update, "rel-1", "res-a", "res-b");
        bad.operation = Operation::Insert;
        if let EntityChange::Relationship(ref mut r) = bad.change {
            r.subject_resource_id.previous = Some("res-z".into());
        }

        let result = store
            .flush(&batch(cs.clone(), vec![bad]), "default", LogPosition::new(5))
            .await;
        assert!(matches!(result, Err(DatabaseError::Core(_))));
        assert!(store.get_change_set(&cs.id).await.unwrap().is_none());
    }

    #[test]
    fn batch_check_rejects_foreign_and_duplicate_records() {
        let cs = change_set(5, "tx-1", 0);
        let other = change_set(7, "tx-2", 0);
        let foreign = batch(cs.clone(), vec![resource_insert(&other, 1, 1, "res-a", "A")]);
        assert!(foreign.check().is_err());

        let dup = batch(
            cs.clone(),
            vec![
                resource_insert(&cs, 1, 1, "res-a", "A"),
                resource_insert(&cs, 2, 1, "res-b", "B"),
            ],
        );
        assert!(dup.check().is_err());
    }
}
