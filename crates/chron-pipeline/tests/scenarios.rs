//! End-to-end scenarios through the libSQL capture log.
//!
//! Each test captures upstream transactions with the reference writer, runs
//! pipeline cycles, and reads the history back through the query API:
//! - Resource insert, update, and delete diff documents
//! - Two mutations in one transaction
//! - Crash-and-retry reprocessing
//! - Completeness of flushed change sets
//! - Gaps from administrative actions

use std::path::Path;

use chron_config::{ChronConfig, QueryConfig};
use chron_core::capture::{LogPosition, RowImage};
use chron_core::diff::DiffDocument;
use chron_core::entities::{ChangeRecord, EntityChange};
use chron_core::enums::{EntityKind, GapReason, Operation};
use chron_core::source::{CaptureAdmin, CaptureSource};
use chron_db::capture::LibsqlCaptureSource;
use chron_db::repos::{ChangeSetFilter, PageRequest, RecordFilter};
use chron_db::store::ChangeStore;
use chron_pipeline::Pipeline;
use pretty_assertions::assert_eq;

const LECTURE: &str = "Zentity.ScholarlyWorks.Lecture";

async fn pipeline() -> Pipeline<LibsqlCaptureSource> {
    let source = LibsqlCaptureSource::open_local(":memory:").await.unwrap();
    source.enable_capture(":memory:").await.unwrap();
    let store = ChangeStore::open_local(":memory:", QueryConfig::default())
        .await
        .unwrap();
    let mut config = ChronConfig::default();
    config.capture.page_size = 2;
    Pipeline::new(source, store, &config)
}

fn lecture(id: &str, title: Option<&str>, date_added: Option<&str>) -> RowImage {
    serde_json::json!({
        "id": id,
        "resource_type_id": "rt-lecture",
        "resource_type_full_name": LECTURE,
        "Title": title,
        "DateAdded": date_added,
        "Abstract": null,
        "Language": null
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn named_row(id: &str, name: &str) -> RowImage {
    serde_json::json!({"id": id, "name": name}).as_object().cloned().unwrap()
}

async fn all_records(store: &ChangeStore) -> Vec<ChangeRecord> {
    store
        .change_records(&RecordFilter::default(), &PageRequest::first(1000))
        .await
        .unwrap()
        .items
}

fn diff(record: &ChangeRecord) -> &DiffDocument {
    match &record.change {
        EntityChange::Resource(r) => &r.property_changes,
        other => panic!("expected resource change, got {other:?}"),
    }
}

/// `(name, changed, previous, next)` for every diff entry.
fn entries(doc: &DiffDocument) -> Vec<(&str, bool, Option<&str>, Option<&str>)> {
    doc.properties
        .iter()
        .map(|p| (p.name.as_str(), p.changed, p.previous.as_deref(), p.next.as_deref()))
        .collect()
}

async fn create_lecture(pipeline: &Pipeline<LibsqlCaptureSource>) {
    let mut txn = pipeline.source().begin("tx-create");
    txn.insert("resources", lecture("res-1", Some("Lecture1"), Some("2009-04-02T22:05")))
        .await
        .unwrap();
    txn.commit().await.unwrap();
    pipeline.run_cycle().await.unwrap();
}

async fn revise_lecture(pipeline: &Pipeline<LibsqlCaptureSource>) {
    let mut txn = pipeline.source().begin("tx-revise");
    txn.update(
        "resources",
        lecture("res-1", Some("Lecture1"), Some("2009-04-02T22:05")),
        lecture("res-1", Some("Lecture1-revised"), Some("2009-04-02T22:05")),
        None,
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();
    pipeline.run_cycle().await.unwrap();
}

// ---------------------------------------------------------------------------
// Resource lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_resource_records_next_values_only() {
    let pipeline = pipeline().await;
    create_lecture(&pipeline).await;

    let records = all_records(pipeline.store()).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.operation, Operation::Insert);
    assert_eq!(record.kind(), EntityKind::Resource);
    assert_eq!(record.entity_id, "res-1");

    let doc = diff(record);
    assert_eq!(doc.resource_id, "res-1");
    assert_eq!(doc.resource_type, LECTURE);
    assert_eq!(
        entries(doc),
        vec![
            ("Abstract", false, None, None),
            ("DateAdded", true, None, Some("2009-04-02T22:05")),
            ("Language", false, None, None),
            ("Title", true, None, Some("Lecture1")),
        ]
    );
}

#[tokio::test]
async fn updated_title_is_the_only_change() {
    let pipeline = pipeline().await;
    create_lecture(&pipeline).await;
    revise_lecture(&pipeline).await;

    let records = all_records(pipeline.store()).await;
    assert_eq!(records.len(), 2);
    let update = &records[1];
    assert_eq!(update.operation, Operation::Update);
    assert_eq!(
        entries(diff(update)),
        vec![
            ("Abstract", false, None, None),
            ("DateAdded", false, None, None),
            ("Language", false, None, None),
            ("Title", true, Some("Lecture1"), Some("Lecture1-revised")),
        ]
    );
    let sets = pipeline
        .store()
        .change_sets(&ChangeSetFilter::default(), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(sets.items.len(), 2);
}

#[tokio::test]
async fn deleted_resource_records_last_known_state() {
    let pipeline = pipeline().await;
    create_lecture(&pipeline).await;
    revise_lecture(&pipeline).await;

    let mut txn = pipeline.source().begin("tx-delete");
    txn.delete(
        "resources",
        lecture("res-1", Some("Lecture1-revised"), Some("2009-04-02T22:05")),
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();
    pipeline.run_cycle().await.unwrap();

    let records = all_records(pipeline.store()).await;
    let delete = records.last().unwrap();
    assert_eq!(delete.operation, Operation::Delete);
    assert_eq!(
        entries(diff(delete)),
        vec![
            ("Abstract", false, None, None),
            ("DateAdded", true, Some("2009-04-02T22:05"), None),
            ("Language", false, None, None),
            ("Title", true, Some("Lecture1-revised"), None),
        ]
    );
    assert!(delete.check_presence().is_ok());
}

#[tokio::test]
async fn one_transaction_yields_one_change_set() {
    let pipeline = pipeline().await;
    let mut setup = pipeline.source().begin("tx-setup");
    setup
        .insert("resources", lecture("res-b", Some("Paper"), None))
        .await
        .unwrap();
    setup.commit().await.unwrap();
    pipeline.run_cycle().await.unwrap();

    let mut txn = pipeline.source().begin("tx-both");
    txn.insert("resources", lecture("res-a", Some("Lecture1"), None))
        .await
        .unwrap();
    txn.update(
        "resources",
        lecture("res-b", Some("Paper"), None),
        lecture("res-b", Some("Paper, 2nd ed."), None),
        Some(["Title".to_string()].into_iter().collect()),
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.change_sets_flushed, 1);
    assert_eq!(report.records_written, 2);

    let records = all_records(pipeline.store()).await;
    let both: Vec<&ChangeRecord> = records
        .iter()
        .filter(|r| r.change_set_id == records[1].change_set_id)
        .collect();
    assert_eq!(both.len(), 2);
    assert_eq!(
        both.iter()
            .map(|r| (r.sequence_number, r.entity_id.as_str(), r.operation))
            .collect::<Vec<_>>(),
        vec![(1, "res-a", Operation::Insert), (2, "res-b", Operation::Update)]
    );
}

// ---------------------------------------------------------------------------
// Reprocessing and completeness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reprocessing_after_a_crash_writes_nothing_twice() {
    let pipeline = pipeline().await;
    create_lecture(&pipeline).await;
    revise_lecture(&pipeline).await;
    let before = all_records(pipeline.store()).await;

    // A crash before the checkpoint was stored: the next cycle starts over.
    pipeline
        .store()
        .db()
        .conn()
        .execute("UPDATE pipeline_checkpoints SET position = 0", ())
        .await
        .unwrap();
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.change_sets_flushed, 0);
    assert_eq!(report.change_sets_skipped, 2);
    assert_eq!(all_records(pipeline.store()).await, before);
}

#[tokio::test]
async fn every_record_resolves_to_its_change_set() {
    let pipeline = pipeline().await;
    for n in 0..5 {
        let mut txn = pipeline.source().begin(format!("tx-{n}"));
        txn.insert("predicates", named_row(&format!("prd-{n}"), "cites"))
            .await
            .unwrap();
        txn.insert("properties", named_row(&format!("prp-{n}"), "weight"))
            .await
            .unwrap();
        txn.commit().await.unwrap();
    }
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.change_sets_flushed, 5);
    assert_eq!(report.items_read, 15);

    for record in all_records(pipeline.store()).await {
        let change_set = pipeline.store().get_change_set(&record.change_set_id).await.unwrap();
        assert!(change_set.is_some(), "{} has no change set", record.id);
    }
}

#[tokio::test]
async fn open_transaction_waits_for_its_commit() {
    let pipeline = pipeline().await;
    let mut open = pipeline.source().begin("tx-open");
    open.insert("predicates", named_row("prd-1", "cites"))
        .await
        .unwrap();

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.pending_transactions, 1);
    assert_eq!(report.checkpoint_after, LogPosition::ZERO);
    assert!(all_records(pipeline.store()).await.is_empty());

    open.insert("properties", named_row("prp-1", "weight"))
        .await
        .unwrap();
    open.commit().await.unwrap();
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.change_sets_flushed, 1);
    assert_eq!(report.records_written, 2);
}

// ---------------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retention_purge_is_recorded_as_a_gap() {
    let pipeline = pipeline().await;
    let mut txn = pipeline.source().begin("tx-lost");
    txn.insert("predicates", named_row("prd-1", "cites"))
        .await
        .unwrap();
    let commit = txn.commit().await.unwrap().unwrap();
    pipeline.source().purge_through(commit).await.unwrap();

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.gaps_recorded, 1);
    assert_eq!(report.change_sets_flushed, 0);
    assert_eq!(report.checkpoint_after, commit);

    let gaps = pipeline.store().gaps().await.unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].gap.reason, GapReason::RetentionCleanup);
    assert_eq!(gaps[0].gap.through, commit);

    // The gap is reported once; acknowledgement released it at the source.
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.gaps_recorded, 0);
    assert!(pipeline.source().poll_changes(LogPosition::ZERO, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn disabling_capture_is_recorded_as_a_gap() {
    let pipeline = pipeline().await;
    let mut txn = pipeline.source().begin("tx-1");
    txn.insert("predicates", named_row("prd-1", "cites"))
        .await
        .unwrap();
    txn.commit().await.unwrap();

    {
        let _cycle = pipeline.exclusive().await;
        pipeline.source().disable_capture().await.unwrap();
    }
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.gaps_recorded, 1);
    let gaps = pipeline.store().gaps().await.unwrap();
    assert_eq!(gaps[0].gap.reason, GapReason::CaptureDisabled);
}

// ---------------------------------------------------------------------------
// Restart
// ---------------------------------------------------------------------------

async fn open_in(dir: &Path) -> Pipeline<LibsqlCaptureSource> {
    let capture = dir.join("capture.db");
    let history = dir.join("history.db");
    let source = LibsqlCaptureSource::open_local(capture.to_str().unwrap())
        .await
        .unwrap();
    let store = ChangeStore::open_local(history.to_str().unwrap(), QueryConfig::default())
        .await
        .unwrap();
    Pipeline::new(source, store, &ChronConfig::default())
}

#[tokio::test]
async fn restart_resumes_from_the_stored_checkpoint() {
    let dir = tempfile::tempdir().unwrap();

    {
        let pipeline = open_in(dir.path()).await;
        pipeline.source().enable_capture("capture.db").await.unwrap();
        create_lecture(&pipeline).await;
    }

    let pipeline = open_in(dir.path()).await;
    revise_lecture(&pipeline).await;
    let records = all_records(pipeline.store()).await;
    assert_eq!(
        records.iter().map(|r| r.operation).collect::<Vec<_>>(),
        vec![Operation::Insert, Operation::Update]
    );
    assert_eq!(
        pipeline.store().checkpoint(pipeline.source_name()).await.unwrap(),
        LogPosition::new(4)
    );
}
