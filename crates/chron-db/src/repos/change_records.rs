//! Change record queries.
//!
//! Supports dynamic filtering by change set, entity, kind, operation, time
//! range, and referenced entity, with keyset paging.

use chron_core::diff::DiffDocument;
use chron_core::entities::{ChangeRecord, EntityChange, ResourceChange};
use chron_core::enums::{EntityKind, Operation};
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::helpers::{format_timestamp, get_opt_string, parse_optional_object};
use crate::repos::paging::{Page, PageCursor, PageRequest};
use crate::store::ChangeStore;

/// Filter criteria for change record queries.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub change_set_id: Option<String>,
    pub entity_id: Option<String>,
    pub kind: Option<EntityKind>,
    pub operation: Option<Operation>,
    /// Inclusive lower bound on the change set's `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the change set's `created_at`.
    pub until: Option<DateTime<Utc>>,
    /// Records holding this id in a reference attribute, on either side.
    pub references: Option<String>,
    /// Narrows `references` to one attribute, e.g. `subject_resource_id`.
    pub reference_attribute: Option<String>,
}

pub(crate) const RECORD_COLUMNS: &str =
    "r.id, r.change_set_id, r.sequence_number, r.operation_id, r.kind, r.entity_id, r.attributes,
     r.resource_type_id, r.resource_type_full_name, r.property_changes, cs.created_at";

/// Parse a row selected with [`RECORD_COLUMNS`] into a record and its cursor.
pub(crate) fn row_to_record(
    row: &libsql::Row,
) -> Result<(ChangeRecord, PageCursor), DatabaseError> {
    let id = row.get::<String>(0)?;
    let change_set_id = row.get::<String>(1)?;
    let sequence_number = row.get::<i64>(2)?;
    let operation = Operation::from_id(row.get::<i64>(3)?)?;
    let kind: EntityKind = row.get::<String>(4)?.parse()?;

    let change = if kind == EntityKind::Resource {
        let encoded = get_opt_string(row, 9)?.ok_or_else(|| {
            DatabaseError::InvalidState(format!("resource record {id} has no property changes"))
        })?;
        EntityChange::Resource(ResourceChange {
            resource_type_id: get_opt_string(row, 7)?,
            resource_type_full_name: get_opt_string(row, 8)?,
            property_changes: DiffDocument::decode(&encoded)?,
        })
    } else {
        let attributes =
            parse_optional_object(get_opt_string(row, 6)?.as_deref())?.unwrap_or_default();
        EntityChange::from_attributes(kind, attributes)?
    };

    let cursor = PageCursor::from_key(&row.get::<String>(10)?, &change_set_id, sequence_number);
    Ok((
        ChangeRecord {
            id,
            change_set_id,
            sequence_number,
            operation,
            entity_id: row.get::<String>(5)?,
            change,
        },
        cursor,
    ))
}

impl ChangeStore {
    /// Fetch one change record by id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or the stored row is corrupt.
    pub async fn get_change_record(&self, id: &str) -> Result<Option<ChangeRecord>, DatabaseError> {
        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM change_records r
                     JOIN change_sets cs ON cs.id = r.change_set_id
                     WHERE r.id = ?1"
                ),
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_record(&row)?.0)),
            None => Ok(None),
        }
    }

    /// Page through change records matching `filter` in
    /// `(created_at, change_set_id, sequence_number)` order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidCursor` for a malformed cursor, or
    /// `DatabaseError` if the query fails.
    pub async fn change_records(
        &self,
        filter: &RecordFilter,
        page: &PageRequest,
    ) -> Result<Page<ChangeRecord>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref cs) = filter.change_set_id {
            params.push(libsql::Value::Text(cs.clone()));
            conditions.push(format!("r.change_set_id = ?{}", params.len()));
        }
        if let Some(ref eid) = filter.entity_id {
            params.push(libsql::Value::Text(eid.clone()));
            conditions.push(format!("r.entity_id = ?{}", params.len()));
        }
        if let Some(kind) = filter.kind {
            params.push(libsql::Value::Text(kind.as_str().to_string()));
            conditions.push(format!("r.kind = ?{}", params.len()));
        }
        if let Some(op) = filter.operation {
            params.push(libsql::Value::Integer(op.id()));
            conditions.push(format!("r.operation_id = ?{}", params.len()));
        }
        if let Some(ref since) = filter.since {
            params.push(libsql::Value::Text(format_timestamp(since)));
            conditions.push(format!("cs.created_at >= ?{}", params.len()));
        }
        if let Some(ref until) = filter.until {
            params.push(libsql::Value::Text(format_timestamp(until)));
            conditions.push(format!("cs.created_at < ?{}", params.len()));
        }
        if let Some(ref referenced) = filter.references {
            params.push(libsql::Value::Text(referenced.clone()));
            let mut clause = format!(
                "EXISTS (SELECT 1 FROM change_references cr
                         WHERE cr.record_id = r.id AND cr.referenced_id = ?{}",
                params.len()
            );
            if let Some(ref attribute) = filter.reference_attribute {
                params.push(libsql::Value::Text(attribute.clone()));
                clause.push_str(&format!(" AND cr.attribute = ?{}", params.len()));
            }
            clause.push(')');
            conditions.push(clause);
        }
        if let Some(ref cursor) = page.after {
            let key = cursor.key()?;
            params.push(libsql::Value::Text(key.created_at));
            let created = params.len();
            params.push(libsql::Value::Text(key.change_set_id));
            let change_set = params.len();
            params.push(libsql::Value::Integer(key.sequence_number));
            let sequence = params.len();
            conditions.push(format!(
                "(cs.created_at, r.change_set_id, r.sequence_number)
                 > (?{created}, ?{change_set}, ?{sequence})"
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let size = self.page_size(page.size);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM change_records r
             JOIN change_sets cs ON cs.id = r.change_set_id
             {where_clause}
             ORDER BY cs.created_at, r.change_set_id, r.sequence_number
             LIMIT {}",
            size + 1
        );

        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_record(&row)?);
        }
        Ok(Page::from_overfetch(items, size))
    }

    /// Other records of `kind` in the change set that holds `record_id`, in
    /// sequence order. Returns `None` when `record_id` is unknown.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn records_in_same_change_set(
        &self,
        record_id: &str,
        kind: EntityKind,
    ) -> Result<Option<Vec<ChangeRecord>>, DatabaseError> {
        let Some(anchor) = self.get_change_record(record_id).await? else {
            return Ok(None);
        };

        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM change_records r
                     JOIN change_sets cs ON cs.id = r.change_set_id
                     WHERE r.change_set_id = ?1 AND r.kind = ?2 AND r.id != ?3
                     ORDER BY r.sequence_number"
                ),
                libsql::params![anchor.change_set_id.as_str(), kind.as_str(), record_id],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?.0);
        }
        Ok(Some(records))
    }
}
