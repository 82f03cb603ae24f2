//! Change set queries.

use chron_core::capture::LogPosition;
use chron_core::entities::ChangeSet;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::helpers::{format_timestamp, parse_datetime};
use crate::repos::paging::{Page, PageCursor, PageRequest};
use crate::store::ChangeStore;

/// Filter criteria for change set queries.
#[derive(Debug, Default, Clone)]
pub struct ChangeSetFilter {
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
}

const CHANGE_SET_COLUMNS: &str = "id, transaction_id, commit_position, created_at";

fn row_to_change_set(row: &libsql::Row) -> Result<ChangeSet, DatabaseError> {
    Ok(ChangeSet {
        id: row.get::<String>(0)?,
        transaction_id: row.get::<String>(1)?,
        commit_position: LogPosition::new(row.get::<i64>(2)?),
        created_at: parse_datetime(&row.get::<String>(3)?)?,
    })
}

impl ChangeStore {
    /// Fetch a change set by id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn get_change_set(&self, id: &str) -> Result<Option<ChangeSet>, DatabaseError> {
        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {CHANGE_SET_COLUMNS} FROM change_sets WHERE id = ?1"),
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_change_set(&row)?)),
            None => Ok(None),
        }
    }

    /// Page through change sets in `(created_at, id)` order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidCursor` for a malformed cursor, or
    /// `DatabaseError` if the query fails.
    pub async fn change_sets(
        &self,
        filter: &ChangeSetFilter,
        page: &PageRequest,
    ) -> Result<Page<ChangeSet>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref since) = filter.since {
            params.push(libsql::Value::Text(format_timestamp(since)));
            conditions.push(format!("created_at >= ?{}", params.len()));
        }
        if let Some(ref until) = filter.until {
            params.push(libsql::Value::Text(format_timestamp(until)));
            conditions.push(format!("created_at < ?{}", params.len()));
        }
        if let Some(ref cursor) = page.after {
            let key = cursor.key()?;
            params.push(libsql::Value::Text(key.created_at));
            let created = params.len();
            params.push(libsql::Value::Text(key.change_set_id));
            conditions.push(format!("(created_at, id) > (?{created}, ?{})", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let size = self.page_size(page.size);
        let sql = format!(
            "SELECT {CHANGE_SET_COLUMNS} FROM change_sets {where_clause}
             ORDER BY created_at, id LIMIT {}",
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
            let cs = row_to_change_set(&row)?;
            let cursor = PageCursor::from_key(&format_timestamp(&cs.created_at), &cs.id, 0);
            items.push((cs, cursor));
        }
        Ok(Page::from_overfetch(items, size))
    }
}
