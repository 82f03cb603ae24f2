//! Keyset paging for the change query API.
//!
//! Results are ordered by `(created_at, change_set_id, sequence_number)`.
//! A [`PageCursor`] records the last key returned so a caller can resume
//! from it later, even across restarts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Opaque resume point: `created|change_set_id|sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

/// Decoded cursor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CursorKey {
    pub created_at: String,
    pub change_set_id: String,
    pub sequence_number: i64,
}

impl PageCursor {
    pub(crate) fn from_key(created_at: &str, change_set_id: &str, sequence_number: i64) -> Self {
        Self(format!("{created_at}|{change_set_id}|{sequence_number}"))
    }

    pub(crate) fn key(&self) -> Result<CursorKey, DatabaseError> {
        let mut parts = self.0.splitn(3, '|');
        let (Some(created_at), Some(change_set_id), Some(sequence)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DatabaseError::InvalidCursor(self.0.clone()));
        };
        let sequence_number = sequence
            .parse::<i64>()
            .map_err(|_| DatabaseError::InvalidCursor(self.0.clone()))?;
        Ok(CursorKey {
            created_at: created_at.to_string(),
            change_set_id: change_set_id.to_string(),
            sequence_number,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PageCursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which page to fetch.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Items per page. Falls back to the configured default and is capped at
    /// the configured maximum.
    pub size: Option<u32>,
    /// Resume after this cursor. `None` starts from the beginning.
    pub after: Option<PageCursor>,
}

impl PageRequest {
    #[must_use]
    pub const fn first(size: u32) -> Self {
        Self {
            size: Some(size),
            after: None,
        }
    }

    #[must_use]
    pub fn after(size: u32, cursor: PageCursor) -> Self {
        Self {
            size: Some(size),
            after: Some(cursor),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when this is the last page.
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    /// Trim a `size + 1` fetch to `size` items and derive the next cursor from
    /// the last kept item.
    pub(crate) fn from_overfetch(
        mut items: Vec<(T, PageCursor)>,
        size: u32,
    ) -> Self {
        let has_more = items.len() > size as usize;
        items.truncate(size as usize);
        let next = if has_more {
            items.last().map(|(_, cursor)| cursor.clone())
        } else {
            None
        };
        Self {
            items: items.into_iter().map(|(item, _)| item).collect(),
            next,
        }
    }
}
