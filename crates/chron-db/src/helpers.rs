//! Row parsing and value formatting helpers.
//!
//! Every repo needs to convert `libsql::Row` (column-indexed) into typed
//! structs. These helpers isolate the parsing logic and fix the timestamp
//! format so that stored timestamps sort lexicographically.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DatabaseError;

/// Render a timestamp for storage.
///
/// Fixed-width RFC 3339 with microseconds and a `Z` suffix, so that string
/// order in SQL matches chronological order.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all chron-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for SQL NULL.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
/// Unlike history values, an empty string here is kept as `Some("")`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    Ok(row.get::<Option<String>>(idx)?)
}

/// Parse a nullable TEXT column holding a JSON object.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the text is not a JSON object.
pub fn parse_optional_object(
    s: Option<&str>,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, DatabaseError> {
    match s {
        None => Ok(None),
        Some(s) => match serde_json::from_str(s)
            .map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))?
        {
            serde_json::Value::Object(map) => Ok(Some(map)),
            other => Err(DatabaseError::Query(format!(
                "Expected a JSON object in column, found {other}"
            ))),
        },
    }
}

/// Serialize a value to a JSON TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if serialization fails.
pub fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value)
        .map_err(|e| DatabaseError::Query(format!("Failed to serialize column value: {e}")))
}
