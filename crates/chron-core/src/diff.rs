//! Property diff documents for resource change records.
//!
//! Resources carry an open-ended property bag, so their change records do not
//! have fixed `previous`/`next` attribute pairs. Instead every resource change
//! carries one [`DiffDocument`] listing each scalar property of the resource
//! with an explicit `changed` flag and optional `previous`/`next` values.
//!
//! Presence rules, per entry:
//!
//! | operation | `previous`                      | `next`                          |
//! |-----------|---------------------------------|---------------------------------|
//! | insert    | never                           | absent = NULL, present = value  |
//! | delete    | absent = NULL, present = value  | never                           |
//! | update    | absent = NULL before            | absent = NULL after             |
//!
//! An update entry with `changed == false` carries no values at all: the value
//! is identical on both sides (or was a large object the source did not
//! re-emit). A present value is never NULL, and an empty string is a present
//! value. The JSON encoding keeps absent and `""` apart, so the document
//! survives encode/decode unchanged.

use std::collections::{BTreeSet, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capture::RowImage;
use crate::enums::Operation;
use crate::errors::DiffError;

/// Current diff document version.
pub const DIFF_VERSION: u32 = 1;

/// Columns describing the resource itself rather than its property bag.
pub const SYSTEM_COLUMNS: &[&str] = &["id", "resource_type_id", "resource_type_full_name"];

/// Default version for documents written before versioning.
const fn default_diff_version() -> u32 {
    1
}

/// Diff of every scalar property of one resource across one mutation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DiffDocument {
    /// Document version. Defaults to 1 when missing.
    #[serde(default = "default_diff_version")]
    pub v: u32,

    /// Id of the resource the document describes.
    pub resource_id: String,

    /// Fully-qualified name of the resource's most-derived type.
    pub resource_type: String,

    /// One entry per tracked property, sorted by name.
    pub properties: Vec<PropertyEntry>,
}

/// Diff of a single property.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PropertyEntry {
    pub name: String,

    /// Whether the value differs between before and after.
    pub changed: bool,

    /// Value before the mutation. Absent means NULL (or unchanged on update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,

    /// Value after the mutation. Absent means NULL (or unchanged on update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// A decoded property value. `Text("")` is an empty string, not NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Null,
    Text(String),
}

impl From<Option<&String>> for PropertyValue {
    fn from(value: Option<&String>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.clone()))
    }
}

/// Typed reading of a [`PropertyEntry`] under a known operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyDelta {
    /// Update that left the property untouched.
    Unchanged,
    /// Insert: the property's value after creation.
    ChangedTo(PropertyValue),
    /// Delete: the property's last known value.
    ChangedFrom(PropertyValue),
    /// Update that changed the property.
    Set {
        previous: PropertyValue,
        next: PropertyValue,
    },
}

impl PropertyEntry {
    /// Encode one property transition under `operation`.
    ///
    /// Values that the operation cannot carry are dropped: an insert has no
    /// previous value and a delete has no next value.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        operation: Operation,
        previous: Option<String>,
        next: Option<String>,
    ) -> Self {
        Self::encode_transition(name.into(), operation, previous, next, true)
    }

    /// `modified == false` means the source reported the column untouched, in
    /// which case an update entry is unchanged whatever the images say.
    fn encode_transition(
        name: String,
        operation: Operation,
        previous: Option<String>,
        next: Option<String>,
        modified: bool,
    ) -> Self {
        match operation {
            Operation::Insert => Self {
                name,
                changed: next.is_some(),
                previous: None,
                next,
            },
            Operation::Delete => Self {
                name,
                changed: previous.is_some(),
                previous,
                next: None,
            },
            Operation::Update if !modified || previous == next => Self {
                name,
                changed: false,
                previous: None,
                next: None,
            },
            Operation::Update => Self {
                name,
                changed: true,
                previous,
                next,
            },
        }
    }

    #[must_use]
    pub fn previous_value(&self) -> PropertyValue {
        self.previous.as_ref().into()
    }

    #[must_use]
    pub fn next_value(&self) -> PropertyValue {
        self.next.as_ref().into()
    }

    /// Interpret the entry for a record of the given operation.
    #[must_use]
    pub fn delta(&self, operation: Operation) -> PropertyDelta {
        match operation {
            Operation::Insert => PropertyDelta::ChangedTo(self.next_value()),
            Operation::Delete => PropertyDelta::ChangedFrom(self.previous_value()),
            Operation::Update if !self.changed => PropertyDelta::Unchanged,
            Operation::Update => PropertyDelta::Set {
                previous: self.previous_value(),
                next: self.next_value(),
            },
        }
    }

    fn check(&self) -> Result<(), DiffError> {
        let carries_values = self.previous.is_some() || self.next.is_some();
        if !self.changed && carries_values && self.previous != self.next {
            return Err(DiffError::Invalid(format!(
                "property '{}' is marked unchanged but its values differ",
                self.name
            )));
        }
        if self.changed && self.previous == self.next {
            return Err(DiffError::Invalid(format!(
                "property '{}' is marked changed but its values are identical",
                self.name
            )));
        }
        Ok(())
    }
}

impl DiffDocument {
    /// Build the diff for one resource mutation from its row images.
    ///
    /// Tracked properties are every column present in either image except the
    /// [`SYSTEM_COLUMNS`]. For updates, `update_mask` (when given) lists the
    /// columns the source reports as modified; all other columns are encoded
    /// as unchanged without consulting their values.
    #[must_use]
    pub fn from_images(
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        operation: Operation,
        before: Option<&RowImage>,
        after: Option<&RowImage>,
        update_mask: Option<&BTreeSet<String>>,
    ) -> Self {
        let names: BTreeSet<&String> = before
            .into_iter()
            .chain(after)
            .flat_map(serde_json::Map::keys)
            .filter(|name| !SYSTEM_COLUMNS.contains(&name.as_str()))
            .collect();

        let properties = names
            .into_iter()
            .map(|name| {
                let previous = before.and_then(|img| img.get(name)).and_then(render_value);
                let next = after.and_then(|img| img.get(name)).and_then(render_value);
                let modified = update_mask.is_none_or(|mask| mask.contains(name));
                PropertyEntry::encode_transition(name.clone(), operation, previous, next, modified)
            })
            .collect();

        Self {
            v: DIFF_VERSION,
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            properties,
        }
    }

    /// Serialize to the compact JSON form stored with the change record.
    ///
    /// # Errors
    ///
    /// Returns `DiffError::Serialization` if serialization fails.
    pub fn encode(&self) -> Result<String, DiffError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a stored document.
    ///
    /// # Errors
    ///
    /// Returns `DiffError::Serialization` for malformed JSON,
    /// `DiffError::UnsupportedVersion` for unknown versions, and
    /// `DiffError::Invalid` for duplicate or self-contradictory entries.
    pub fn decode(s: &str) -> Result<Self, DiffError> {
        let doc: Self = serde_json::from_str(s)?;
        if doc.v != DIFF_VERSION {
            return Err(DiffError::UnsupportedVersion(doc.v));
        }
        let mut seen = HashSet::new();
        for entry in &doc.properties {
            if !seen.insert(entry.name.as_str()) {
                return Err(DiffError::Invalid(format!(
                    "duplicate property '{}'",
                    entry.name
                )));
            }
            entry.check()?;
        }
        Ok(doc)
    }

    /// Look up a property entry by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Entries whose value changed.
    pub fn changed(&self) -> impl Iterator<Item = &PropertyEntry> {
        self.properties.iter().filter(|p| p.changed)
    }
}

/// Render a captured column value as diff text. `None` means SQL NULL.
///
/// Strings are kept verbatim (including `""`), numbers and booleans use their
/// JSON text, and nested structures are stored as compact JSON.
#[must_use]
pub fn render_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
