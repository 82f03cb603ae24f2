//! Change sets and change records.
//!
//! Each change record kind maps to one variant of [`EntityChange`]; records of
//! every kind share the common [`ChangeRecord`] envelope and reference their
//! change set by id.

mod change_record;
mod change_set;

pub use change_record::{
    AssociationChange, AttributeChange, AttributePresence, ChangeRecord, DataModelModuleChange,
    EntityChange, EntityReference, NamedUriChange, NavigationPropertyChange, PropertyValueChange,
    RelationshipChange, ResourceChange, ResourceTypeChange, ScalarPropertyChange, ValueSide,
};
pub use change_set::ChangeSet;
