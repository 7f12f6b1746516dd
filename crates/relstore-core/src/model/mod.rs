//! Declarative schema vocabulary: field descriptors and entity declarations.
//!
//! These are plain value objects. Nothing here resolves relation targets;
//! the [`Registry`](crate::db::Registry) validates and links them by name.

pub mod entity;
pub mod field;

pub use entity::{
    DEFAULT_ID_ATTRIBUTE, DEFAULT_ITEMS_BY_ID_KEY, DEFAULT_ITEMS_KEY, EntityDeclaration, TableLayout,
};
pub use field::{DefaultValue, FieldDescriptor, FieldKind, ThroughFields};
