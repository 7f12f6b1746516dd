//! Core engine for relstore: an immutable, normalized, in-process relational
//! store. Entity declarations are validated by a [`db::Registry`], state
//! lives in copy-on-write [`db::Branch`] snapshots, and all reads and writes
//! go through a [`db::Session`].
#![warn(unreachable_pub)]

#[macro_use]
mod macros;

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod key;
pub mod model;
pub mod obs;
pub mod value;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use error::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

///
/// Prelude
///
/// Prelude contains only domain vocabulary: declarations, values and the
/// session surface.
///

pub mod prelude {
    pub use crate::{
        db::{BoundEntity, BoundRow, Branch, Lookup, Props, QuerySet, Ref, Registry, Session, lookup},
        key::{IdKind, Key},
        model::{EntityDeclaration, FieldDescriptor},
        props,
        value::Value,
    };
}
