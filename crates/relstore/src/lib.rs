//! ## Crate layout
//! - `core`: the store engine (values, declarations, registry, sessions, queries).
//! - `reducer`: per-entity reducers that turn host actions into session calls.
//! - `selector`: memoized derived reads keyed on table identity.
//!
//! The `prelude` module mirrors the surface used by application code.

pub use relstore_core as core;

pub mod reducer;
pub mod selector;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::{Error, Result, props};
pub use reducer::ReducerSet;
pub use selector::{Selector, create_selector, create_selector_with};

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            config::StoreConfig,
            db::{
                BoundEntity, BoundRow, Branch, Direction, Lookup, ManyRelated, Props, QuerySet, Ref,
                Registry, RelationInput, Session, SortKey, lookup,
            },
            key::{IdKind, Key},
            model::{EntityDeclaration, FieldDescriptor},
            value::Value,
        },
        props,
        reducer::ReducerSet,
        selector::{Selector, create_selector, create_selector_with},
    };
}
