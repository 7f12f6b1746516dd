//! The store engine: tables, branches, the registry, sessions and queries.

mod branch;
pub mod instance;
pub mod query;
pub mod registry;
pub mod relation;
pub mod row;
pub mod session;
pub mod table;

pub use branch::Branch;
pub use instance::{BoundRow, ManyRelated, Related};
pub use query::{Direction, IntoDirection, Lookup, QuerySet, SortKey};
pub use registry::Registry;
pub use relation::{Accessor, IncomingEdge, ManyLink, RelationGraph, RelationInput};
pub use row::{PropValue, Props, Ref, lookup};
pub use session::{BoundEntity, Session};
pub use table::{IndexDelta, ReverseIndex, Table, TableMeta, TableState, TableWrite};
