//! Module: db::relation
//! Responsibility: resolved relation metadata (edges, accessors) and
//! normalization of relation-valued call arguments.
//! Does not own: reverse-index storage (table) or cascade execution (session).

mod input;

pub use input::RelationInput;
pub(crate) use input::{resolve_many, resolve_one};

use crate::model::FieldKind;
use std::collections::BTreeMap;

///
/// IncomingEdge
///
/// One foreign-key / one-to-one field that points at an entity.
/// Cascading deletes walk these edges through the source's reverse index.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IncomingEdge {
    pub source: String,
    pub field: String,
    pub kind: FieldKind,
}

///
/// ManyLink
///
/// One side of a many-to-many relation, seen from `entity`.
/// `self_field` on the through-entity points at `entity`;
/// `other_field` points at `other`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManyLink {
    pub through: String,
    pub self_field: String,
    pub other_field: String,
    pub other: String,
}

///
/// Accessor
///
/// Named navigation from one row of an entity.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Accessor {
    /// Foreign key / one-to-one stored on this row.
    Forward { field: String, target: String },

    /// Rows of `source` whose foreign key points here.
    Reverse { source: String, field: String },

    /// The unique row of `source` whose one-to-one points here.
    ReverseOne { source: String, field: String },

    /// Many-to-many through a linking entity.
    Many(ManyLink),
}

///
/// RelationGraph
///
/// Name-resolved relation metadata for a whole registry.
///

#[derive(Clone, Debug, Default)]
pub struct RelationGraph {
    pub(crate) incoming: BTreeMap<String, Vec<IncomingEdge>>,
    pub(crate) accessors: BTreeMap<String, BTreeMap<String, Accessor>>,
    pub(crate) many_fields: BTreeMap<String, BTreeMap<String, ManyLink>>,
}

impl RelationGraph {
    /// Foreign-key / one-to-one fields (in any entity) pointing at `target`.
    #[must_use]
    pub fn incoming(&self, target: &str) -> &[IncomingEdge] {
        self.incoming.get(target).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn accessor(&self, entity: &str, name: &str) -> Option<&Accessor> {
        self.accessors.get(entity).and_then(|map| map.get(name))
    }

    pub fn accessors(&self, entity: &str) -> impl Iterator<Item = (&str, &Accessor)> {
        self.accessors
            .get(entity)
            .into_iter()
            .flat_map(|map| map.iter().map(|(name, accessor)| (name.as_str(), accessor)))
    }

    /// The declared many-to-many field `field` on `entity`.
    #[must_use]
    pub fn many_field(&self, entity: &str, field: &str) -> Option<&ManyLink> {
        self.many_fields.get(entity).and_then(|map| map.get(field))
    }

    pub(crate) fn add_incoming(&mut self, target: &str, edge: IncomingEdge) {
        self.incoming.entry(target.to_string()).or_default().push(edge);
    }

    // Install an accessor; returns false when the name is already taken.
    pub(crate) fn add_accessor(&mut self, entity: &str, name: &str, accessor: Accessor) -> bool {
        let map = self.accessors.entry(entity.to_string()).or_default();
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_string(), accessor);

        true
    }

    pub(crate) fn add_many_field(&mut self, entity: &str, field: &str, link: ManyLink) {
        self.many_fields
            .entry(entity.to_string())
            .or_default()
            .insert(field.to_string(), link);
    }
}
