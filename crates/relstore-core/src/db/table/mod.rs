//! Module: db::table
//! Responsibility: per-entity normalized storage and reverse-index upkeep.
//! Does not own: cross-entity cascades or relation resolution (session).
//! Boundary: pure `TableState -> TableState` transitions with copy-on-write
//! at sub-structure granularity.

mod index;

#[cfg(test)]
mod tests;

pub use index::ReverseIndex;

use crate::{
    db::row::Ref,
    error::Error,
    key::{IdKind, Key},
    model::TableLayout,
    value::Value,
};
use serde::{Serialize, Serializer, ser::SerializeMap};
use std::{collections::BTreeMap, sync::Arc};

///
/// TableMeta
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TableMeta {
    #[serde(rename = "maxId")]
    pub max_id: Option<i64>,
}

///
/// TableState
///
/// One entity's slice of a branch. Every sub-structure sits behind its own
/// `Arc`, and each reverse index behind another, so a transition clones only
/// what it touches and shares the rest with its predecessor.
///

#[derive(Clone, Debug, PartialEq)]
pub struct TableState {
    pub(crate) layout: Arc<TableLayout>,
    pub(crate) items: Arc<Vec<Key>>,
    pub(crate) items_by_id: Arc<BTreeMap<Key, Arc<Ref>>>,
    pub(crate) meta: Arc<TableMeta>,
    pub(crate) indexes: Arc<BTreeMap<String, Arc<ReverseIndex>>>,
}

impl TableState {
    /// Ids in insertion order.
    #[must_use]
    pub fn items(&self) -> &[Key] {
        &self.items
    }

    #[must_use]
    pub fn rows(&self) -> &BTreeMap<Key, Arc<Ref>> {
        &self.items_by_id
    }

    #[must_use]
    pub fn get(&self, id: &Key) -> Option<&Arc<Ref>> {
        self.items_by_id.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &Key) -> bool {
        self.items_by_id.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    #[must_use]
    pub fn index(&self, field: &str) -> Option<&ReverseIndex> {
        self.indexes.get(field).map(AsRef::as_ref)
    }

    /// Owning ids for `target` in `field`'s reverse index; empty when none.
    #[must_use]
    pub fn index_slot(&self, field: &str, target: &Key) -> &[Key] {
        self.index(field).map_or(&[], |index| index.slot(target))
    }

    #[must_use]
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// True when every sub-structure is the same allocation in both states.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
            && Arc::ptr_eq(&self.items_by_id, &other.items_by_id)
            && Arc::ptr_eq(&self.meta, &other.meta)
            && Arc::ptr_eq(&self.indexes, &other.indexes)
            && Arc::ptr_eq(&self.layout, &other.layout)
    }

    // Remove `owner` from one reverse-index slot, cloning only that index.
    fn index_remove(&mut self, field: &str, target: &Key, owner: &Key) -> bool {
        let indexes = Arc::make_mut(&mut self.indexes);
        indexes
            .get_mut(field)
            .is_some_and(|index| Arc::make_mut(index).remove(target, owner))
    }

    fn index_add(&mut self, field: &str, target: Key, owner: &Key) -> bool {
        let indexes = Arc::make_mut(&mut self.indexes);
        let index = indexes.entry(field.to_string()).or_default();
        Arc::make_mut(index).add(target, owner)
    }
}

impl Serialize for TableState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(&self.layout.items_key, self.items.as_ref())?;
        map.serialize_entry(&self.layout.items_by_id_key, self.items_by_id.as_ref())?;
        map.serialize_entry("meta", self.meta.as_ref())?;
        map.serialize_entry("indexes", self.indexes.as_ref())?;
        map.end()
    }
}

///
/// IndexDelta
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndexDelta {
    pub inserts: u64,
    pub removes: u64,
}

impl IndexDelta {
    pub(crate) const fn merge(&mut self, other: Self) {
        self.inserts = self.inserts.saturating_add(other.inserts);
        self.removes = self.removes.saturating_add(other.removes);
    }

    const fn record(&mut self, inserted: bool, removed: bool) {
        if inserted {
            self.inserts = self.inserts.saturating_add(1);
        }
        if removed {
            self.removes = self.removes.saturating_add(1);
        }
    }
}

///
/// TableWrite
///
/// Result of one table transition: the successor state, the affected row
/// (new snapshot for insert/update, removed snapshot for delete) and the
/// reverse-index delta it produced.
///

#[derive(Clone, Debug)]
pub struct TableWrite {
    pub state: TableState,
    pub row: Arc<Ref>,
    pub delta: IndexDelta,
}

///
/// Table
///
/// Schema-aware operator over `TableState` values for one entity.
/// Knows the id attribute and which fields own a reverse index.
///

#[derive(Clone, Debug)]
pub struct Table {
    entity: Arc<str>,
    id_attribute: String,
    id_kind: IdKind,
    indexed_fields: Vec<String>,
    layout: Arc<TableLayout>,
}

impl Table {
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        id_attribute: impl Into<String>,
        id_kind: IdKind,
        indexed_fields: Vec<String>,
        layout: TableLayout,
    ) -> Self {
        Self {
            entity: Arc::from(entity.into()),
            id_attribute: id_attribute.into(),
            id_kind,
            indexed_fields,
            layout: Arc::new(layout),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    #[must_use]
    pub const fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    #[must_use]
    pub fn indexed_fields(&self) -> &[String] {
        &self.indexed_fields
    }

    #[must_use]
    pub fn empty_state(&self) -> TableState {
        let indexes = self
            .indexed_fields
            .iter()
            .map(|field| (field.clone(), Arc::new(ReverseIndex::default())))
            .collect();

        TableState {
            layout: Arc::clone(&self.layout),
            items: Arc::new(Vec::new()),
            items_by_id: Arc::new(BTreeMap::new()),
            meta: Arc::new(TableMeta::default()),
            indexes: Arc::new(indexes),
        }
    }

    /// Reverse lookup of the rows whose `field` points at `target`.
    pub fn get_index<'s>(
        &self,
        state: &'s TableState,
        field: &str,
        target: &Key,
    ) -> Result<&'s [Key], Error> {
        if !self.is_indexed(field) {
            return Err(Error::unknown_field(&self.entity, field));
        }

        Ok(state.index_slot(field, target))
    }

    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Insert one row, allocating a numeric id when the id attribute is absent.
    pub fn insert(
        &self,
        state: &TableState,
        fields: BTreeMap<String, Value>,
    ) -> Result<TableWrite, Error> {
        self.insert_owned(state.clone(), fields)
    }

    // Owned variants: sub-structures no other state shares are edited in
    // place, so repeated writes inside one transaction stay cheap.
    pub(crate) fn insert_owned(
        &self,
        mut next: TableState,
        mut fields: BTreeMap<String, Value>,
    ) -> Result<TableWrite, Error> {
        let supplied = fields
            .get(&self.id_attribute)
            .filter(|value| !value.is_null());
        let id = match supplied {
            Some(value) => self.check_id(value)?,
            None if self.id_kind.auto_increments() => self.next_id(&next)?,
            None => {
                return Err(Error::MissingId {
                    entity: self.entity.to_string(),
                    id_attribute: self.id_attribute.clone(),
                });
            }
        };

        if next.contains(&id) {
            return Err(Error::DuplicateId {
                entity: self.entity.to_string(),
                id,
            });
        }

        fields.insert(self.id_attribute.clone(), id.to_value());
        let row = Arc::new(Ref::new(Arc::clone(&self.entity), id.clone(), fields));

        Arc::make_mut(&mut next.items).push(id.clone());
        Arc::make_mut(&mut next.items_by_id).insert(id.clone(), Arc::clone(&row));

        if let Some(n) = id.as_int()
            && next.meta.max_id.is_none_or(|max| n > max)
        {
            next.meta = Arc::new(TableMeta { max_id: Some(n) });
        }

        let mut delta = IndexDelta::default();
        for field in &self.indexed_fields {
            if let Some(target) = row.get(field).and_then(Key::from_value) {
                let inserted = next.index_add(field, target, &id);
                delta.record(inserted, false);
            }
        }

        tracing::trace!(
            entity = %self.entity,
            id = %id,
            index_inserts = delta.inserts,
            "table insert"
        );

        Ok(TableWrite {
            state: next,
            row,
            delta,
        })
    }

    /// Merge `changes` into an existing row. A no-op update returns the input
    /// state and the existing snapshot untouched.
    pub fn update(
        &self,
        state: &TableState,
        id: &Key,
        changes: &BTreeMap<String, Value>,
    ) -> Result<TableWrite, Error> {
        self.update_owned(state.clone(), id, changes)
    }

    pub(crate) fn update_owned(
        &self,
        mut next: TableState,
        id: &Key,
        changes: &BTreeMap<String, Value>,
    ) -> Result<TableWrite, Error> {
        let current = next
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(&self.entity, id))?;

        if let Some(value) = changes.get(&self.id_attribute)
            && *value != id.to_value()
        {
            return Err(Error::validation(format!(
                "id attribute '{}' of '{}' cannot change (row {id})",
                self.id_attribute, self.entity
            )));
        }

        let Some(merged) = current.merged(changes) else {
            return Ok(TableWrite {
                state: next,
                row: current,
                delta: IndexDelta::default(),
            });
        };
        let row = Arc::new(merged);

        Arc::make_mut(&mut next.items_by_id).insert(id.clone(), Arc::clone(&row));

        let mut delta = IndexDelta::default();
        for field in &self.indexed_fields {
            let old_target = current.get(field).and_then(Key::from_value);
            let new_target = row.get(field).and_then(Key::from_value);
            if old_target == new_target {
                continue;
            }

            if let Some(target) = old_target {
                let removed = next.index_remove(field, &target, id);
                delta.record(false, removed);
            }
            if let Some(target) = new_target {
                let inserted = next.index_add(field, target, id);
                delta.record(inserted, false);
            }
        }

        tracing::trace!(
            entity = %self.entity,
            id = %id,
            index_inserts = delta.inserts,
            index_removes = delta.removes,
            "table update"
        );

        Ok(TableWrite {
            state: next,
            row,
            delta,
        })
    }

    /// Remove one row and its reverse-index memberships. Never cascades.
    pub fn delete(&self, state: &TableState, id: &Key) -> Result<TableWrite, Error> {
        self.delete_owned(state.clone(), id)
    }

    pub(crate) fn delete_owned(&self, mut next: TableState, id: &Key) -> Result<TableWrite, Error> {
        let row = next
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(&self.entity, id))?;

        Arc::make_mut(&mut next.items).retain(|item| item != id);
        Arc::make_mut(&mut next.items_by_id).remove(id);

        let mut delta = IndexDelta::default();
        for field in &self.indexed_fields {
            if let Some(target) = row.get(field).and_then(Key::from_value) {
                let removed = next.index_remove(field, &target, id);
                delta.record(false, removed);
            }
        }

        tracing::trace!(
            entity = %self.entity,
            id = %id,
            index_removes = delta.removes,
            "table delete"
        );

        Ok(TableWrite {
            state: next,
            row,
            delta,
        })
    }

    // ------------------------------------------------------------------
    // Id handling
    // ------------------------------------------------------------------

    // Validate a caller-supplied id against the declared id kind.
    fn check_id(&self, value: &Value) -> Result<Key, Error> {
        let key = Key::from_value(value).ok_or_else(|| {
            Error::validation(format!(
                "id attribute '{}' of '{}' must be int or text, got {}",
                self.id_attribute,
                self.entity,
                value.type_name()
            ))
        })?;

        if key.kind() != self.id_kind {
            return Err(Error::validation(format!(
                "id attribute '{}' of '{}' expects {:?} ids, got {key}",
                self.id_attribute, self.entity, self.id_kind
            )));
        }

        Ok(key)
    }

    fn next_id(&self, state: &TableState) -> Result<Key, Error> {
        let next = match state.meta.max_id {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                Error::invariant(format!("numeric id space exhausted for '{}'", self.entity))
            })?,
            None => 0,
        };

        Ok(Key::Int(next))
    }
}
