use crate::{
    db::{
        Branch,
        registry::Registry,
        relation::{ManyLink, resolve_many, resolve_one},
        row::{PropValue, Props, Ref, lookup},
        table::{IndexDelta, TableState, TableWrite},
    },
    error::Error,
    key::Key,
    model::{EntityDeclaration, FieldKind},
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// Txn
///
/// Private working copy for one session mutation. Tables are staged as they
/// change and only become visible through `finish`; dropping a `Txn` on
/// error discards every staged write.
///
/// Staged tables are handed to each transition by value, so a failed
/// transition leaves the `Txn` unusable. Callers abandon it on any error.
///

pub(crate) struct Txn<'r> {
    registry: &'r Registry,
    base: Branch,
    staged: BTreeMap<String, TableState>,
    deltas: BTreeMap<String, IndexDelta>,
    rows_deleted: u64,
}

///
/// TxnOutcome
///

pub(crate) struct TxnOutcome {
    pub(crate) branch: Option<Branch>,
    pub(crate) touched: Vec<String>,
    pub(crate) deltas: BTreeMap<String, IndexDelta>,
    pub(crate) rows_deleted: u64,
}

// Props split into stored fields and many-to-many replacement sets.
struct Resolved<'r> {
    fields: BTreeMap<String, Value>,
    many: Vec<(&'r ManyLink, Vec<Key>)>,
}

impl<'r> Txn<'r> {
    pub(crate) fn new(registry: &'r Registry, base: Branch) -> Self {
        Self {
            registry,
            base,
            staged: BTreeMap::new(),
            deltas: BTreeMap::new(),
            rows_deleted: 0,
        }
    }

    pub(crate) fn state(&self, entity: &str) -> Result<&TableState, Error> {
        if let Some(state) = self.staged.get(entity) {
            return Ok(state);
        }

        self.base
            .table(entity)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    // Staged table by value, or a shallow copy of the base table.
    fn take_state(&mut self, entity: &str) -> Result<TableState, Error> {
        match self.staged.remove(entity) {
            Some(state) => Ok(state),
            None => self.state(entity).cloned(),
        }
    }

    fn apply(&mut self, entity: &str, write: TableWrite) -> Arc<Ref> {
        self.deltas
            .entry(entity.to_string())
            .or_default()
            .merge(write.delta);
        self.staged.insert(entity.to_string(), write.state);

        write.row
    }

    /// Tables that actually changed, folded into a successor branch.
    pub(crate) fn finish(self) -> TxnOutcome {
        let Self {
            base,
            staged,
            deltas,
            rows_deleted,
            ..
        } = self;

        let changed: Vec<(String, TableState)> = staged
            .into_iter()
            .filter(|(entity, state)| !base.table(entity).is_some_and(|prev| prev.ptr_eq(state)))
            .collect();
        let touched: Vec<String> = changed.iter().map(|(entity, _)| entity.clone()).collect();
        let branch = (!changed.is_empty()).then(|| base.with_tables(changed));

        TxnOutcome {
            branch,
            touched,
            deltas,
            rows_deleted,
        }
    }

    // ------------------------------------------------------------------
    // Row mutations
    // ------------------------------------------------------------------

    pub(crate) fn create(&mut self, entity: &str, props: Props) -> Result<Arc<Ref>, Error> {
        let registry = self.registry;
        let declaration = registry.entity(entity)?;
        let Resolved { mut fields, many } = self.resolve(declaration, props, None)?;
        fill_defaults(declaration, &mut fields);

        let write = registry
            .table(entity)?
            .insert_owned(self.take_state(entity)?, fields)?;
        let row = self.apply(entity, write);

        for (link, keys) in many {
            for key in keys {
                self.link(link, row.id(), key)?;
            }
        }

        Ok(row)
    }

    pub(crate) fn update(&mut self, entity: &str, id: &Key, props: Props) -> Result<Arc<Ref>, Error> {
        let registry = self.registry;
        let declaration = registry.entity(entity)?;
        if !self.state(entity)?.contains(id) {
            return Err(Error::not_found(entity, id));
        }

        let Resolved { fields, many } = self.resolve(declaration, props, Some(id))?;
        let write = registry
            .table(entity)?
            .update_owned(self.take_state(entity)?, id, &fields)?;
        let row = self.apply(entity, write);

        for (link, keys) in many {
            self.replace_links(link, id, &keys)?;
        }

        Ok(row)
    }

    /// Delete one row and everything that references it.
    /// Returns the number of rows removed, the root included.
    pub(crate) fn delete(&mut self, entity: &str, id: &Key) -> Result<usize, Error> {
        let registry = self.registry;
        let mut worklist = vec![(entity.to_string(), id.clone())];
        let mut removed: BTreeSet<(String, Key)> = BTreeSet::new();

        while let Some((entity, id)) = worklist.pop() {
            if removed.contains(&(entity.clone(), id.clone())) {
                continue;
            }

            let write = registry
                .table(&entity)?
                .delete_owned(self.take_state(&entity)?, &id)?;
            self.apply(&entity, write);

            for edge in registry.relations().incoming(&entity) {
                let source = self.state(&edge.source)?;
                for owner in source.index_slot(&edge.field, &id) {
                    if !source.contains(owner) {
                        return Err(Error::invariant(format!(
                            "index '{}.{}' names missing row {owner} for {entity} {id}",
                            edge.source, edge.field
                        )));
                    }
                    worklist.push((edge.source.clone(), owner.clone()));
                }
            }

            removed.insert((entity, id));
        }

        if removed.len() > 1 {
            tracing::debug!(
                entity,
                id = %id,
                cascaded = removed.len() - 1,
                "cascading delete"
            );
        }
        self.rows_deleted = self
            .rows_deleted
            .saturating_add(u64::try_from(removed.len()).unwrap_or(u64::MAX));

        Ok(removed.len())
    }

    // ------------------------------------------------------------------
    // Many-to-many
    // ------------------------------------------------------------------

    /// `(through id, related id)` pairs currently linked to `owner`.
    pub(crate) fn links(&self, link: &ManyLink, owner: &Key) -> Result<Vec<(Key, Key)>, Error> {
        let through = self.state(&link.through)?;

        through
            .index_slot(&link.self_field, owner)
            .iter()
            .map(|through_id| {
                through
                    .get(through_id)
                    .and_then(|row| row.get(&link.other_field))
                    .and_then(Key::from_value)
                    .map(|other| (through_id.clone(), other))
                    .ok_or_else(|| {
                        Error::invariant(format!(
                            "index '{}.{}' names missing row {through_id}",
                            link.through, link.self_field
                        ))
                    })
            })
            .collect()
    }

    fn link(&mut self, link: &ManyLink, owner: &Key, other: Key) -> Result<(), Error> {
        let mut fields = lookup([
            (link.self_field.as_str(), owner.to_value()),
            (link.other_field.as_str(), other.to_value()),
        ]);
        let registry = self.registry;
        fill_defaults(registry.entity(&link.through)?, &mut fields);

        let write = registry
            .table(&link.through)?
            .insert_owned(self.take_state(&link.through)?, fields)?;
        self.apply(&link.through, write);

        Ok(())
    }

    // Full replacement compared by related id.
    fn replace_links(&mut self, link: &ManyLink, owner: &Key, keys: &[Key]) -> Result<(), Error> {
        let current = self.links(link, owner)?;

        for (through_id, other) in &current {
            if !keys.contains(other) {
                self.delete_link_row(link, through_id)?;
            }
        }
        for key in keys {
            if !current.iter().any(|(_, other)| other == key) {
                self.link(link, owner, key.clone())?;
            }
        }

        Ok(())
    }

    pub(crate) fn add_links(
        &mut self,
        link: &ManyLink,
        owner: &Key,
        inputs: &PropValue,
    ) -> Result<(), Error> {
        let keys = self.resolve_related(link, inputs)?;
        let current = self.links(link, owner)?;

        for key in keys {
            if current.iter().any(|(_, other)| *other == key) {
                return Err(Error::validation(format!(
                    "'{}' {key} is already related to {owner} through '{}'",
                    link.other, link.through
                )));
            }
            self.link(link, owner, key)?;
        }

        Ok(())
    }

    pub(crate) fn remove_links(
        &mut self,
        link: &ManyLink,
        owner: &Key,
        inputs: &PropValue,
    ) -> Result<(), Error> {
        let keys = self.resolve_related(link, inputs)?;
        let current = self.links(link, owner)?;

        for key in keys {
            let matching: Vec<&Key> = current
                .iter()
                .filter(|(_, other)| *other == key)
                .map(|(through_id, _)| through_id)
                .collect();
            if matching.is_empty() {
                return Err(Error::validation(format!(
                    "'{}' {key} is not related to {owner} through '{}'",
                    link.other, link.through
                )));
            }
            for through_id in matching {
                self.delete_link_row(link, through_id)?;
            }
        }

        Ok(())
    }

    pub(crate) fn clear_links(&mut self, link: &ManyLink, owner: &Key) -> Result<(), Error> {
        for (through_id, _) in self.links(link, owner)? {
            self.delete_link_row(link, &through_id)?;
        }

        Ok(())
    }

    // Through rows can already be gone when an earlier cascade reached them.
    fn delete_link_row(&mut self, link: &ManyLink, through_id: &Key) -> Result<(), Error> {
        if self.state(&link.through)?.contains(through_id) {
            self.delete(&link.through, through_id)?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    fn resolve_related(&self, link: &ManyLink, inputs: &PropValue) -> Result<Vec<Key>, Error> {
        let target = self.registry.table(&link.other)?;
        resolve_many(&link.through, inputs, target, self.state(&link.other)?)
    }

    fn resolve(
        &self,
        declaration: &'r EntityDeclaration,
        props: Props,
        own_id: Option<&Key>,
    ) -> Result<Resolved<'r>, Error> {
        let registry = self.registry;
        let entity = declaration.name();
        let mut fields = BTreeMap::new();
        let mut many = Vec::new();

        for (field, prop) in props {
            let Some(descriptor) = declaration.get_field(&field) else {
                let value = plain_value(entity, &field, prop)?;
                fields.insert(field, value);
                continue;
            };

            match (descriptor.kind(), descriptor.target()) {
                (FieldKind::ManyToMany, _) => {
                    let link = registry
                        .relations()
                        .many_field(entity, &field)
                        .ok_or_else(|| {
                            Error::invariant(format!("unresolved many-to-many '{entity}.{field}'"))
                        })?;
                    let keys = resolve_many(
                        &field,
                        &prop,
                        registry.table(&link.other)?,
                        self.state(&link.other)?,
                    )?;
                    many.push((link, keys));
                }
                (kind @ (FieldKind::ForeignKey | FieldKind::OneToOne), Some(target)) => {
                    let key = resolve_one(
                        &field,
                        &prop,
                        registry.table(target)?,
                        self.state(target)?,
                    )?;
                    if kind == FieldKind::OneToOne
                        && let Some(key) = &key
                    {
                        self.check_one_to_one(entity, &field, key, own_id)?;
                    }
                    fields.insert(field, key.as_ref().map_or(Value::Null, Key::to_value));
                }
                _ => {
                    let value = plain_value(entity, &field, prop)?;
                    fields.insert(field, value);
                }
            }
        }

        Ok(Resolved { fields, many })
    }

    // A one-to-one target may be claimed by at most one row.
    fn check_one_to_one(
        &self,
        entity: &str,
        field: &str,
        target: &Key,
        own_id: Option<&Key>,
    ) -> Result<(), Error> {
        let claimed = self
            .state(entity)?
            .index_slot(field, target)
            .iter()
            .any(|owner| Some(owner) != own_id);

        if claimed {
            return Err(Error::validation(format!(
                "one-to-one '{entity}.{field}' target {target} is already claimed"
            )));
        }

        Ok(())
    }
}

fn plain_value(entity: &str, field: &str, prop: PropValue) -> Result<Value, Error> {
    match prop {
        PropValue::Value(value) => Ok(value),
        PropValue::Relation(_) | PropValue::Relations(_) => Err(Error::validation(format!(
            "'{entity}.{field}' is not a relation field"
        ))),
    }
}

// Declared attribute defaults for every omitted attribute.
fn fill_defaults(declaration: &EntityDeclaration, fields: &mut BTreeMap<String, Value>) {
    for (name, descriptor) in declaration.fields() {
        if let Some(default) = descriptor.default()
            && !fields.contains_key(name)
        {
            fields.insert(name.to_string(), default.produce());
        }
    }
}
