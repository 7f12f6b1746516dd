//! Module: db::query
//! Responsibility: lazy, composable read queries over one entity.
//! Does not own: row storage or mutation rules; bulk writes delegate to the session.
//! Boundary: chains are immutable values; every terminal re-resolves its
//! scope against the session's live table.

mod lookup;
mod order;


pub use lookup::Lookup;
pub use order::{Direction, IntoDirection, SortKey};

use crate::{
    db::{
        Session,
        instance::BoundRow,
        relation::ManyLink,
        row::{Props, Ref},
    },
    error::Error,
    key::Key,
};
use std::sync::Arc;

///
/// Scope
///
/// Candidate rows before any clause runs. Relation scopes are answered from
/// reverse indexes, never by scanning the whole table.
///

#[derive(Clone, Debug)]
pub(crate) enum Scope<'a> {
    All,
    Ids(Vec<Key>),
    /// Rows of the query entity whose `field` points at `target`.
    Index { field: &'a str, target: Key },
    /// Rows linked to `owner` through a many-to-many link.
    Through { link: &'a ManyLink, owner: Key },
}

#[derive(Clone, Debug)]
enum Clause {
    Filter(Lookup),
    Exclude(Lookup),
    Order(Vec<(SortKey, Direction)>),
}

///
/// QuerySet
///

#[derive(Clone)]
pub struct QuerySet<'a> {
    session: &'a Session<'a>,
    entity: &'a str,
    scope: Scope<'a>,
    clauses: Vec<Clause>,
}

impl<'a> QuerySet<'a> {
    pub(crate) const fn new(session: &'a Session<'a>, entity: &'a str, scope: Scope<'a>) -> Self {
        Self {
            session,
            entity,
            scope,
            clauses: Vec::new(),
        }
    }

    #[must_use]
    pub const fn entity(&self) -> &'a str {
        self.entity
    }

    fn with_clause(&self, clause: Clause) -> Self {
        let mut next = self.clone();
        next.clauses.push(clause);
        next
    }

    // ------------------------------------------------------------------
    // Chain
    // ------------------------------------------------------------------

    #[must_use]
    pub fn all(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn filter(&self, lookup: impl Into<Lookup>) -> Self {
        self.with_clause(Clause::Filter(lookup.into()))
    }

    #[must_use]
    pub fn exclude(&self, lookup: impl Into<Lookup>) -> Self {
        self.with_clause(Clause::Exclude(lookup.into()))
    }

    #[must_use]
    pub fn order_by(&self, key: impl Into<SortKey>) -> Self {
        self.with_clause(Clause::Order(vec![(key.into(), Direction::Asc)]))
    }

    #[must_use]
    pub fn order_by_desc(&self, key: impl Into<SortKey>) -> Self {
        self.with_clause(Clause::Order(vec![(key.into(), Direction::Desc)]))
    }

    /// Sort by several keys; `directions` pairs with `keys` position by position.
    /// An empty `directions` sorts every key ascending.
    pub fn order_by_many<K, D>(
        &self,
        keys: impl IntoIterator<Item = K>,
        directions: impl IntoIterator<Item = D>,
    ) -> Result<Self, Error>
    where
        K: Into<SortKey>,
        D: IntoDirection,
    {
        let keys: Vec<SortKey> = keys.into_iter().map(Into::into).collect();
        let mut directions = directions
            .into_iter()
            .map(IntoDirection::into_direction)
            .collect::<Result<Vec<_>, _>>()?;

        if directions.is_empty() {
            directions = vec![Direction::Asc; keys.len()];
        } else if directions.len() < keys.len() {
            return Err(Error::validation(format!(
                "order_by on '{}' got {} keys but only {} directions",
                self.entity,
                keys.len(),
                directions.len()
            )));
        }

        Ok(self.with_clause(Clause::Order(keys.into_iter().zip(directions).collect())))
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    pub fn to_ref_array(&self) -> Result<Vec<Arc<Ref>>, Error> {
        self.evaluate()
    }

    pub fn to_model_array(&self) -> Result<Vec<BoundRow<'a>>, Error> {
        Ok(self
            .evaluate()?
            .into_iter()
            .map(|row| BoundRow::new(self.session, self.entity, row))
            .collect())
    }

    pub fn first(&self) -> Result<Option<BoundRow<'a>>, Error> {
        Ok(self
            .evaluate()?
            .into_iter()
            .next()
            .map(|row| BoundRow::new(self.session, self.entity, row)))
    }

    pub fn last(&self) -> Result<Option<BoundRow<'a>>, Error> {
        Ok(self
            .evaluate()?
            .pop()
            .map(|row| BoundRow::new(self.session, self.entity, row)))
    }

    pub fn count(&self) -> Result<usize, Error> {
        self.evaluate().map(|rows| rows.len())
    }

    pub fn exists(&self) -> Result<bool, Error> {
        self.count().map(|count| count > 0)
    }

    /// Ids of the matched rows, in query order.
    pub fn ids(&self) -> Result<Vec<Key>, Error> {
        Ok(self
            .evaluate()?
            .iter()
            .map(|row| row.id().clone())
            .collect())
    }

    /// Apply `props` to every matched row in one session mutation.
    pub fn update(&self, props: Props) -> Result<usize, Error> {
        let ids = self.ids()?;
        self.session.update_all(self.entity, &ids, &props)
    }

    /// Delete every matched row (with cascades) in one session mutation.
    pub fn delete(&self) -> Result<usize, Error> {
        let ids = self.ids()?;
        self.session.delete_all(self.entity, &ids)
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    fn scope_ids(&self) -> Result<Vec<Key>, Error> {
        let ids = match &self.scope {
            Scope::All => self.session.table(self.entity)?.items().to_vec(),
            Scope::Ids(ids) => ids.clone(),
            Scope::Index { field, target } => self
                .session
                .table(self.entity)?
                .index_slot(field, target)
                .to_vec(),
            Scope::Through { link, owner } => {
                let through = self.session.table(&link.through)?;
                let mut ids: Vec<Key> = Vec::new();
                for through_id in through.index_slot(&link.self_field, owner) {
                    let other = through
                        .get(through_id)
                        .and_then(|row| row.get(&link.other_field))
                        .and_then(Key::from_value);
                    if let Some(other) = other
                        && !ids.contains(&other)
                    {
                        ids.push(other);
                    }
                }
                ids
            }
        };

        Ok(ids)
    }

    fn evaluate(&self) -> Result<Vec<Arc<Ref>>, Error> {
        let ids = self.scope_ids()?;
        let table = self.session.table(self.entity)?;
        let mut rows: Vec<Arc<Ref>> = ids
            .iter()
            .filter_map(|id| table.get(id).cloned())
            .collect();
        self.session.record_scan(self.entity, rows.len());

        for clause in &self.clauses {
            match clause {
                Clause::Filter(lookup) => rows.retain(|row| lookup.matches(row)),
                Clause::Exclude(lookup) => rows.retain(|row| !lookup.matches(row)),
                Clause::Order(keys) => order::sort_rows(&mut rows, keys),
            }
        }

        Ok(rows)
    }
}
