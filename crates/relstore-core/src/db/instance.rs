//! Module: db::instance
//! Responsibility: session-bound row handles and relation managers.
//! Does not own: mutation rules; every write goes back through the session.

use crate::{
    db::{
        Session,
        query::{QuerySet, Scope},
        relation::{Accessor, ManyLink, RelationInput},
        row::{PropValue, Props, Ref},
    },
    error::Error,
    key::Key,
    value::Value,
};
use std::{fmt, sync::Arc};

///
/// BoundRow
///
/// A row snapshot bound to the session it was read from. The snapshot is
/// fixed until `refresh`; relation navigation always reads the live tables.
///

#[derive(Clone)]
pub struct BoundRow<'a> {
    session: &'a Session<'a>,
    entity: &'a str,
    snapshot: Arc<Ref>,
}

impl<'a> BoundRow<'a> {
    pub(crate) const fn new(session: &'a Session<'a>, entity: &'a str, snapshot: Arc<Ref>) -> Self {
        Self {
            session,
            entity,
            snapshot,
        }
    }

    #[must_use]
    pub const fn entity(&self) -> &'a str {
        self.entity
    }

    #[must_use]
    pub fn id(&self) -> &Key {
        self.snapshot.id()
    }

    /// Snapshot value of `field`; `Null` when absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.snapshot.value(field)
    }

    #[must_use]
    pub const fn ref_(&self) -> &Arc<Ref> {
        &self.snapshot
    }

    /// Re-read the snapshot from the live table.
    pub fn refresh(&mut self) -> Result<(), Error> {
        self.snapshot = self.live()?;
        Ok(())
    }

    pub fn update(&mut self, props: Props) -> Result<(), Error> {
        self.snapshot = self.session.update(self.entity, self.snapshot.id(), props)?;
        Ok(())
    }

    /// Delete this row with cascades; returns the number of rows removed.
    pub fn delete(self) -> Result<usize, Error> {
        self.session.delete(self.entity, self.snapshot.id())
    }

    fn live(&self) -> Result<Arc<Ref>, Error> {
        self.session
            .table(self.entity)?
            .get(self.id())
            .cloned()
            .ok_or_else(|| Error::not_found(self.entity, self.id()))
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    pub fn related(&self, accessor: &str) -> Result<Related<'a>, Error> {
        let session = self.session;
        let accessor_def = session
            .registry()
            .relations()
            .accessor(self.entity, accessor)
            .ok_or_else(|| Error::unknown_field(self.entity, accessor))?;

        let related = match accessor_def {
            Accessor::Forward { field, target } => {
                let target_id = self.live()?.get(field).and_then(Key::from_value);
                let row = match target_id {
                    Some(id) => session.entity(target)?.with_id(id)?,
                    None => None,
                };
                Related::Row(row)
            }
            Accessor::Reverse { source, field } => Related::Rows(QuerySet::new(
                session,
                source,
                Scope::Index {
                    field: field.as_str(),
                    target: self.id().clone(),
                },
            )),
            Accessor::ReverseOne { source, field } => {
                let owner = session.table(source)?.index_slot(field, self.id()).first().cloned();
                let row = match owner {
                    Some(id) => session.entity(source)?.with_id(id)?,
                    None => None,
                };
                Related::Row(row)
            }
            Accessor::Many(link) => Related::Many(ManyRelated {
                session,
                entity: self.entity,
                link,
                owner: self.id().clone(),
            }),
        };

        Ok(related)
    }

    /// Forward foreign key / one-to-one (or reverse one-to-one) target.
    pub fn related_row(&self, accessor: &str) -> Result<Option<Self>, Error> {
        match self.related(accessor)? {
            Related::Row(row) => Ok(row),
            _ => Err(Error::validation(format!(
                "'{}.{accessor}' does not lead to a single row",
                self.entity
            ))),
        }
    }

    /// Reverse foreign key or many-to-many rows.
    pub fn related_set(&self, accessor: &str) -> Result<QuerySet<'a>, Error> {
        match self.related(accessor)? {
            Related::Rows(rows) => Ok(rows),
            Related::Many(many) => Ok(many.query()),
            Related::Row(_) => Err(Error::validation(format!(
                "'{}.{accessor}' leads to a single row",
                self.entity
            ))),
        }
    }

    pub fn many_related(&self, accessor: &str) -> Result<ManyRelated<'a>, Error> {
        match self.related(accessor)? {
            Related::Many(many) => Ok(many),
            _ => Err(Error::validation(format!(
                "'{}.{accessor}' is not a many-to-many accessor",
                self.entity
            ))),
        }
    }
}

impl fmt::Debug for BoundRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRow")
            .field("entity", &self.entity)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BoundRow<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.snapshot == other.snapshot
    }
}

impl From<&BoundRow<'_>> for RelationInput {
    fn from(row: &BoundRow<'_>) -> Self {
        Self::Handle {
            entity: row.entity.to_string(),
            id: row.id().clone(),
        }
    }
}

impl From<BoundRow<'_>> for RelationInput {
    fn from(row: BoundRow<'_>) -> Self {
        Self::from(&row)
    }
}

impl From<&BoundRow<'_>> for PropValue {
    fn from(row: &BoundRow<'_>) -> Self {
        Self::Relation(RelationInput::from(row))
    }
}

impl From<BoundRow<'_>> for PropValue {
    fn from(row: BoundRow<'_>) -> Self {
        Self::Relation(RelationInput::from(&row))
    }
}

///
/// Related
///
/// Result of navigating one accessor from a bound row.
///

pub enum Related<'a> {
    Row(Option<BoundRow<'a>>),
    Rows(QuerySet<'a>),
    Many(ManyRelated<'a>),
}

///
/// ManyRelated
///
/// Many-to-many manager for one owning row. Links are rows of the
/// through-entity; adding or removing never touches the related rows.
///

#[derive(Clone)]
pub struct ManyRelated<'a> {
    session: &'a Session<'a>,
    entity: &'a str,
    link: &'a ManyLink,
    owner: Key,
}

impl<'a> ManyRelated<'a> {
    #[must_use]
    pub fn query(&self) -> QuerySet<'a> {
        QuerySet::new(
            self.session,
            self.link.other.as_str(),
            Scope::Through {
                link: self.link,
                owner: self.owner.clone(),
            },
        )
    }

    pub fn add<T: Into<RelationInput>>(&self, items: impl IntoIterator<Item = T>) -> Result<(), Error> {
        let inputs = items.into_iter().map(Into::into).collect();
        self.session
            .add_related(self.entity, self.link, &self.owner, inputs)
    }

    pub fn remove<T: Into<RelationInput>>(
        &self,
        items: impl IntoIterator<Item = T>,
    ) -> Result<(), Error> {
        let inputs = items.into_iter().map(Into::into).collect();
        self.session
            .remove_related(self.entity, self.link, &self.owner, inputs)
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.session.clear_related(self.entity, self.link, &self.owner)
    }
}
