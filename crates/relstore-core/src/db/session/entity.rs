use crate::{
    db::{
        Session,
        instance::BoundRow,
        query::{IntoDirection, Lookup, QuerySet, Scope, SortKey},
        row::{Props, Ref},
    },
    error::Error,
    key::Key,
};
use std::sync::Arc;

///
/// BoundEntity
///
/// Per-entity entry point of a session: mutations that hand back bound
/// rows, plus query shortcuts that start from `all()`.
///

#[derive(Clone, Copy)]
pub struct BoundEntity<'a> {
    session: &'a Session<'a>,
    name: &'a str,
}

impl<'a> BoundEntity<'a> {
    pub(crate) const fn new(session: &'a Session<'a>, name: &'a str) -> Self {
        Self { session, name }
    }

    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    #[must_use]
    pub const fn session(&self) -> &'a Session<'a> {
        self.session
    }

    fn bind(&self, row: Arc<Ref>) -> BoundRow<'a> {
        BoundRow::new(self.session, self.name, row)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn create(&self, props: Props) -> Result<BoundRow<'a>, Error> {
        let row = self.session.create(self.name, props)?;
        Ok(self.bind(row))
    }

    pub fn update(&self, id: impl Into<Key>, props: Props) -> Result<BoundRow<'a>, Error> {
        let row = self.session.update(self.name, &id.into(), props)?;
        Ok(self.bind(row))
    }

    pub fn upsert(&self, props: Props) -> Result<BoundRow<'a>, Error> {
        let row = self.session.upsert(self.name, props)?;
        Ok(self.bind(row))
    }

    pub fn delete(&self, id: impl Into<Key>) -> Result<usize, Error> {
        self.session.delete(self.name, &id.into())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn with_id(&self, id: impl Into<Key>) -> Result<Option<BoundRow<'a>>, Error> {
        let row = self.session.table(self.name)?.get(&id.into()).cloned();
        Ok(row.map(|row| self.bind(row)))
    }

    pub fn id_exists(&self, id: impl Into<Key>) -> Result<bool, Error> {
        Ok(self.session.table(self.name)?.contains(&id.into()))
    }

    /// The single row matching `lookup`; more than one match is an error.
    pub fn get(&self, lookup: impl Into<Lookup>) -> Result<Option<BoundRow<'a>>, Error> {
        let mut rows = self.filter(lookup).to_model_array()?;
        if rows.len() > 1 {
            return Err(Error::validation(format!(
                "get on '{}' matched {} rows",
                self.name,
                rows.len()
            )));
        }

        Ok(rows.pop())
    }

    pub fn exists(&self, lookup: impl Into<Lookup>) -> Result<bool, Error> {
        self.filter(lookup).exists()
    }

    // ------------------------------------------------------------------
    // Query shortcuts
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn all(&self) -> QuerySet<'a> {
        QuerySet::new(self.session, self.name, Scope::All)
    }

    /// Query over an explicit id list, in the given order.
    #[must_use]
    pub fn with_ids<K: Into<Key>>(&self, ids: impl IntoIterator<Item = K>) -> QuerySet<'a> {
        QuerySet::new(
            self.session,
            self.name,
            Scope::Ids(ids.into_iter().map(Into::into).collect()),
        )
    }

    #[must_use]
    pub fn filter(&self, lookup: impl Into<Lookup>) -> QuerySet<'a> {
        self.all().filter(lookup)
    }

    #[must_use]
    pub fn exclude(&self, lookup: impl Into<Lookup>) -> QuerySet<'a> {
        self.all().exclude(lookup)
    }

    #[must_use]
    pub fn order_by(&self, key: impl Into<SortKey>) -> QuerySet<'a> {
        self.all().order_by(key)
    }

    pub fn order_by_many<K, D>(
        &self,
        keys: impl IntoIterator<Item = K>,
        directions: impl IntoIterator<Item = D>,
    ) -> Result<QuerySet<'a>, Error>
    where
        K: Into<SortKey>,
        D: IntoDirection,
    {
        self.all().order_by_many(keys, directions)
    }

    pub fn count(&self) -> Result<usize, Error> {
        self.all().count()
    }

    pub fn first(&self) -> Result<Option<BoundRow<'a>>, Error> {
        self.all().first()
    }

    pub fn last(&self) -> Result<Option<BoundRow<'a>>, Error> {
        self.all().last()
    }
}
