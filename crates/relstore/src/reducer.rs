//! Host-action adapter: one optional reducer per entity, run inside a
//! single session per action.

use relstore_core::{
    Error,
    db::{BoundEntity, Branch, Registry},
};
use std::collections::BTreeMap;

/// Reducer for one entity. Other entities are reachable through
/// `entity.session()`.
pub type EntityReducer<'r, A> = Box<dyn Fn(&A, BoundEntity<'_>) -> Result<(), Error> + 'r>;

///
/// ReducerSet
///

pub struct ReducerSet<'r, A> {
    registry: &'r Registry,
    reducers: BTreeMap<String, EntityReducer<'r, A>>,
}

impl<'r, A> ReducerSet<'r, A> {
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            reducers: BTreeMap::new(),
        }
    }

    /// Install the reducer for `entity`, replacing any previous one.
    pub fn on(
        mut self,
        entity: &str,
        reducer: impl Fn(&A, BoundEntity<'_>) -> Result<(), Error> + 'r,
    ) -> Result<Self, Error> {
        let name = self.registry.entity(entity)?.name().to_string();
        self.reducers.insert(name, Box::new(reducer));

        Ok(self)
    }

    /// Apply `action` to `state` (the registry's empty state when `None`).
    ///
    /// Reducers run in registration order inside one session. The first
    /// error aborts the whole action and the caller keeps its old state.
    pub fn reduce(&self, state: Option<&Branch>, action: &A) -> Result<Branch, Error> {
        let branch = state.cloned().unwrap_or_else(|| self.registry.empty_state());
        let session = self.registry.session(branch);

        for name in self.registry.declared_entity_names() {
            let Some(reducer) = self.reducers.get(name) else {
                continue;
            };
            if let Err(err) = reducer(action, session.entity(name)?) {
                tracing::debug!(entity = name, error = %err, "reducer rejected action");
                return Err(err);
            }
        }

        Ok(session.state())
    }
}
