//! Memoized derived reads.
//!
//! A selector opens a read session over the host's branch, runs its
//! combiner, and remembers which tables the combiner looked at. The next
//! call reuses the cached result while every one of those tables is the
//! same `Arc` and the parameters compare equal.

use relstore_core::db::{Branch, Registry, Session, TableState};
use std::{
    cell::{Cell, RefCell},
    sync::Arc,
};

type BranchReader<'r, S> = Box<dyn Fn(&S) -> Branch + 'r>;
type ParamReader<'r, S, P> = Box<dyn Fn(&S) -> P + 'r>;
type Combiner<'r, P, T> = Box<dyn Fn(&Session<'_>, &P) -> T + 'r>;

///
/// Selector
///

pub struct Selector<'r, S, P, T> {
    registry: &'r Registry,
    branch_reader: BranchReader<'r, S>,
    param_reader: ParamReader<'r, S, P>,
    combiner: Combiner<'r, P, T>,
    cache: RefCell<Option<Memo<P, T>>>,
    recomputations: Cell<usize>,
}

// Tables the last run read, by identity, with the result they produced.
struct Memo<P, T> {
    tables: Vec<(String, Option<Arc<TableState>>)>,
    params: P,
    value: T,
}

impl<P, T> Memo<P, T> {
    fn is_fresh(&self, branch: &Branch, params: &P) -> bool
    where
        P: PartialEq,
    {
        self.params == *params
            && self.tables.iter().all(|(entity, seen)| {
                match (seen, branch.table(entity)) {
                    (Some(seen), Some(now)) => Arc::ptr_eq(seen, now),
                    (None, None) => true,
                    _ => false,
                }
            })
    }
}

impl<S, P, T> Selector<'_, S, P, T>
where
    P: PartialEq,
    T: Clone,
{
    /// Derived value for `state`, recomputed only when an input changed.
    pub fn select(&self, state: &S) -> T {
        let branch = (self.branch_reader)(state);
        let params = (self.param_reader)(state);

        if let Some(memo) = self.cache.borrow().as_ref()
            && memo.is_fresh(&branch, &params)
        {
            return memo.value.clone();
        }

        let session = self.registry.session(branch.clone());
        let value = (self.combiner)(&session, &params);
        let tables = session
            .accessed_entities()
            .into_iter()
            .map(|entity| {
                let table = branch.table(&entity).cloned();
                (entity, table)
            })
            .collect();

        self.recomputations.set(self.recomputations.get() + 1);
        tracing::trace!(runs = self.recomputations.get(), "selector recomputed");

        *self.cache.borrow_mut() = Some(Memo {
            tables,
            params,
            value: value.clone(),
        });

        value
    }

    /// How many times the combiner has actually run.
    #[must_use]
    pub fn recomputations(&self) -> usize {
        self.recomputations.get()
    }
}

/// Selector over the branch alone.
pub fn create_selector<'r, S, T>(
    registry: &'r Registry,
    branch_reader: impl Fn(&S) -> Branch + 'r,
    combiner: impl Fn(&Session<'_>) -> T + 'r,
) -> Selector<'r, S, (), T>
where
    T: Clone,
{
    create_selector_with(registry, branch_reader, |_| (), move |session, ()| {
        combiner(session)
    })
}

/// Selector over the branch plus caller parameters read from the same state.
pub fn create_selector_with<'r, S, P, T>(
    registry: &'r Registry,
    branch_reader: impl Fn(&S) -> Branch + 'r,
    param_reader: impl Fn(&S) -> P + 'r,
    combiner: impl Fn(&Session<'_>, &P) -> T + 'r,
) -> Selector<'r, S, P, T>
where
    P: PartialEq,
    T: Clone,
{
    Selector {
        registry,
        branch_reader: Box::new(branch_reader),
        param_reader: Box::new(param_reader),
        combiner: Box::new(combiner),
        cache: RefCell::new(None),
        recomputations: Cell::new(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_core::{
        key::IdKind,
        model::{EntityDeclaration, FieldDescriptor},
        props,
        value::Value,
    };

    struct AppState {
        db: Branch,
        min_year: i64,
    }

    fn registry() -> Registry {
        Registry::register(vec![
            EntityDeclaration::new("Book")
                .id("title", IdKind::Text)
                .field("title", FieldDescriptor::attr())
                .field("year", FieldDescriptor::attr()),
            EntityDeclaration::new("Person")
                .id("id", IdKind::Text)
                .field("id", FieldDescriptor::attr()),
        ])
        .expect("schema should register")
    }

    fn seeded(registry: &Registry) -> Branch {
        let session = registry.session(registry.empty_state());
        session
            .create("Book", props! { "title" => "B1", "year" => 1990 })
            .unwrap();
        session
            .create("Book", props! { "title" => "B2", "year" => 2010 })
            .unwrap();
        session.state()
    }

    fn titles(session: &Session<'_>, min_year: i64) -> Vec<String> {
        session
            .entity("Book")
            .and_then(|book| book.all().to_ref_array())
            .unwrap_or_default()
            .into_iter()
            .filter(|row| matches!(row.value("year"), Value::Int(y) if y >= min_year))
            .map(|row| row.id().to_string())
            .collect()
    }

    #[test]
    fn reuses_result_while_read_tables_are_unchanged() {
        let registry = registry();
        let selector = create_selector(
            &registry,
            |state: &AppState| state.db.clone(),
            |session| titles(session, 0),
        );
        let mut state = AppState {
            db: seeded(&registry),
            min_year: 0,
        };

        assert_eq!(selector.select(&state), vec!["B1", "B2"]);
        assert_eq!(selector.select(&state), vec!["B1", "B2"]);
        assert_eq!(selector.recomputations(), 1);

        // A change to a table the combiner never read keeps the memo.
        let session = registry.session(state.db.clone());
        session.create("Person", props! { "id" => "p1" }).unwrap();
        state.db = session.state();
        assert_eq!(selector.select(&state), vec!["B1", "B2"]);
        assert_eq!(selector.recomputations(), 1);

        let session = registry.session(state.db.clone());
        session
            .create("Book", props! { "title" => "B3", "year" => 2020 })
            .unwrap();
        state.db = session.state();
        assert_eq!(selector.select(&state), vec!["B1", "B2", "B3"]);
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn recomputes_when_parameters_change() {
        let registry = registry();
        let selector = create_selector_with(
            &registry,
            |state: &AppState| state.db.clone(),
            |state: &AppState| state.min_year,
            |session, min_year| titles(session, *min_year),
        );
        let mut state = AppState {
            db: seeded(&registry),
            min_year: 2000,
        };

        assert_eq!(selector.select(&state), vec!["B2"]);
        assert_eq!(selector.select(&state), vec!["B2"]);
        assert_eq!(selector.recomputations(), 1);

        state.min_year = 1900;
        assert_eq!(selector.select(&state), vec!["B1", "B2"]);
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn whole_branch_reads_depend_on_every_table() {
        let registry = registry();
        let selector = create_selector(
            &registry,
            |state: &AppState| state.db.clone(),
            |session| {
                session
                    .peek_state()
                    .table("Book")
                    .map_or(0, |table| table.len())
            },
        );
        let mut state = AppState {
            db: registry.empty_state(),
            min_year: 0,
        };
        assert_eq!(selector.select(&state), 0);

        let session = registry.session(state.db.clone());
        session
            .create("Book", props! { "title" => "B1", "year" => 1990 })
            .unwrap();
        state.db = session.state();

        assert_eq!(selector.select(&state), 1);
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn noop_session_keeps_memo() {
        let registry = registry();
        let selector = create_selector(
            &registry,
            |state: &AppState| state.db.clone(),
            |session| titles(session, 0),
        );
        let mut state = AppState {
            db: seeded(&registry),
            min_year: 0,
        };
        selector.select(&state);

        state.db = registry.session(state.db.clone()).state();
        selector.select(&state);
        assert_eq!(selector.recomputations(), 1);
    }
}
