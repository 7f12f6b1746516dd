//! Module: db::session
//! Responsibility: transactional unit of work over one branch snapshot.
//! Does not own: per-table transitions (table) or query evaluation (query).
//! Boundary: every mutation runs on a private `Txn` and commits whole or
//! not at all; reads always see the latest committed in-flight branch.

mod entity;
mod txn;


pub use entity::BoundEntity;

use crate::{
    db::{
        Branch,
        registry::Registry,
        relation::{ManyLink, RelationInput},
        row::{PropValue, Props, Ref},
        table::TableState,
    },
    error::Error,
    key::Key,
    obs::sink::{ExecKind, MetricsEvent, MetricsSink},
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    sync::Arc,
};
use txn::{Txn, TxnOutcome};

///
/// Session
///
/// Open until `state()` is read; afterwards it stays queryable but every
/// mutation fails with `Error::SessionClosed`. Interior mutability lets
/// live query sets and bound rows coexist with mutations, which also makes
/// a session `!Sync`.
///

pub struct Session<'r> {
    registry: &'r Registry,
    current: RefCell<Branch>,
    touched: RefCell<BTreeSet<String>>,
    accessed: RefCell<BTreeSet<String>>,
    closed: Cell<bool>,
    debug: bool,
    metrics: Option<&'r dyn MetricsSink>,
}

impl<'r> Session<'r> {
    pub(crate) fn new(registry: &'r Registry, branch: Branch) -> Self {
        Self {
            registry,
            current: RefCell::new(branch),
            touched: RefCell::new(BTreeSet::new()),
            accessed: RefCell::new(BTreeSet::new()),
            closed: Cell::new(false),
            debug: registry.session_debug(),
            metrics: None,
        }
    }

    /// Log a summary of every committed mutation at `info` level.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: &'r dyn MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &'r Registry {
        self.registry
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// The branch after every mutation so far. Closes the session.
    ///
    /// Untouched entities keep the exact table allocation of the input
    /// branch; an untouched session returns the input branch itself.
    pub fn state(&self) -> Branch {
        self.closed.set(true);
        self.peek_state()
    }

    /// The in-flight branch, without closing the session.
    /// Every entity counts as accessed, since the caller can read any table.
    #[must_use]
    pub fn peek_state(&self) -> Branch {
        let branch = self.current.borrow().clone();
        self.accessed
            .borrow_mut()
            .extend(branch.tables().map(|(entity, _)| entity.to_string()));

        branch
    }

    /// Entities with at least one committed change.
    #[must_use]
    pub fn touched_entities(&self) -> BTreeSet<String> {
        self.touched.borrow().clone()
    }

    /// Entities whose tables were read through this session.
    #[must_use]
    pub fn accessed_entities(&self) -> BTreeSet<String> {
        self.accessed.borrow().clone()
    }

    /// Current table for `entity`; marks it accessed.
    pub fn table(&self, entity: &str) -> Result<Arc<TableState>, Error> {
        let table = self
            .current
            .borrow()
            .table(entity)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;
        self.accessed.borrow_mut().insert(entity.to_string());

        Ok(table)
    }

    // ------------------------------------------------------------------
    // Entity API
    // ------------------------------------------------------------------

    pub fn entity(&self, name: &str) -> Result<BoundEntity<'_>, Error> {
        let declaration = self.registry.entity(name)?;

        Ok(BoundEntity::new(self, declaration.name()))
    }

    pub fn create(&self, entity: &str, props: Props) -> Result<Arc<Ref>, Error> {
        self.mutate(ExecKind::Create, entity, |txn| txn.create(entity, props))
    }

    pub fn update(&self, entity: &str, id: &Key, props: Props) -> Result<Arc<Ref>, Error> {
        self.mutate(ExecKind::Update, entity, |txn| txn.update(entity, id, props))
    }

    /// Update when the id is supplied and present, otherwise create.
    pub fn upsert(&self, entity: &str, props: Props) -> Result<Arc<Ref>, Error> {
        let declaration = self.registry.entity(entity)?;
        let existing = match props.get(declaration.id_attribute()) {
            Some(PropValue::Value(value)) => Key::from_value(value),
            _ => None,
        }
        .filter(|id| self.current.borrow().table(entity).is_some_and(|t| t.contains(id)));

        match existing {
            Some(id) => self.update(entity, &id, props),
            None => self.create(entity, props),
        }
    }

    /// Delete one row, cascading through every relation that targets it.
    /// Returns the number of rows removed, the root included.
    pub fn delete(&self, entity: &str, id: &Key) -> Result<usize, Error> {
        self.mutate(ExecKind::Delete, entity, |txn| txn.delete(entity, id))
    }

    // ------------------------------------------------------------------
    // Bulk and relation-manager entry points
    // ------------------------------------------------------------------

    pub(crate) fn update_all(&self, entity: &str, ids: &[Key], props: &Props) -> Result<usize, Error> {
        self.mutate(ExecKind::Update, entity, |txn| {
            for id in ids {
                txn.update(entity, id, props.clone())?;
            }
            Ok(ids.len())
        })
    }

    pub(crate) fn delete_all(&self, entity: &str, ids: &[Key]) -> Result<usize, Error> {
        self.mutate(ExecKind::Delete, entity, |txn| {
            let mut removed = 0;
            for id in ids {
                // an earlier cascade in this batch may already have removed it
                if txn.state(entity)?.contains(id) {
                    removed += txn.delete(entity, id)?;
                }
            }
            Ok(removed)
        })
    }

    pub(crate) fn add_related(
        &self,
        entity: &str,
        link: &ManyLink,
        owner: &Key,
        inputs: Vec<RelationInput>,
    ) -> Result<(), Error> {
        self.mutate(ExecKind::Update, &link.through, |txn| {
            ensure_owner(txn, entity, owner)?;
            txn.add_links(link, owner, &PropValue::Relations(inputs))
        })
    }

    pub(crate) fn remove_related(
        &self,
        entity: &str,
        link: &ManyLink,
        owner: &Key,
        inputs: Vec<RelationInput>,
    ) -> Result<(), Error> {
        self.mutate(ExecKind::Update, &link.through, |txn| {
            ensure_owner(txn, entity, owner)?;
            txn.remove_links(link, owner, &PropValue::Relations(inputs))
        })
    }

    pub(crate) fn clear_related(&self, entity: &str, link: &ManyLink, owner: &Key) -> Result<(), Error> {
        self.mutate(ExecKind::Update, &link.through, |txn| {
            ensure_owner(txn, entity, owner)?;
            txn.clear_links(link, owner)
        })
    }

    pub(crate) fn record_scan(&self, entity: &str, rows: usize) {
        if let Some(sink) = self.metrics {
            sink.record(MetricsEvent::RowsScanned {
                entity,
                rows_scanned: u64::try_from(rows).unwrap_or(u64::MAX),
            });
        }
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    fn mutate<T>(
        &self,
        kind: ExecKind,
        entity: &str,
        op: impl FnOnce(&mut Txn<'r>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.closed.get() {
            return Err(Error::SessionClosed);
        }

        let base = self.current.borrow().clone();
        let mut txn = Txn::new(self.registry, base);
        let out = op(&mut txn)?;
        let outcome = txn.finish();

        self.commit(kind, entity, outcome);

        Ok(out)
    }

    fn commit(&self, kind: ExecKind, entity: &str, outcome: TxnOutcome) {
        let TxnOutcome {
            branch,
            touched,
            deltas,
            rows_deleted,
        } = outcome;

        if let Some(branch) = branch {
            *self.current.borrow_mut() = branch;
        }
        self.touched.borrow_mut().extend(touched.iter().cloned());

        tracing::debug!(entity, ?kind, touched = touched.len(), "session mutation committed");
        if self.debug {
            let (inserts, removes) = deltas
                .values()
                .fold((0_u64, 0_u64), |(i, r), d| {
                    (i.saturating_add(d.inserts), r.saturating_add(d.removes))
                });
            tracing::info!(
                entity,
                ?kind,
                tables = ?touched,
                rows_deleted,
                index_inserts = inserts,
                index_removes = removes,
                "session debug"
            );
        }

        let Some(sink) = self.metrics else {
            return;
        };
        let rows_touched = match kind {
            ExecKind::Delete => rows_deleted,
            ExecKind::Create | ExecKind::Update => 1,
        };
        sink.record(MetricsEvent::Exec {
            kind,
            entity,
            rows_touched,
        });
        if kind == ExecKind::Delete && rows_deleted > 1 {
            sink.record(MetricsEvent::Cascade {
                entity,
                rows_deleted: rows_deleted - 1,
            });
        }
        for (table, delta) in &deltas {
            if delta.inserts > 0 || delta.removes > 0 {
                sink.record(MetricsEvent::IndexDelta {
                    entity: table,
                    inserts: delta.inserts,
                    removes: delta.removes,
                });
            }
        }
    }
}

fn ensure_owner(txn: &Txn<'_>, entity: &str, owner: &Key) -> Result<(), Error> {
    if txn.state(entity)?.contains(owner) {
        Ok(())
    } else {
        Err(Error::not_found(entity, owner))
    }
}
