use crate::obs::sink::{ExecKind, MetricsEvent, MetricsSink};
use serde::Serialize;
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for store operations.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EventOps {
    pub create_calls: u64,
    pub update_calls: u64,
    pub delete_calls: u64,

    // Rows touched
    pub rows_scanned: u64,
    pub rows_deleted: u64,
    pub rows_cascaded: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EntityCounters {
    pub create_calls: u64,
    pub update_calls: u64,
    pub delete_calls: u64,
    pub rows_scanned: u64,
    pub rows_deleted: u64,
    pub index_inserts: u64,
    pub index_removes: u64,
}

///
/// MetricsState
///
/// Counting sink. Sessions are single-threaded, so plain `RefCell`
/// interior mutability is enough.
///

#[derive(Debug, Default)]
pub struct MetricsState {
    state: RefCell<EventState>,
}

impl MetricsState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> EventState {
        self.state.borrow().clone()
    }

    pub fn reset(&self) {
        *self.state.borrow_mut() = EventState::default();
    }

    fn with_entity(&self, entity: &str, f: impl FnOnce(&mut EventOps, &mut EntityCounters)) {
        let mut state = self.state.borrow_mut();
        let EventState { ops, entities } = &mut *state;
        let entry = entities.entry(entity.to_string()).or_default();
        f(ops, entry);
    }
}

impl MetricsSink for MetricsState {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::Exec {
                kind,
                entity,
                rows_touched,
            } => self.with_entity(entity, |ops, entry| match kind {
                ExecKind::Create => {
                    ops.create_calls = ops.create_calls.saturating_add(1);
                    entry.create_calls = entry.create_calls.saturating_add(1);
                }
                ExecKind::Update => {
                    ops.update_calls = ops.update_calls.saturating_add(1);
                    entry.update_calls = entry.update_calls.saturating_add(1);
                }
                ExecKind::Delete => {
                    ops.delete_calls = ops.delete_calls.saturating_add(1);
                    ops.rows_deleted = ops.rows_deleted.saturating_add(rows_touched);
                    entry.delete_calls = entry.delete_calls.saturating_add(1);
                    entry.rows_deleted = entry.rows_deleted.saturating_add(rows_touched);
                }
            }),

            MetricsEvent::Cascade {
                entity,
                rows_deleted,
            } => self.with_entity(entity, |ops, _| {
                ops.rows_cascaded = ops.rows_cascaded.saturating_add(rows_deleted);
            }),

            MetricsEvent::IndexDelta {
                entity,
                inserts,
                removes,
            } => self.with_entity(entity, |ops, entry| {
                ops.index_inserts = ops.index_inserts.saturating_add(inserts);
                ops.index_removes = ops.index_removes.saturating_add(removes);
                entry.index_inserts = entry.index_inserts.saturating_add(inserts);
                entry.index_removes = entry.index_removes.saturating_add(removes);
            }),

            MetricsEvent::RowsScanned {
                entity,
                rows_scanned,
            } => self.with_entity(entity, |ops, entry| {
                ops.rows_scanned = ops.rows_scanned.saturating_add(rows_scanned);
                entry.rows_scanned = entry.rows_scanned.saturating_add(rows_scanned);
            }),
        }
    }
}
