use crate::db::table::TableState;
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, sync::Arc};

///
/// Branch
///
/// Immutable snapshot of the whole store, keyed by entity name.
/// Cloning is cheap; tables are shared by `Arc` so unchanged entities keep
/// their identity across sessions.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    tables: Arc<BTreeMap<String, Arc<TableState>>>,
}

impl Branch {
    pub(crate) fn new(tables: BTreeMap<String, Arc<TableState>>) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    #[must_use]
    pub fn table(&self, entity: &str) -> Option<&Arc<TableState>> {
        self.tables.get(entity)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &Arc<TableState>)> {
        self.tables
            .iter()
            .map(|(name, table)| (name.as_str(), table))
    }

    /// True when both branches are the very same snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tables, &other.tables)
    }

    /// True when `entity`'s table is the very same allocation in both branches.
    #[must_use]
    pub fn shares_table(&self, other: &Self, entity: &str) -> bool {
        match (self.table(entity), other.table(entity)) {
            (Some(left), Some(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }

    // Replace the given tables, sharing every other entry.
    pub(crate) fn with_tables(&self, changed: impl IntoIterator<Item = (String, TableState)>) -> Self {
        let mut tables = self.tables.as_ref().clone();
        for (entity, table) in changed {
            tables.insert(entity, Arc::new(table));
        }

        Self::new(tables)
    }

    /// Export as a plain JSON document.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for Branch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tables.serialize(serializer)
    }
}
