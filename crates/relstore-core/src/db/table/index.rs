use crate::key::Key;
use derive_more::Deref;
use serde::Serialize;
use std::collections::BTreeMap;

///
/// ReverseIndex
///
/// Reverse map for one foreign-key / one-to-one field:
/// target id → owning ids, in insertion order and without duplicates.
/// Empty slots are dropped so membership mirrors live rows exactly.
///

#[derive(Clone, Debug, Default, Deref, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReverseIndex(BTreeMap<Key, Vec<Key>>);

impl ReverseIndex {
    /// Owning ids recorded for `target`; empty when none.
    #[must_use]
    pub fn slot(&self, target: &Key) -> &[Key] {
        self.0.get(target).map_or(&[], Vec::as_slice)
    }

    /// Record `owner` under `target`. Returns false when already present.
    pub(crate) fn add(&mut self, target: Key, owner: &Key) -> bool {
        let slot = self.0.entry(target).or_default();
        if slot.contains(owner) {
            return false;
        }
        slot.push(owner.clone());

        true
    }

    /// Drop `owner` from `target`. Returns false when it was not recorded.
    pub(crate) fn remove(&mut self, target: &Key, owner: &Key) -> bool {
        let Some(slot) = self.0.get_mut(target) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|id| id != owner);
        let removed = slot.len() != before;

        if slot.is_empty() {
            self.0.remove(target);
        }

        removed
    }
}
