//! Staged name-state changes on top of committed state

use crate::covenant::NameHash;
use std::collections::{BTreeMap, HashSet};

use super::state::NameState;

/// Overlay over the committed name map
///
/// Reads fall through to the base map. The first write to a name records
/// its committed value so a connected block can be undone.
#[derive(Debug, Clone)]
pub struct NameView<'a> {
    base: &'a BTreeMap<NameHash, NameState>,
    changes: BTreeMap<NameHash, Option<NameState>>,
    originals: Vec<(NameHash, Option<NameState>)>,
    touched: HashSet<NameHash>,
}

impl<'a> NameView<'a> {
    pub fn new(base: &'a BTreeMap<NameHash, NameState>) -> Self {
        Self {
            base,
            changes: BTreeMap::new(),
            originals: Vec::new(),
            touched: HashSet::new(),
        }
    }

    pub fn get(&self, name_hash: &NameHash) -> Option<&NameState> {
        match self.changes.get(name_hash) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(name_hash),
        }
    }

    /// Stage a new value; `None` removes the name
    pub fn set(&mut self, name_hash: NameHash, state: Option<NameState>) {
        if self.touched.insert(name_hash) {
            self.originals
                .push((name_hash, self.base.get(&name_hash).cloned()));
        }
        self.changes.insert(name_hash, state);
    }

    /// Every live name as seen through the overlay
    pub fn entries(&self) -> Vec<(&NameHash, &NameState)> {
        let mut entries: Vec<(&NameHash, &NameState)> = self
            .base
            .iter()
            .filter(|(name_hash, _)| !self.changes.contains_key(*name_hash))
            .collect();
        entries.extend(
            self.changes
                .iter()
                .filter_map(|(name_hash, state)| state.as_ref().map(|state| (name_hash, state))),
        );
        entries
    }

    /// Staged values and the committed values they replace
    pub fn into_changes(self) -> NameChanges {
        NameChanges {
            updates: self.changes.into_iter().collect(),
            originals: self.originals,
        }
    }
}

/// Output of a [`NameView`]
#[derive(Debug, Default)]
pub struct NameChanges {
    pub updates: Vec<(NameHash, Option<NameState>)>,
    /// Committed value of each touched name before the block
    pub originals: Vec<(NameHash, Option<NameState>)>,
}
