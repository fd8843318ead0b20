//! Staged coin changes on top of the committed UTXO set

use crate::core::transaction::{Coin, Outpoint};
use std::collections::{HashMap, HashSet};

/// Overlay over the committed coin map
///
/// Coins created and spent inside the same view never reach the committed
/// set and leave no undo record.
#[derive(Debug, Clone)]
pub struct CoinView<'a> {
    base: &'a HashMap<Outpoint, Coin>,
    created: HashMap<Outpoint, Coin>,
    created_order: Vec<Outpoint>,
    spent: Vec<(Outpoint, Coin)>,
    spent_base: HashSet<Outpoint>,
}

impl<'a> CoinView<'a> {
    pub fn new(base: &'a HashMap<Outpoint, Coin>) -> Self {
        Self {
            base,
            created: HashMap::new(),
            created_order: Vec::new(),
            spent: Vec::new(),
            spent_base: HashSet::new(),
        }
    }

    pub fn get(&self, outpoint: &Outpoint) -> Option<&Coin> {
        if let Some(coin) = self.created.get(outpoint) {
            return Some(coin);
        }
        if self.spent_base.contains(outpoint) {
            return None;
        }
        self.base.get(outpoint)
    }

    /// Remove a coin, returning it if it was unspent
    pub fn spend(&mut self, outpoint: &Outpoint) -> Option<Coin> {
        if let Some(coin) = self.created.remove(outpoint) {
            return Some(coin);
        }
        if self.spent_base.contains(outpoint) {
            return None;
        }
        let coin = self.base.get(outpoint)?.clone();
        self.spent_base.insert(*outpoint);
        self.spent.push((*outpoint, coin.clone()));
        Some(coin)
    }

    pub fn add(&mut self, outpoint: Outpoint, coin: Coin) {
        self.created_order.push(outpoint);
        self.created.insert(outpoint, coin);
    }

    pub fn into_changes(mut self) -> CoinChanges {
        let created = self
            .created_order
            .into_iter()
            .filter_map(|outpoint| {
                self.created
                    .remove(&outpoint)
                    .map(|coin| (outpoint, coin))
            })
            .collect();
        CoinChanges {
            created,
            spent: self.spent,
        }
    }
}

/// Output of a [`CoinView`]
#[derive(Debug, Default)]
pub struct CoinChanges {
    /// New coins still unspent, in creation order
    pub created: Vec<(Outpoint, Coin)>,
    /// Committed coins consumed, in spend order
    pub spent: Vec<(Outpoint, Coin)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::Address;
    use crate::core::transaction::Output;
    use crate::crypto::sha256;

    fn coin(value: u64) -> Coin {
        Coin::from_output(&Output::new(value, Address::null()), 1, false)
    }

    #[test]
    fn test_spend_committed_coin_once() {
        let mut base = HashMap::new();
        let op = Outpoint::new(sha256(b"a"), 0);
        base.insert(op, coin(5));

        let mut view = CoinView::new(&base);
        assert_eq!(view.spend(&op).map(|c| c.value), Some(5));
        assert!(view.get(&op).is_none());
        assert!(view.spend(&op).is_none());

        let changes = view.into_changes();
        assert_eq!(changes.spent.len(), 1);
        assert!(changes.created.is_empty());
    }

    #[test]
    fn test_created_then_spent_leaves_no_trace() {
        let base = HashMap::new();
        let mut view = CoinView::new(&base);
        let op = Outpoint::new(sha256(b"b"), 0);
        let kept = Outpoint::new(sha256(b"b"), 1);

        view.add(op, coin(3));
        view.add(kept, coin(4));
        assert!(view.spend(&op).is_some());

        let changes = view.into_changes();
        assert!(changes.spent.is_empty());
        assert_eq!(changes.created.len(), 1);
        assert_eq!(changes.created[0].0, kept);
    }
}
