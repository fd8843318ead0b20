//! Tree commitment schedule
//!
//! A block at a height divisible by the tree interval commits to the root
//! computed after applying it. Every other block repeats the last committed
//! root. Name changes made between boundaries are tracked as pending until
//! the next commitment.

use crate::covenant::NameHash;
use crate::crypto::{sha256, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tree root mismatch at height {height}: expected {expected}, header has {found}")]
pub struct TreeRootMismatch {
    pub height: u32,
    pub expected: Hash,
    pub found: Hash,
}

/// A committed tree root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeCommitment {
    pub height: u32,
    pub root: Hash,
    pub block_hash: Hash,
}

#[derive(Debug, Clone)]
pub struct TreeScheduler {
    interval: u32,
    commitments: BTreeMap<u32, TreeCommitment>,
    pending: BTreeSet<NameHash>,
}

impl TreeScheduler {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            commitments: BTreeMap::new(),
            pending: BTreeSet::new(),
        }
    }

    pub fn with_commitments<I>(interval: u32, commitments: I) -> Self
    where
        I: IntoIterator<Item = TreeCommitment>,
    {
        let mut scheduler = Self::new(interval);
        for commitment in commitments {
            scheduler.commitments.insert(commitment.height, commitment);
        }
        scheduler
    }

    pub fn is_boundary(&self, height: u32) -> bool {
        height % self.interval == 0
    }

    pub fn last_commitment(&self) -> Option<&TreeCommitment> {
        self.commitments.values().next_back()
    }

    /// Root of the last commitment, or the empty root before genesis
    pub fn last_root(&self) -> Hash {
        self.last_commitment()
            .map(|commitment| commitment.root)
            .unwrap_or_else(|| sha256(b""))
    }

    /// Root a block at `height` must carry; `compute` is only invoked at a
    /// boundary
    pub fn expected_root<F>(&self, height: u32, compute: F) -> Hash
    where
        F: FnOnce() -> Hash,
    {
        if self.is_boundary(height) {
            compute()
        } else {
            self.last_root()
        }
    }

    pub fn verify(&self, height: u32, expected: Hash, found: Hash) -> Result<(), TreeRootMismatch> {
        if expected != found {
            return Err(TreeRootMismatch {
                height,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Account for a connected block
    pub fn on_connect<'a, I>(&mut self, height: u32, root: Hash, block_hash: Hash, touched: I)
    where
        I: IntoIterator<Item = &'a NameHash>,
    {
        if self.is_boundary(height) {
            self.commitments.insert(
                height,
                TreeCommitment {
                    height,
                    root,
                    block_hash,
                },
            );
            self.pending.clear();
        } else {
            self.pending.extend(touched);
        }
    }

    /// Account for a disconnected block; returns the commitment it removed
    pub fn on_disconnect<'a, I>(&mut self, height: u32, touched: I) -> Option<TreeCommitment>
    where
        I: IntoIterator<Item = &'a NameHash>,
    {
        self.pending.extend(touched);
        self.commitments.remove(&height)
    }

    pub fn commitment(&self, height: u32) -> Option<&TreeCommitment> {
        self.commitments.get(&height)
    }

    pub fn commitments(&self) -> impl Iterator<Item = &TreeCommitment> {
        self.commitments.values()
    }

    /// Names changed since the last commitment
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_boundary_repeats_last_root() {
        let mut scheduler = TreeScheduler::new(5);
        assert_eq!(scheduler.last_root(), sha256(b""));

        let root = sha256(b"root");
        scheduler.on_connect(5, root, sha256(b"block5"), std::iter::empty());

        let computed = scheduler.expected_root(7, || panic!("not a boundary"));
        assert_eq!(computed, root);
        assert_eq!(scheduler.expected_root(10, || sha256(b"new")), sha256(b"new"));
    }

    #[test]
    fn test_pending_updates() {
        let mut scheduler = TreeScheduler::new(5);
        let a = sha256(b"a");
        let b = sha256(b"b");

        scheduler.on_connect(6, Hash::ZERO, Hash::ZERO, [&a, &b]);
        scheduler.on_connect(7, Hash::ZERO, Hash::ZERO, [&a]);
        assert_eq!(scheduler.pending_updates(), 2);

        scheduler.on_connect(10, sha256(b"r"), Hash::ZERO, [&a]);
        assert_eq!(scheduler.pending_updates(), 0);
        assert!(scheduler.commitment(10).is_some());
    }

    #[test]
    fn test_disconnect_removes_commitment() {
        let mut scheduler = TreeScheduler::new(5);
        scheduler.on_connect(0, sha256(b"r0"), Hash::ZERO, std::iter::empty());
        scheduler.on_connect(5, sha256(b"r5"), Hash::ZERO, std::iter::empty());

        let removed = scheduler.on_disconnect(5, std::iter::empty()).unwrap();
        assert_eq!(removed.root, sha256(b"r5"));
        assert_eq!(scheduler.last_root(), sha256(b"r0"));
        assert!(scheduler.on_disconnect(4, std::iter::empty()).is_none());
    }

    #[test]
    fn test_mismatch_error() {
        let scheduler = TreeScheduler::new(5);
        let err = scheduler
            .verify(5, sha256(b"a"), sha256(b"b"))
            .unwrap_err();
        assert_eq!(err.height, 5);
        assert_eq!(err.expected, sha256(b"a"));
    }
}
