//! Name tree root
//!
//! Leaves are `SHA-256(name_hash || encode(state))`, ordered by name hash
//! and folded with the block merkle construction. The root therefore
//! depends only on the set of live names, never on insertion order.

use crate::covenant::NameHash;
use crate::crypto::{calculate_merkle_root, sha256_concat, Hash, MerkleProof};
use crate::names::NameState;
use rayon::prelude::*;

/// Below this many leaves hashing stays on the calling thread
const PARALLEL_THRESHOLD: usize = 256;

pub fn leaf_hash(name_hash: &NameHash, state: &NameState) -> Hash {
    sha256_concat(&[name_hash.as_bytes(), &state.encode()])
}

fn sorted_leaves<'a, I>(names: I) -> Vec<(NameHash, Hash)>
where
    I: IntoIterator<Item = (&'a NameHash, &'a NameState)>,
{
    let mut entries: Vec<(&NameHash, &NameState)> = names.into_iter().collect();
    entries.sort_unstable_by_key(|(name_hash, _)| **name_hash);

    if entries.len() < PARALLEL_THRESHOLD {
        entries
            .iter()
            .map(|(name_hash, state)| (**name_hash, leaf_hash(name_hash, state)))
            .collect()
    } else {
        entries
            .par_iter()
            .map(|(name_hash, state)| (**name_hash, leaf_hash(name_hash, state)))
            .collect()
    }
}

/// Root over a set of live names
pub fn compute_root<'a, I>(names: I) -> Hash
where
    I: IntoIterator<Item = (&'a NameHash, &'a NameState)>,
{
    let leaves: Vec<Hash> = sorted_leaves(names).into_iter().map(|(_, leaf)| leaf).collect();
    calculate_merkle_root(&leaves)
}

/// Materialized tree for serving inclusion proofs
#[derive(Debug, Clone)]
pub struct NameTree {
    leaves: Vec<(NameHash, Hash)>,
    root: Hash,
}

impl NameTree {
    pub fn build<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = (&'a NameHash, &'a NameState)>,
    {
        let leaves = sorted_leaves(names);
        let hashes: Vec<Hash> = leaves.iter().map(|(_, leaf)| *leaf).collect();
        let root = calculate_merkle_root(&hashes);
        Self { leaves, root }
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Inclusion proof for a live name
    pub fn prove(&self, name_hash: &NameHash) -> Option<NameProof> {
        let index = self
            .leaves
            .binary_search_by_key(name_hash, |(key, _)| *key)
            .ok()?;
        let hashes: Vec<Hash> = self.leaves.iter().map(|(_, leaf)| *leaf).collect();
        let proof = MerkleProof::build(&hashes, index)?;
        Some(NameProof {
            name_hash: *name_hash,
            proof,
        })
    }
}

/// Proof that a name state is committed under a tree root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameProof {
    pub name_hash: NameHash,
    pub proof: MerkleProof,
}

impl NameProof {
    pub fn verify(&self, state: &NameState, root: &Hash) -> bool {
        self.proof.verify(&leaf_hash(&self.name_hash, state), root)
    }
}
