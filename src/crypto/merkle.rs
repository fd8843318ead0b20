//! Merkle tree implementation
//!
//! Binary SHA-256 hash tree used for the transaction root of a block and
//! for the leaves of the name tree. An odd node at any level is paired with
//! itself.

use super::hash::{sha256, sha256_concat, Hash};

/// Calculate the merkle root from a list of leaf hashes
pub fn calculate_merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = next_level(&current_level);
    }

    current_level[0]
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|chunk| {
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            sha256_concat(&[chunk[0].as_bytes(), right.as_bytes()])
        })
        .collect()
}

/// Merkle proof for verifying leaf inclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// List of sibling hashes from leaf to root
    pub siblings: Vec<(Hash, bool)>, // (hash, is_left)
}

impl MerkleProof {
    /// Build the proof for the leaf at `index`
    pub fn build(hashes: &[Hash], index: usize) -> Option<Self> {
        if index >= hashes.len() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut level = hashes.to_vec();
        let mut position = index;

        while level.len() > 1 {
            let sibling_pos = position ^ 1;
            let sibling = *level.get(sibling_pos).unwrap_or(&level[position]);
            siblings.push((sibling, position % 2 == 1));
            level = next_level(&level);
            position /= 2;
        }

        Some(Self { siblings })
    }

    /// Verify the proof against a root hash
    pub fn verify(&self, leaf_hash: &Hash, root_hash: &Hash) -> bool {
        let mut current = *leaf_hash;

        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                sha256_concat(&[sibling.as_bytes(), current.as_bytes()])
            } else {
                sha256_concat(&[current.as_bytes(), sibling.as_bytes()])
            };
        }

        current == *root_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_root_single() {
        let hashes = vec![sha256(b"tx1")];
        assert_eq!(calculate_merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hash1 = sha256(b"tx1");
        let hash2 = sha256(b"tx2");
        let root = calculate_merkle_root(&[hash1, hash2]);
        assert_eq!(root, sha256_concat(&[hash1.as_bytes(), hash2.as_bytes()]));
    }

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(calculate_merkle_root(&[]), sha256(b""));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        let hashes: Vec<Hash> = (0..5u8).map(|i| sha256(&[i])).collect();
        let root = calculate_merkle_root(&hashes);

        for (i, leaf) in hashes.iter().enumerate() {
            let proof = MerkleProof::build(&hashes, i).unwrap();
            assert!(proof.verify(leaf, &root), "leaf {} failed", i);
        }

        let proof = MerkleProof::build(&hashes, 2).unwrap();
        assert!(!proof.verify(&hashes[3], &root));
        assert!(MerkleProof::build(&hashes, 5).is_none());
    }
}
