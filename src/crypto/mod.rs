//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing and the fixed-width digest type
//! - ECDSA key management (secp256k1)
//! - Merkle tree calculations and inclusion proofs

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{double_sha256, serde_hex, sha256, sha256_concat, sha256_hex, Hash, HashError, HASH_SIZE};
pub use keys::{hash160, public_key_from_slice, verify_signature, KeyError, KeyPair};
pub use merkle::{calculate_merkle_root, MerkleProof};
