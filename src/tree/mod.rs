//! Name tree commitments
//!
//! This module provides:
//! - Deterministic root computation over live name state
//! - Inclusion proofs for individual names
//! - The interval scheduler deciding which root a block must carry

pub mod root;
pub mod scheduler;

pub use root::{compute_root, leaf_hash, NameProof, NameTree};
pub use scheduler::{TreeCommitment, TreeRootMismatch, TreeScheduler};
