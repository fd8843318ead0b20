//! Transaction pooling and block assembly

pub mod mempool;
pub mod miner;

pub use mempool::{Mempool, MempoolEntry, MempoolError, MempoolStats, MIN_RBF_FEE_BUMP_PERCENT};
pub use miner::{AssemblyStats, BlockAssembler};
