//! namechain: a UTXO node core with a blind-auction naming system
//!
//! This crate provides:
//! - Covenant-tagged outputs driving name auctions (open, bid, reveal,
//!   redeem) and ownership (register, update, renew, transfer, finalize,
//!   revoke)
//! - A name state machine applied per transaction on top of the UTXO set
//! - Periodic name-tree commitments carried in every block header
//! - Atomic block connect/disconnect with undo records and reorganizations
//! - A mempool with replace-by-fee and per-name update reservations
//! - A tokio node facade with chain events
//!
//! # Example
//!
//! ```rust
//! use namechain::config::{ChainOptions, Network};
//! use namechain::core::{Address, Chain};
//!
//! let mut chain = Chain::new(ChainOptions::new(Network::Regtest)).unwrap();
//! let miner = Address::new(0, vec![7; 20]);
//!
//! let block = chain.build_block(vec![], miner.clone(), 1, 1).unwrap();
//! chain.connect_block(&block).unwrap();
//!
//! assert_eq!(chain.height(), 1);
//! assert_eq!(chain.balance(&miner).spendable, chain.network().block_reward());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod covenant;
pub mod crypto;
pub mod mining;
pub mod names;
pub mod node;
pub mod storage;
pub mod tree;

// Re-export commonly used types
pub use config::{ChainOptions, MempoolOptions, NameRules, Network};
pub use core::{
    Address, Balance, Block, BlockchainError, Chain, Coin, Outpoint, Output, Transaction,
    VerifyError,
};
pub use covenant::{Covenant, CovenantType, NameCovenant, NameHash};
pub use crypto::{Hash, KeyPair};
pub use mining::{BlockAssembler, Mempool, MempoolError};
pub use names::{AuctionPhase, NameState};
pub use node::{ChainEvent, Node, NodeConfig, NodeError};
pub use storage::{FileStore, KvStore, MemoryStore, StorageError};
pub use tree::{NameProof, TreeCommitment};
