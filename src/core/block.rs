//! Block implementation for the blockchain
//!
//! A block contains a header with metadata and a list of transactions. The
//! header commits to the transaction merkle root and to the name tree root.

use crate::config::Network;
use crate::core::address::Address;
use crate::core::encoding::{write_u32, write_u64};
use crate::core::transaction::Transaction;
use crate::crypto::{calculate_merkle_root, double_sha256, sha256, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Block Constants
// =============================================================================

/// Maximum block size in bytes
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum number of transactions per block
pub const MAX_BLOCK_TXS: usize = 10_000;

/// Current header version
pub const BLOCK_VERSION: u32 = 0;

// =============================================================================
// Block Errors
// =============================================================================

/// Context-free block errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Block has no transactions")]
    Empty,
    #[error("Block too large: {0} bytes (max: {MAX_BLOCK_SIZE})")]
    BlockTooLarge(usize),
    #[error("Too many transactions: {0} (max: {MAX_BLOCK_TXS})")]
    TooManyTransactions(usize),
    #[error("First transaction is not a coinbase")]
    MissingCoinbase,
    #[error("Coinbase at position {0}")]
    MisplacedCoinbase(usize),
    #[error("Duplicate transaction {0}")]
    DuplicateTransaction(Hash),
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
}

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transaction ids
    pub merkle_root: Hash,
    /// Name tree root this block commits to
    pub tree_root: Hash,
    /// Unix timestamp in seconds
    pub time: u64,
    /// Work exponent; a block contributes `2^bits` to chain work
    pub bits: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 32 * 3 + 8 + 4 + 8);
        write_u32(&mut buf, self.version);
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(self.merkle_root.as_bytes());
        buf.extend_from_slice(self.tree_root.as_bytes());
        write_u64(&mut buf, self.time);
        write_u32(&mut buf, self.bits);
        write_u64(&mut buf, self.nonce);
        buf
    }

    /// Calculate the hash of the block header
    pub fn hash(&self) -> Hash {
        double_sha256(&self.encode())
    }
}

/// A block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block on top of `prev_hash`; the tree root is filled in by
    /// the block assembler
    pub fn new(prev_hash: Hash, transactions: Vec<Transaction>, time: u64, bits: u32) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);
        let header = BlockHeader {
            version: BLOCK_VERSION,
            prev_hash,
            merkle_root,
            tree_root: Hash::ZERO,
            time,
            bits,
            nonce: 0,
        };
        Self {
            header,
            transactions,
        }
    }

    /// Create the genesis block; it commits to the empty name tree
    pub fn genesis(network: Network) -> Self {
        let coinbase = Transaction::coinbase(0, Address::null(), 0);
        let mut block = Self::new(
            Hash::ZERO,
            vec![coinbase],
            network.genesis_time(),
            network.genesis_bits(),
        );
        block.header.tree_root = sha256(b"");
        block
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Calculate the merkle root from transactions
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash {
        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        calculate_merkle_root(&tx_hashes)
    }

    /// Verify the block's merkle root
    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.header.merkle_root
    }

    /// Calculate block size in bytes
    pub fn size(&self) -> usize {
        self.header.encode().len() + self.transactions.iter().map(|tx| tx.size()).sum::<usize>()
    }

    /// Checks that need no chain context
    pub fn check_sanity(&self) -> Result<(), BlockError> {
        if self.transactions.is_empty() {
            return Err(BlockError::Empty);
        }
        if self.transactions.len() > MAX_BLOCK_TXS {
            return Err(BlockError::TooManyTransactions(self.transactions.len()));
        }

        let size = self.size();
        if size > MAX_BLOCK_SIZE {
            return Err(BlockError::BlockTooLarge(size));
        }

        if !self.transactions[0].is_coinbase() {
            return Err(BlockError::MissingCoinbase);
        }

        let mut seen = HashSet::new();
        for (index, tx) in self.transactions.iter().enumerate() {
            if index > 0 && tx.is_coinbase() {
                return Err(BlockError::MisplacedCoinbase(index));
            }
            let hash = tx.hash();
            if !seen.insert(hash) {
                return Err(BlockError::DuplicateTransaction(hash));
            }
        }

        if !self.verify_merkle_root() {
            return Err(BlockError::InvalidMerkleRoot);
        }

        Ok(())
    }
}
