//! Chain State Management
//!
//! Handles the main-chain index, chain tips, cumulative work and the undo
//! records needed to disconnect blocks during reorganizations.

use crate::core::block::BlockHeader;
use crate::core::transaction::{Coin, Outpoint};
use crate::covenant::NameHash;
use crate::crypto::Hash;
use crate::names::{ChainLookup, NameState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Calculate the work contributed by a block with the given bits
/// Each bit doubles the work; saturates at 2^127
pub fn calculate_work(bits: u32) -> u128 {
    1u128 << bits.min(127)
}

/// Represents the end of the main chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub block_hash: Hash,
    pub height: u32,
    /// Total cumulative work up to and including the tip
    pub chain_work: u128,
}

/// A main-chain block as tracked by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub hash: Hash,
    pub height: u32,
    pub bits: u32,
    pub chain_work: u128,
}

/// Height-ordered index of the main chain
#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    entries: Vec<ChainEntry>,
    by_hash: HashMap<Hash, u32>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next main-chain header
    pub fn push(&mut self, header: &BlockHeader) -> &ChainEntry {
        let hash = header.hash();
        let height = self.entries.len() as u32;
        let prior = self.entries.last().map(|e| e.chain_work).unwrap_or(0);
        self.by_hash.insert(hash, height);
        self.entries.push(ChainEntry {
            hash,
            height,
            bits: header.bits,
            chain_work: prior.saturating_add(calculate_work(header.bits)),
        });
        &self.entries[height as usize]
    }

    pub fn pop(&mut self) -> Option<ChainEntry> {
        let entry = self.entries.pop()?;
        self.by_hash.remove(&entry.hash);
        Some(entry)
    }

    pub fn tip(&self) -> Option<&ChainEntry> {
        self.entries.last()
    }

    pub fn get(&self, height: u32) -> Option<&ChainEntry> {
        self.entries.get(height as usize)
    }

    pub fn height_of(&self, hash: &Hash) -> Option<u32> {
        self.by_hash.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Work of the blocks above `height`; zero when `height` is at or
    /// above the tip
    pub fn work_above(&self, height: u32) -> u128 {
        let base = self.get(height).map(|e| e.chain_work).unwrap_or(0);
        self.tip()
            .map(|e| e.chain_work)
            .unwrap_or(0)
            .saturating_sub(base)
    }
}

impl ChainLookup for BlockIndex {
    fn main_chain_height(&self, hash: &Hash) -> Option<u32> {
        self.height_of(hash)
    }
}

/// Data required to undo a block during reorganization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub height: u32,
    pub block_hash: Hash,
    /// Committed coins the block spent
    pub spent: Vec<(Outpoint, Coin)>,
    /// Coins the block left in the UTXO set
    pub created: Vec<Outpoint>,
    /// Value of every touched name before the block
    pub names: Vec<(NameHash, Option<NameState>)>,
}

impl BlockUndo {
    pub fn new(height: u32, block_hash: Hash) -> Self {
        Self {
            height,
            block_hash,
            spent: Vec::new(),
            created: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Record a spent output for potential restoration
    pub fn record_spent(&mut self, outpoint: Outpoint, coin: Coin) {
        self.spent.push((outpoint, coin));
    }

    /// Record an output created by this block
    pub fn record_created(&mut self, outpoint: Outpoint) {
        self.created.push(outpoint);
    }

    pub fn record_name(&mut self, name_hash: NameHash, original: Option<NameState>) {
        self.names.push((name_hash, original));
    }
}

/// Undo records for the most recent blocks
#[derive(Debug, Clone)]
pub struct UndoLog {
    records: BTreeMap<u32, BlockUndo>,
    depth: u32,
    /// Records above this height are kept regardless of depth
    pinned: Option<u32>,
}

impl UndoLog {
    pub fn new(depth: u32) -> Self {
        Self {
            records: BTreeMap::new(),
            depth,
            pinned: None,
        }
    }

    /// Keep every record above `height` until [`UndoLog::unpin`]
    pub fn pin(&mut self, height: u32) {
        self.pinned = Some(height);
    }

    pub fn unpin(&mut self) {
        self.pinned = None;
    }

    /// Heights whose records fall out of the window once `tip` is connected
    pub fn prunable(&self, tip: u32) -> Vec<u32> {
        let Some(mut floor) = tip.checked_sub(self.depth) else {
            return Vec::new();
        };
        if let Some(pinned) = self.pinned {
            floor = floor.min(pinned.saturating_add(1));
        }
        self.records.range(..floor).map(|(height, _)| *height).collect()
    }

    /// Store a record and drop those beyond the window
    pub fn insert(&mut self, undo: BlockUndo) -> Vec<u32> {
        let tip = undo.height;
        self.records.insert(undo.height, undo);
        let pruned = self.prunable(tip);
        for height in &pruned {
            self.records.remove(height);
        }
        pruned
    }

    pub fn get(&self, height: u32) -> Option<&BlockUndo> {
        self.records.get(&height)
    }

    pub fn remove(&mut self, height: u32) -> Option<BlockUndo> {
        self.records.remove(&height)
    }

    pub fn contains(&self, height: u32) -> bool {
        self.records.contains_key(&height)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}
