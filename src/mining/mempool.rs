//! Transaction pool (mempool) for pending transactions
//!
//! Admission runs the same verification a block at the next height would,
//! against the committed tip. On top of that the pool enforces policy:
//! - Minimum relay fee and an absurd-fee ceiling
//! - Replace-By-Fee (RBF) for double-spends of pooled inputs
//! - At most one pending OPEN or owner update per name
//! - Fee-rate eviction at capacity

use crate::config::MempoolOptions;
use crate::core::{Block, Chain, FeeRate, Outpoint, Transaction, VerifyError};
use crate::covenant::NameHash;
use crate::crypto::Hash;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Minimum fee bump for RBF (in percentage, e.g., 10 = 10% higher)
pub const MIN_RBF_FEE_BUMP_PERCENT: u64 = 10;

// =============================================================================
// Error Types
// =============================================================================

/// Mempool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("Transaction already exists")]
    DuplicateTransaction,
    #[error("Coinbase transactions are only valid in blocks")]
    Coinbase,
    #[error("Transaction verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("Name {0} already has a pending update")]
    ConflictingNameUpdate(NameHash),
    #[error("RBF not allowed: the transaction spending {0} doesn't signal RBF")]
    RbfNotSignaled(Outpoint),
    #[error("Insufficient fee for RBF: need {0}, got {1}")]
    InsufficientRbfFee(u64, u64),
    #[error("Fee {fee} is below the relay minimum {min}")]
    InsufficientFee { fee: u64, min: u64 },
    #[error("Absurd fee {fee} (max {max})")]
    AbsurdFee { fee: u64, max: u64 },
    #[error("Mempool full")]
    MempoolFull,
}

// =============================================================================
// Mempool Entry
// =============================================================================

/// Entry in the mempool with metadata
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub hash: Hash,
    pub fee: u64,
    pub size: usize,
    pub fee_rate: FeeRate,
    /// When the transaction was added (Unix timestamp)
    pub added_time: u64,
    /// Names this transaction holds a reservation on
    pub reservations: Vec<NameHash>,
}

// =============================================================================
// Mempool
// =============================================================================

/// Memory pool for pending transactions
#[derive(Debug, Default)]
pub struct Mempool {
    options: MempoolOptions,
    entries: HashMap<Hash, MempoolEntry>,
    /// Transaction hashes ordered by fee rate (highest first for mining)
    by_fee: Vec<Hash>,
    /// Pooled spender of each outpoint
    spends: HashMap<Outpoint, Hash>,
    /// Pooled holder of each name reservation
    reservations: HashMap<NameHash, Hash>,
}

impl Mempool {
    pub fn new(options: MempoolOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &MempoolOptions {
        &self.options
    }

    /// Admit a transaction; returns the transactions it replaced
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        chain: &Chain,
    ) -> Result<Vec<Transaction>, MempoolError> {
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        let hash = tx.hash();
        if self.entries.contains_key(&hash) {
            return Err(MempoolError::DuplicateTransaction);
        }

        let verdict = chain.check_transaction(&tx)?;

        // Fee policy
        let size = tx.size();
        let fee = verdict.fee;
        let relay = FeeRate::per_kb(self.options.min_relay_fee);
        let min = relay.fee_for_size(size);
        if fee < min {
            return Err(MempoolError::InsufficientFee { fee, min });
        }
        let max = relay.absurd_threshold(size);
        if self.options.reject_absurd_fees && fee > max {
            return Err(MempoolError::AbsurdFee { fee, max });
        }

        // Double-spends of pooled inputs
        let mut conflicts: HashSet<Hash> = HashSet::new();
        for input in &tx.inputs {
            if let Some(spender) = self.spends.get(&input.prevout) {
                let signals = self
                    .entries
                    .get(spender)
                    .map(|entry| entry.tx.signals_rbf())
                    .unwrap_or(false);
                if !signals {
                    return Err(MempoolError::RbfNotSignaled(input.prevout));
                }
                conflicts.insert(*spender);
            }
        }
        if !conflicts.is_empty() {
            let replaced_fees: u64 = conflicts
                .iter()
                .filter_map(|h| self.entries.get(h))
                .map(|entry| entry.fee)
                .sum();
            let min_fee = replaced_fees + replaced_fees * MIN_RBF_FEE_BUMP_PERCENT / 100;
            if fee < min_fee {
                return Err(MempoolError::InsufficientRbfFee(min_fee, fee));
            }
        }

        // One pending update per name; a replacement takes over the
        // reservations of what it replaces
        let mut reservations: Vec<NameHash> = Vec::new();
        for name_hash in verdict.name_updates() {
            if reservations.contains(name_hash) {
                continue;
            }
            if let Some(holder) = self.reservations.get(name_hash) {
                if !conflicts.contains(holder) {
                    return Err(MempoolError::ConflictingNameUpdate(*name_hash));
                }
            }
            reservations.push(*name_hash);
        }

        // Capacity
        let fee_rate = FeeRate::from_fee_and_size(fee, size);
        let excess = (self.entries.len() - conflicts.len() + 1).saturating_sub(self.options.max_size);
        let victims: Vec<Hash> = self
            .by_fee
            .iter()
            .rev()
            .filter(|h| !conflicts.contains(*h))
            .take(excess)
            .copied()
            .collect();
        let outbid = victims.iter().all(|h| {
            self.entries
                .get(h)
                .map(|entry| entry.fee_rate < fee_rate)
                .unwrap_or(true)
        });
        if victims.len() < excess || !outbid {
            return Err(MempoolError::MempoolFull);
        }

        let replaced: Vec<Transaction> = conflicts
            .iter()
            .filter_map(|h| self.remove_transaction(h))
            .collect();
        for victim in victims {
            if self.remove_transaction(&victim).is_some() {
                log::warn!("Evicted {} to make room for {}", victim.short(), hash.short());
            }
        }

        for input in &tx.inputs {
            self.spends.insert(input.prevout, hash);
        }
        for name_hash in &reservations {
            self.reservations.insert(*name_hash, hash);
        }
        let pos = self
            .by_fee
            .iter()
            .position(|h| {
                self.entries
                    .get(h)
                    .map(|entry| entry.fee_rate < fee_rate)
                    .unwrap_or(true)
            })
            .unwrap_or(self.by_fee.len());
        self.by_fee.insert(pos, hash);
        self.entries.insert(
            hash,
            MempoolEntry {
                tx,
                hash,
                fee,
                size,
                fee_rate,
                added_time: chrono::Utc::now().timestamp() as u64,
                reservations,
            },
        );

        log::debug!(
            "Accepted {} into mempool (fee {}, {} replaced)",
            hash.short(),
            fee,
            replaced.len()
        );
        Ok(replaced)
    }

    /// Remove a transaction and release what it held
    pub fn remove_transaction(&mut self, hash: &Hash) -> Option<Transaction> {
        let entry = self.entries.remove(hash)?;
        self.by_fee.retain(|h| h != hash);
        for input in &entry.tx.inputs {
            if self.spends.get(&input.prevout) == Some(hash) {
                self.spends.remove(&input.prevout);
            }
        }
        for name_hash in &entry.reservations {
            if self.reservations.get(name_hash) == Some(hash) {
                self.reservations.remove(name_hash);
            }
        }
        Some(entry.tx)
    }

    /// Drop entries that no longer verify against the tip
    pub fn revalidate(&mut self, chain: &Chain) -> Vec<Hash> {
        let stale: Vec<Hash> = self
            .by_fee
            .iter()
            .filter(|h| {
                self.entries
                    .get(h)
                    .map(|entry| chain.check_transaction(&entry.tx).is_err())
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        for hash in &stale {
            self.remove_transaction(hash);
        }
        stale
    }

    /// Account for a newly connected block: mined transactions leave the
    /// pool and so does anything the block invalidated
    pub fn add_block(&mut self, block: &Block, chain: &Chain) {
        let mut mined = 0;
        for tx in &block.transactions {
            if self.remove_transaction(&tx.hash()).is_some() {
                mined += 1;
            }
        }
        let stale = self.revalidate(chain);
        if !stale.is_empty() {
            log::warn!(
                "Removed {} mempool transactions invalidated by block at height {}",
                stale.len(),
                chain.height()
            );
        }
        log::debug!("Block removed {} mined transactions from mempool", mined);
    }

    /// Account for a disconnected block: its transactions return to the
    /// pool where they still verify
    pub fn remove_block(&mut self, block: &Block, chain: &Chain) {
        self.revalidate(chain);
        for tx in block.transactions.iter().skip(1) {
            let hash = tx.hash();
            if let Err(err) = self.add_transaction(tx.clone(), chain) {
                log::warn!("Could not return {} to mempool: {}", hash.short(), err);
            }
        }
    }

    /// Get transactions for mining (highest fee rate first, up to limit)
    pub fn get_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.by_fee
            .iter()
            .take(limit)
            .filter_map(|h| self.entries.get(h).map(|entry| entry.tx.clone()))
            .collect()
    }

    pub fn get_transaction(&self, hash: &Hash) -> Option<&Transaction> {
        self.entries.get(hash).map(|entry| &entry.tx)
    }

    pub fn get_entry(&self, hash: &Hash) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Pooled transaction holding the reservation on a name
    pub fn reservation(&self, name_hash: &NameHash) -> Option<Hash> {
        self.reservations.get(name_hash).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_fee.clear();
        self.spends.clear();
        self.reservations.clear();
    }

    /// Get all transaction hashes (by fee order)
    pub fn transaction_ids(&self) -> Vec<Hash> {
        self.by_fee.clone()
    }

    /// Get mempool statistics
    pub fn stats(&self) -> MempoolStats {
        let rate_at = |h: Option<&Hash>| {
            h.and_then(|h| self.entries.get(h))
                .map(|entry| entry.fee_rate.as_per_kb())
                .unwrap_or(0)
        };
        MempoolStats {
            tx_count: self.entries.len(),
            total_fees: self.entries.values().map(|entry| entry.fee).sum(),
            total_size: self.entries.values().map(|entry| entry.size).sum(),
            max_fee_rate: rate_at(self.by_fee.first()),
            min_fee_rate: rate_at(self.by_fee.last()),
            reserved_names: self.reservations.len(),
        }
    }
}

/// Mempool statistics
#[derive(Debug, Clone)]
pub struct MempoolStats {
    pub tx_count: usize,
    pub total_fees: u64,
    pub total_size: usize,
    pub max_fee_rate: u64,
    pub min_fee_rate: u64,
    pub reserved_names: usize,
}

// =============================================================================
// Tests
// =============================================================================
