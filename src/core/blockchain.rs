//! Blockchain implementation
//!
//! [`Chain`] owns the committed UTXO set, the name state, the tree
//! commitments and the undo log. A block is validated against overlay views
//! of that state; only when every transaction passes and the tree root
//! matches is the result written to storage in one batch and then applied
//! in memory.

use crate::config::{ChainOptions, NameRules, Network};
use crate::core::address::Address;
use crate::core::block::{Block, BlockError};
use crate::core::chain_state::{calculate_work, BlockIndex, BlockUndo, ChainTip, UndoLog};
use crate::core::script::{InputVerifier, KeyVerifier};
use crate::core::transaction::{Coin, Outpoint, Transaction};
use crate::core::validation::{
    add_coinbase, verify_coinbase, verify_transaction, TxContext, TxVerdict, VerifyError,
};
use crate::core::view::{CoinChanges, CoinView};
use crate::covenant::{NameHash, NameHasher, Sha256NameHasher};
use crate::crypto::Hash;
use crate::names::{AuctionPhase, NameChanges, NameState, NameView};
use crate::storage::{ChainBatch, ChainDb, KvStore, MemoryStore, StorageError};
use crate::tree::{compute_root, NameProof, NameTree, TreeCommitment, TreeRootMismatch, TreeScheduler};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Malformed block: {0}")]
    Malformed(#[from] BlockError),
    #[error("Block {hash} does not extend the tip {tip}")]
    PrevMismatch { hash: Hash, tip: Hash },
    #[error("Invalid transaction {tx} in block at height {height}: {source}")]
    InvalidBlock {
        height: u32,
        tx: Hash,
        source: VerifyError,
    },
    #[error(transparent)]
    TreeRootMismatch(#[from] TreeRootMismatch),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Cannot disconnect the genesis block")]
    GenesisDisconnect,
    #[error("Missing undo data for height {0}")]
    MissingUndo(u32),
    #[error("Block not found at height {0}")]
    BlockNotFound(u32),
    #[error("Height {0} is not on the main chain")]
    UnknownForkPoint(u32),
    #[error("Alternate chain does not build on the main-chain block at height {0}")]
    ForkMismatch(u32),
    #[error("Reorganization of depth {depth} exceeds the undo window of {max}")]
    ReorgTooDeep { depth: u32, max: u32 },
    #[error("Alternate chain work {alternate} does not exceed current work {current}")]
    InsufficientWork { alternate: u128, current: u128 },
    #[error("Stored chain is inconsistent: {0}")]
    Corrupt(String),
}

impl BlockchainError {
    /// Whether the error came from the storage layer rather than from the
    /// block itself
    pub fn is_storage(&self) -> bool {
        matches!(self, BlockchainError::Storage(_) | BlockchainError::Corrupt(_))
    }
}

/// Summary of a connected block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub height: u32,
    pub hash: Hash,
    pub fees: u64,
    /// Set when the block sits on a tree interval boundary
    pub commitment: Option<TreeCommitment>,
}

/// Summary of a completed reorganization
#[derive(Debug, Clone)]
pub struct ReorgOutcome {
    pub fork_height: u32,
    /// Former main-chain blocks, in height order
    pub disconnected: Vec<Block>,
    pub connected: Vec<ConnectOutcome>,
}

/// Name state as seen from the next block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameInfo {
    pub state: NameState,
    pub phase: AuctionPhase,
    pub expired: bool,
    pub expires_at: u32,
}

/// Value held by an address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Plain coins and coins from OPEN or REDEEM outputs
    pub spendable: u64,
    /// Bids, reveals and owned names
    pub locked: u64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.spendable + self.locked
    }
}

/// Full committed state, for comparisons and dumps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub tip: ChainTip,
    pub coins: BTreeMap<Outpoint, Coin>,
    pub names: BTreeMap<NameHash, NameState>,
    pub commitments: Vec<TreeCommitment>,
}

struct StagedBlock {
    height: u32,
    hash: Hash,
    fees: u64,
    root: Hash,
    coins: CoinChanges,
    names: NameChanges,
}

/// The main chain and its derived state
pub struct Chain {
    options: ChainOptions,
    db: ChainDb,
    coins: HashMap<Outpoint, Coin>,
    names: BTreeMap<NameHash, NameState>,
    index: BlockIndex,
    tree: TreeScheduler,
    undo: UndoLog,
    verifier: Arc<dyn InputVerifier>,
    hasher: Arc<dyn NameHasher>,
}

impl Chain {
    /// Volatile chain with key-hash verification
    pub fn new(options: ChainOptions) -> Result<Self, BlockchainError> {
        Self::with_verifier(options, Arc::new(KeyVerifier))
    }

    /// Volatile chain with a custom input verifier
    pub fn with_verifier(
        options: ChainOptions,
        verifier: Arc<dyn InputVerifier>,
    ) -> Result<Self, BlockchainError> {
        Self::open(
            options,
            Box::new(MemoryStore::new()),
            verifier,
            Arc::new(Sha256NameHasher),
        )
    }

    /// Open a chain on `store`, connecting genesis if the store is empty
    pub fn open(
        options: ChainOptions,
        store: Box<dyn KvStore>,
        verifier: Arc<dyn InputVerifier>,
        hasher: Arc<dyn NameHasher>,
    ) -> Result<Self, BlockchainError> {
        let mut chain = Self {
            tree: TreeScheduler::new(options.rules.tree_interval),
            undo: UndoLog::new(options.undo_depth),
            options,
            db: ChainDb::new(store),
            coins: HashMap::new(),
            names: BTreeMap::new(),
            index: BlockIndex::new(),
            verifier,
            hasher,
        };

        match chain.db.tip()? {
            Some(tip) => chain.load(tip)?,
            None => {
                let genesis = Block::genesis(chain.options.network);
                chain.connect_block(&genesis)?;
                log::info!(
                    "Initialized {} chain with genesis {}",
                    chain.options.network,
                    genesis.hash().short()
                );
            }
        }

        Ok(chain)
    }

    fn load(&mut self, tip: ChainTip) -> Result<(), BlockchainError> {
        for block in self.db.load_blocks()? {
            self.index.push(&block.header);
        }
        match self.index.tip() {
            Some(entry) if entry.hash == tip.block_hash => {}
            _ => {
                return Err(BlockchainError::Corrupt(format!(
                    "tip {} does not match stored blocks",
                    tip.block_hash
                )))
            }
        }

        self.coins = self.db.load_coins()?;
        self.names = self.db.load_names()?;
        for undo in self.db.load_undo()? {
            self.undo.insert(undo);
        }
        self.tree = TreeScheduler::with_commitments(
            self.options.rules.tree_interval,
            self.db.load_commitments()?,
        );

        log::info!(
            "Loaded chain at height {} ({} coins, {} names)",
            tip.height,
            self.coins.len(),
            self.names.len()
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub fn network(&self) -> Network {
        self.options.network
    }

    pub fn rules(&self) -> &NameRules {
        &self.options.rules
    }

    pub fn height(&self) -> u32 {
        self.index.tip().map(|entry| entry.height).unwrap_or(0)
    }

    pub fn tip(&self) -> ChainTip {
        match self.index.tip() {
            Some(entry) => ChainTip {
                block_hash: entry.hash,
                height: entry.height,
                chain_work: entry.chain_work,
            },
            None => ChainTip {
                block_hash: Hash::ZERO,
                height: 0,
                chain_work: 0,
            },
        }
    }

    pub fn tip_hash(&self) -> Hash {
        self.index.tip().map(|entry| entry.hash).unwrap_or(Hash::ZERO)
    }

    pub fn block_hash_at(&self, height: u32) -> Option<Hash> {
        self.index.get(height).map(|entry| entry.hash)
    }

    /// Height of a main-chain block
    pub fn height_of(&self, hash: &Hash) -> Option<u32> {
        self.index.height_of(hash)
    }

    pub fn get_block(&self, height: u32) -> Result<Option<Block>, BlockchainError> {
        Ok(self.db.get_block(height)?)
    }

    pub fn coin(&self, outpoint: &Outpoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    /// Unspent coins paying `address`
    pub fn coins_for(&self, address: &Address) -> Vec<(Outpoint, Coin)> {
        let mut coins: Vec<(Outpoint, Coin)> = self
            .coins
            .iter()
            .filter(|(_, coin)| coin.address == *address)
            .map(|(outpoint, coin)| (*outpoint, coin.clone()))
            .collect();
        coins.sort_by_key(|(outpoint, _)| *outpoint);
        coins
    }

    /// Unspent value paying `address`, split by whether a name covenant
    /// locks it
    pub fn balance(&self, address: &Address) -> Balance {
        let mut balance = Balance::default();
        for coin in self.coins.values().filter(|coin| coin.address == *address) {
            if coin.covenant.kind.is_unlinked() {
                balance.spendable += coin.value;
            } else {
                balance.locked += coin.value;
            }
        }
        balance
    }

    /// Committed state of a name, expired or not
    pub fn name_state(&self, name_hash: &NameHash) -> Option<&NameState> {
        self.names.get(name_hash)
    }

    /// Name state evaluated at the height of the next block
    pub fn name_info(&self, name_hash: &NameHash) -> Option<NameInfo> {
        let state = self.names.get(name_hash)?;
        let height = self.height() + 1;
        let rules = self.rules();
        Some(NameInfo {
            phase: state.phase(height, rules),
            expired: state.is_expired(height, rules),
            expires_at: state.expiry_height(rules),
            state: state.clone(),
        })
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn hash_name(&self, name: &[u8]) -> NameHash {
        self.hasher.hash_name(name)
    }

    /// Root committed by the most recent boundary block
    pub fn tree_root(&self) -> Hash {
        self.tree.last_root()
    }

    pub fn commitments(&self) -> impl Iterator<Item = &TreeCommitment> {
        self.tree.commitments()
    }

    /// Names changed since the last tree commitment
    pub fn pending_tree_updates(&self) -> usize {
        self.tree.pending_updates()
    }

    /// Proof of a name against the root of the current name state; the
    /// root equals [`Chain::tree_root`] when the tip is a boundary block
    pub fn prove_name(&self, name_hash: &NameHash) -> Option<(NameProof, Hash)> {
        let tree = NameTree::build(&self.names);
        let proof = tree.prove(name_hash)?;
        Some((proof, tree.root()))
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            tip: self.tip(),
            coins: self.coins.iter().map(|(k, v)| (*k, v.clone())).collect(),
            names: self.names.clone(),
            commitments: self.tree.commitments().cloned().collect(),
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn tx_context(&self, height: u32) -> TxContext<'_> {
        TxContext {
            height,
            network: self.options.network,
            rules: &self.options.rules,
            reserved: &self.options.reserved,
            blocks: &self.index,
            verifier: self.verifier.as_ref(),
            hasher: self.hasher.as_ref(),
        }
    }

    fn next_height(&self) -> u32 {
        self.index.len() as u32
    }

    /// Verify a loose transaction as if it were in the next block
    pub fn check_transaction(&self, tx: &Transaction) -> Result<TxVerdict, VerifyError> {
        let ctx = self.tx_context(self.next_height());
        let mut coins = CoinView::new(&self.coins);
        let mut names = NameView::new(&self.names);
        verify_transaction(&ctx, &mut coins, &mut names, tx)
    }

    fn verify_body(
        ctx: &TxContext<'_>,
        coins: &mut CoinView<'_>,
        names: &mut NameView<'_>,
        transactions: &[Transaction],
    ) -> Result<u64, BlockchainError> {
        let mut fees: u64 = 0;
        for tx in transactions {
            let verdict = verify_transaction(ctx, coins, names, tx).map_err(|source| {
                BlockchainError::InvalidBlock {
                    height: ctx.height,
                    tx: tx.hash(),
                    source,
                }
            })?;
            fees = fees.saturating_add(verdict.fee);
        }
        Ok(fees)
    }

    fn stage_block(&self, block: &Block) -> Result<StagedBlock, BlockchainError> {
        block.check_sanity()?;

        let hash = block.hash();
        let tip = self.tip_hash();
        if block.header.prev_hash != tip {
            return Err(BlockchainError::PrevMismatch { hash, tip });
        }

        let height = self.next_height();
        let ctx = self.tx_context(height);
        let mut coins = CoinView::new(&self.coins);
        let mut names = NameView::new(&self.names);

        let fees = Self::verify_body(&ctx, &mut coins, &mut names, &block.transactions[1..])?;

        let coinbase = &block.transactions[0];
        let max_value = self.options.network.block_reward().saturating_add(fees);
        verify_coinbase(coinbase, height, max_value).map_err(|source| {
            BlockchainError::InvalidBlock {
                height,
                tx: coinbase.hash(),
                source,
            }
        })?;
        add_coinbase(&mut coins, coinbase, height);

        let root = self
            .tree
            .expected_root(height, || compute_root(names.entries()));

        Ok(StagedBlock {
            height,
            hash,
            fees,
            root,
            coins: coins.into_changes(),
            names: names.into_changes(),
        })
    }

    // =========================================================================
    // Connect / disconnect
    // =========================================================================

    /// Validate `block` against the tip and make it the new tip
    pub fn connect_block(&mut self, block: &Block) -> Result<ConnectOutcome, BlockchainError> {
        let staged = self.stage_block(block)?;
        self.tree
            .verify(staged.height, staged.root, block.header.tree_root)?;
        self.commit(block, staged)
    }

    fn commit(
        &mut self,
        block: &Block,
        staged: StagedBlock,
    ) -> Result<ConnectOutcome, BlockchainError> {
        let StagedBlock {
            height,
            hash,
            fees,
            root,
            coins,
            names,
        } = staged;

        let mut undo = BlockUndo::new(height, hash);
        let mut batch = ChainBatch::new();

        for (outpoint, coin) in &coins.spent {
            batch.delete_coin(outpoint);
            undo.record_spent(*outpoint, coin.clone());
        }
        for (outpoint, coin) in &coins.created {
            batch.put_coin(outpoint, coin)?;
            undo.record_created(*outpoint);
        }
        for (name_hash, state) in &names.updates {
            match state {
                Some(state) => batch.put_name(name_hash, state)?,
                None => batch.delete_name(name_hash),
            }
        }
        for (name_hash, original) in names.originals {
            undo.record_name(name_hash, original);
        }

        let commitment = self.tree.is_boundary(height).then(|| TreeCommitment {
            height,
            root,
            block_hash: hash,
        });
        if let Some(commitment) = &commitment {
            batch.put_commitment(commitment)?;
        }

        let prior_work = self.index.tip().map(|entry| entry.chain_work).unwrap_or(0);
        batch.put_undo(&undo)?;
        batch.put_block(height, block)?;
        batch.put_tip(&ChainTip {
            block_hash: hash,
            height,
            chain_work: prior_work.saturating_add(calculate_work(block.header.bits)),
        })?;
        for pruned in self.undo.prunable(height) {
            batch.delete_undo(pruned);
        }

        self.db.write(batch)?;

        for (outpoint, _) in &coins.spent {
            self.coins.remove(outpoint);
        }
        for (outpoint, coin) in coins.created {
            self.coins.insert(outpoint, coin);
        }
        for (name_hash, state) in names.updates {
            match state {
                Some(state) => self.names.insert(name_hash, state),
                None => self.names.remove(&name_hash),
            };
        }
        self.index.push(&block.header);
        self.tree
            .on_connect(height, root, hash, undo.names.iter().map(|(name_hash, _)| name_hash));
        self.undo.insert(undo);

        log::info!(
            "Connected block {} at height {} ({} txs, {} fees)",
            hash.short(),
            height,
            block.transactions.len(),
            fees
        );
        if let Some(commitment) = &commitment {
            log::info!(
                "Committed name tree root {} at height {}",
                commitment.root.short(),
                height
            );
        }

        Ok(ConnectOutcome {
            height,
            hash,
            fees,
            commitment,
        })
    }

    /// Undo the tip block and return it
    pub fn disconnect_tip(&mut self) -> Result<Block, BlockchainError> {
        let height = self.height();
        if height == 0 {
            return Err(BlockchainError::GenesisDisconnect);
        }

        let undo = self
            .undo
            .get(height)
            .cloned()
            .ok_or(BlockchainError::MissingUndo(height))?;
        let block = self
            .db
            .get_block(height)?
            .ok_or(BlockchainError::BlockNotFound(height))?;
        let prev = self
            .index
            .get(height - 1)
            .cloned()
            .ok_or_else(|| BlockchainError::Corrupt(format!("no entry at {}", height - 1)))?;

        let mut batch = ChainBatch::new();
        for outpoint in &undo.created {
            batch.delete_coin(outpoint);
        }
        for (outpoint, coin) in &undo.spent {
            batch.put_coin(outpoint, coin)?;
        }
        for (name_hash, original) in &undo.names {
            match original {
                Some(state) => batch.put_name(name_hash, state)?,
                None => batch.delete_name(name_hash),
            }
        }
        if self.tree.commitment(height).is_some() {
            batch.delete_commitment(height);
        }
        batch.delete_undo(height);
        batch.delete_block(height);
        batch.put_tip(&ChainTip {
            block_hash: prev.hash,
            height: prev.height,
            chain_work: prev.chain_work,
        })?;

        self.db.write(batch)?;

        for outpoint in &undo.created {
            self.coins.remove(outpoint);
        }
        for (outpoint, coin) in &undo.spent {
            self.coins.insert(*outpoint, coin.clone());
        }
        for (name_hash, original) in &undo.names {
            match original {
                Some(state) => self.names.insert(*name_hash, state.clone()),
                None => self.names.remove(name_hash),
            };
        }
        self.index.pop();
        self.tree
            .on_disconnect(height, undo.names.iter().map(|(name_hash, _)| name_hash));
        self.undo.remove(height);

        log::info!("Disconnected block {} at height {}", undo.block_hash.short(), height);
        Ok(block)
    }

    /// Replace the blocks above `fork_height` with `blocks` if they carry
    /// more work
    ///
    /// If an alternate block turns out to be invalid the original chain is
    /// restored and the validation error is returned.
    pub fn reorganize(
        &mut self,
        fork_height: u32,
        blocks: &[Block],
    ) -> Result<ReorgOutcome, BlockchainError> {
        let tip_height = self.height();
        let fork = self
            .index
            .get(fork_height)
            .cloned()
            .ok_or(BlockchainError::UnknownForkPoint(fork_height))?;

        let current = self.index.work_above(fork_height);
        let alternate = blocks
            .iter()
            .fold(0u128, |acc, block| acc.saturating_add(calculate_work(block.header.bits)));
        if alternate <= current {
            return Err(BlockchainError::InsufficientWork { alternate, current });
        }

        if blocks[0].header.prev_hash != fork.hash {
            return Err(BlockchainError::ForkMismatch(fork_height));
        }

        let depth = tip_height - fork_height;
        let undo_available = (fork_height + 1..=tip_height).all(|height| self.undo.contains(height));
        if depth > self.undo.depth() || !undo_available {
            return Err(BlockchainError::ReorgTooDeep {
                depth,
                max: self.undo.depth(),
            });
        }

        log::warn!(
            "Reorganizing at height {}: disconnecting {} blocks, connecting {}",
            fork_height,
            depth,
            blocks.len()
        );

        // Undo of blocks above the fork must survive until the reorg settles
        self.undo.pin(fork_height);
        let result = self.replace_branch(fork_height, depth, blocks);
        self.undo.unpin();
        result
    }

    fn replace_branch(
        &mut self,
        fork_height: u32,
        depth: u32,
        blocks: &[Block],
    ) -> Result<ReorgOutcome, BlockchainError> {
        let mut disconnected = Vec::with_capacity(depth as usize);
        while self.height() > fork_height {
            let block = self
                .disconnect_tip()
                .map_err(|err| fatal("disconnecting the current branch", err))?;
            disconnected.push(block);
        }
        disconnected.reverse();

        let mut connected = Vec::with_capacity(blocks.len());
        for block in blocks {
            match self.connect_block(block) {
                Ok(outcome) => connected.push(outcome),
                Err(err) if err.is_storage() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "Alternate block {} rejected: {}; restoring previous chain",
                        block.hash().short(),
                        err
                    );
                    self.restore_branch(connected.len(), &disconnected)
                        .map_err(|err| fatal("restoring the previous branch", err))?;
                    return Err(err);
                }
            }
        }

        Ok(ReorgOutcome {
            fork_height,
            disconnected,
            connected,
        })
    }

    fn restore_branch(
        &mut self,
        connected: usize,
        original: &[Block],
    ) -> Result<(), BlockchainError> {
        for _ in 0..connected {
            self.disconnect_tip()?;
        }
        for block in original {
            self.connect_block(block)?;
        }
        Ok(())
    }

    /// Keep the candidates that verify in order on top of the tip, up to
    /// `limit`; the others are skipped
    pub fn select_transactions<I>(&self, candidates: I, limit: usize) -> Vec<Transaction>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let ctx = self.tx_context(self.next_height());
        let mut coins = CoinView::new(&self.coins);
        let mut names = NameView::new(&self.names);
        let mut selected = Vec::new();

        for tx in candidates {
            if selected.len() >= limit {
                break;
            }
            let mut staged_coins = coins.clone();
            let mut staged_names = names.clone();
            match verify_transaction(&ctx, &mut staged_coins, &mut staged_names, &tx) {
                Ok(_) => {
                    coins = staged_coins;
                    names = staged_names;
                    selected.push(tx);
                }
                Err(err) => log::debug!("Skipping {} for the next block: {}", tx.hash().short(), err),
            }
        }

        selected
    }

    /// Assemble a block on the tip from already-ordered transactions
    ///
    /// The coinbase claims the reward plus all fees; the header carries the
    /// tree root the block must commit to.
    pub fn build_block(
        &self,
        transactions: Vec<Transaction>,
        coinbase_address: Address,
        time: u64,
        bits: u32,
    ) -> Result<Block, BlockchainError> {
        let height = self.next_height();
        let ctx = self.tx_context(height);
        let mut coins = CoinView::new(&self.coins);
        let mut names = NameView::new(&self.names);

        let fees = Self::verify_body(&ctx, &mut coins, &mut names, &transactions)?;
        let root = self
            .tree
            .expected_root(height, || compute_root(names.entries()));

        let reward = self.options.network.block_reward().saturating_add(fees);
        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(Transaction::coinbase(height, coinbase_address, reward));
        all.extend(transactions);

        let mut block = Block::new(self.tip_hash(), all, time, bits);
        block.header.tree_root = root;
        Ok(block)
    }
}

/// A reorg that cannot return to either branch leaves the chain unusable
fn fatal(context: &str, err: BlockchainError) -> BlockchainError {
    if err.is_storage() {
        return err;
    }
    log::error!("Reorg failed while {}: {}", context, err);
    BlockchainError::Corrupt(format!("{}: {}", context, err))
}
