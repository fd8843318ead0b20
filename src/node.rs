//! Node implementation
//!
//! Wraps the chain and the mempool behind tokio locks. The chain has a single
//! writer: connect, disconnect and reorganize take the write lock. Mempool
//! admission holds the chain read lock for the whole verification. Locks are
//! always taken chain first, then mempool.

use crate::config::{ChainOptions, MempoolOptions};
use crate::core::{
    Block, BlockchainError, Chain, ConnectOutcome, KeyVerifier, ReorgOutcome, Transaction,
};
use crate::covenant::Sha256NameHasher;
use crate::crypto::Hash;
use crate::mining::{BlockAssembler, Mempool, MempoolError};
use crate::storage::{FileStore, StorageConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Capacity of the event channel; slow subscribers miss older events
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for chain storage
    pub data_dir: PathBuf,
    pub chain: ChainOptions,
    pub mempool: MempoolOptions,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: StorageConfig::default().data_dir,
            chain: ChainOptions::default(),
            mempool: MempoolOptions::default(),
        }
    }
}

/// Notifications about main-chain changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    BlockConnected { height: u32, hash: Hash },
    BlockDisconnected { height: u32, hash: Hash },
    TreeCommitted { height: u32, root: Hash, block_hash: Hash },
    Reorganized { fork_height: u32, disconnected: usize, connected: usize },
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Node halted after a storage failure")]
    Halted,
    #[error(transparent)]
    Chain(#[from] BlockchainError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

/// Shared handle to a running chain
#[derive(Clone)]
pub struct Node {
    chain: Arc<RwLock<Chain>>,
    mempool: Arc<Mutex<Mempool>>,
    events: broadcast::Sender<ChainEvent>,
    halted: Arc<AtomicBool>,
}

impl Node {
    pub fn new(chain: Chain, mempool: MempoolOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            chain: Arc::new(RwLock::new(chain)),
            mempool: Arc::new(Mutex::new(Mempool::new(mempool))),
            events,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the chain stored under `config.data_dir`
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let store = FileStore::open(StorageConfig::in_dir(&config.data_dir))
            .map_err(BlockchainError::from)?;
        let chain = Chain::open(
            config.chain,
            Box::new(store),
            Arc::new(KeyVerifier),
            Arc::new(Sha256NameHasher),
        )?;
        Ok(Self::new(chain, config.mempool))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn chain(&self) -> Arc<RwLock<Chain>> {
        Arc::clone(&self.chain)
    }

    pub fn mempool(&self) -> Arc<Mutex<Mempool>> {
        Arc::clone(&self.mempool)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        if self.is_halted() {
            Err(NodeError::Halted)
        } else {
            Ok(())
        }
    }

    fn check_fatal(&self, err: BlockchainError) -> NodeError {
        if err.is_storage() {
            log::error!("Storage failure, halting node: {}", err);
            self.halted.store(true, Ordering::SeqCst);
        }
        NodeError::Chain(err)
    }

    fn emit(&self, event: ChainEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_connected(&self, outcome: &ConnectOutcome) {
        self.emit(ChainEvent::BlockConnected {
            height: outcome.height,
            hash: outcome.hash,
        });
        if let Some(commitment) = &outcome.commitment {
            self.emit(ChainEvent::TreeCommitted {
                height: commitment.height,
                root: commitment.root,
                block_hash: commitment.block_hash,
            });
        }
    }

    /// Admit a transaction to the mempool
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<Vec<Transaction>, NodeError> {
        self.ensure_running()?;
        let chain = self.chain.read().await;
        let mut mempool = self.mempool.lock().await;
        Ok(mempool.add_transaction(tx, &chain)?)
    }

    /// Connect a block on the tip
    pub async fn connect_block(&self, block: Block) -> Result<ConnectOutcome, NodeError> {
        self.ensure_running()?;
        let mut chain = self.chain.write().await;
        let outcome = match chain.connect_block(&block) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("Rejected block {}: {}", block.hash().short(), err);
                return Err(self.check_fatal(err));
            }
        };

        self.mempool.lock().await.add_block(&block, &chain);
        self.emit_connected(&outcome);
        Ok(outcome)
    }

    /// Assemble a block from the mempool and connect it
    pub async fn mine_block(
        &self,
        assembler: &BlockAssembler,
        time: u64,
    ) -> Result<ConnectOutcome, NodeError> {
        self.ensure_running()?;
        let mut chain = self.chain.write().await;
        let mut mempool = self.mempool.lock().await;

        let (block, _) = assembler.assemble(&chain, &mempool, time)?;
        let outcome = chain
            .connect_block(&block)
            .map_err(|err| self.check_fatal(err))?;
        mempool.add_block(&block, &chain);
        self.emit_connected(&outcome);
        Ok(outcome)
    }

    /// Disconnect the tip block, returning its transactions to the mempool
    pub async fn disconnect_tip(&self) -> Result<Block, NodeError> {
        self.ensure_running()?;
        let mut chain = self.chain.write().await;
        let height = chain.height();
        let block = chain.disconnect_tip().map_err(|err| self.check_fatal(err))?;

        self.mempool.lock().await.remove_block(&block, &chain);
        self.emit(ChainEvent::BlockDisconnected {
            height,
            hash: block.hash(),
        });
        Ok(block)
    }

    /// Switch to a heavier branch forking at `fork_height`
    pub async fn reorganize(
        &self,
        fork_height: u32,
        blocks: Vec<Block>,
    ) -> Result<ReorgOutcome, NodeError> {
        self.ensure_running()?;
        let mut chain = self.chain.write().await;
        let outcome = chain
            .reorganize(fork_height, &blocks)
            .map_err(|err| self.check_fatal(err))?;

        let mut mempool = self.mempool.lock().await;
        for block in &blocks {
            mempool.add_block(block, &chain);
        }
        for block in outcome.disconnected.iter().rev() {
            mempool.remove_block(block, &chain);
        }
        drop(mempool);

        for (offset, block) in outcome.disconnected.iter().enumerate().rev() {
            self.emit(ChainEvent::BlockDisconnected {
                height: fork_height + 1 + offset as u32,
                hash: block.hash(),
            });
        }
        for connected in &outcome.connected {
            self.emit_connected(connected);
        }
        self.emit(ChainEvent::Reorganized {
            fork_height,
            disconnected: outcome.disconnected.len(),
            connected: outcome.connected.len(),
        });

        Ok(outcome)
    }

    /// Get node status
    pub async fn status(&self) -> NodeStatus {
        let chain = self.chain.read().await;
        let mempool = self.mempool.lock().await;

        NodeStatus {
            height: chain.height(),
            tip: chain.tip_hash(),
            tree_root: chain.tree_root(),
            names: chain.name_count(),
            pending_tx: mempool.len(),
            halted: self.is_halted(),
        }
    }
}

/// Node status information
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub height: u32,
    pub tip: Hash,
    pub tree_root: Hash,
    pub names: usize,
    pub pending_tx: usize,
    pub halted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::core::{Address, TrustedVerifier};
    use crate::storage::{Batch, KvStore, MemoryStore, StorageError};

    fn regtest_node() -> Node {
        let options = ChainOptions::new(Network::Regtest);
        let chain = Chain::with_verifier(options, Arc::new(TrustedVerifier)).unwrap();
        Node::new(chain, MempoolOptions::default())
    }

    fn assembler() -> BlockAssembler {
        BlockAssembler::new(Address::new(0, vec![7; 20]), 1)
    }

    /// Store that starts failing writes once the switch is flipped
    struct FlakyStore {
        inner: MemoryStore,
        broken: Arc<AtomicBool>,
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key)
        }

        fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
            self.inner.iter_prefix(prefix)
        }

        fn write_batch(&mut self, batch: Batch) -> Result<(), StorageError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk gone",
                )));
            }
            self.inner.write_batch(batch)
        }
    }

    #[tokio::test]
    async fn test_events_on_connect_and_commit() {
        let node = regtest_node();
        let mut events = node.subscribe();

        // Regtest commits every 5 blocks
        for time in 1..=5 {
            node.mine_block(&assembler(), time).await.unwrap();
        }

        let mut connected = 0;
        let mut committed = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                ChainEvent::BlockConnected { .. } => connected += 1,
                ChainEvent::TreeCommitted { height, .. } => committed.push(height),
                _ => {}
            }
        }
        assert_eq!(connected, 5);
        assert_eq!(committed, vec![5]);

        let status = node.status().await;
        assert_eq!(status.height, 5);
        assert!(!status.halted);
    }

    #[tokio::test]
    async fn test_disconnect_event() {
        let node = regtest_node();
        let outcome = node.mine_block(&assembler(), 1).await.unwrap();
        let mut events = node.subscribe();

        let block = node.disconnect_tip().await.unwrap();
        assert_eq!(block.hash(), outcome.hash);
        assert_eq!(
            events.try_recv().unwrap(),
            ChainEvent::BlockDisconnected {
                height: 1,
                hash: outcome.hash
            }
        );
    }

    #[tokio::test]
    async fn test_storage_failure_halts() {
        let broken = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            broken: Arc::clone(&broken),
        };
        let chain = Chain::open(
            ChainOptions::new(Network::Regtest),
            Box::new(store),
            Arc::new(TrustedVerifier),
            Arc::new(Sha256NameHasher),
        )
        .unwrap();
        let node = Node::new(chain, MempoolOptions::default());
        node.mine_block(&assembler(), 1).await.unwrap();

        broken.store(true, Ordering::SeqCst);
        let err = node.mine_block(&assembler(), 2).await.unwrap_err();
        assert!(matches!(err, NodeError::Chain(BlockchainError::Storage(_))));
        assert!(node.is_halted());

        // In-memory state was left at the last committed block
        assert_eq!(node.status().await.height, 1);

        broken.store(false, Ordering::SeqCst);
        assert!(matches!(
            node.mine_block(&assembler(), 2).await,
            Err(NodeError::Halted)
        ));
    }

    #[tokio::test]
    async fn test_invalid_block_does_not_halt() {
        let node = regtest_node();
        let mut block = {
            let chain = node.chain();
            let chain = chain.read().await;
            chain
                .build_block(vec![], Address::new(0, vec![1; 20]), 1, 1)
                .unwrap()
        };
        block.header.prev_hash = Hash::ZERO;

        assert!(node.connect_block(block).await.is_err());
        assert!(!node.is_halted());
    }

    #[test]
    fn test_open_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            chain: ChainOptions::new(Network::Regtest),
            mempool: MempoolOptions::default(),
        };

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let tip = runtime.block_on(async {
            let node = Node::open(config.clone()).unwrap();
            node.mine_block(&assembler(), 1).await.unwrap().hash
        });

        let reopened = Node::open(config).unwrap();
        let status = runtime.block_on(reopened.status());
        assert_eq!(status.height, 1);
        assert_eq!(status.tip, tip);
    }
}
