//! Chain database layout
//!
//! Typed access to chain state over a [`KvStore`]. Keys are a one-byte
//! prefix followed by a fixed-width suffix; heights are big-endian so
//! prefix scans return them in order. Values are JSON.
//!
//! | prefix | key suffix  | value            |
//! |--------|-------------|------------------|
//! | `c`    | outpoint    | coin             |
//! | `n`    | name hash   | name state       |
//! | `u`    | height      | block undo       |
//! | `b`    | height      | block            |
//! | `r`    | height      | tree commitment  |
//! | `R`    |             | chain tip        |

use crate::core::block::Block;
use crate::core::chain_state::{BlockUndo, ChainTip};
use crate::core::transaction::{Coin, Outpoint};
use crate::covenant::NameHash;
use crate::crypto::Hash;
use crate::names::NameState;
use crate::tree::TreeCommitment;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::kv::{Batch, KvStore, StorageError};

const COIN_PREFIX: u8 = b'c';
const NAME_PREFIX: u8 = b'n';
const UNDO_PREFIX: u8 = b'u';
const BLOCK_PREFIX: u8 = b'b';
const TREE_PREFIX: u8 = b'r';
const TIP_KEY: &[u8] = b"R";

fn key(prefix: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + suffix.len());
    key.push(prefix);
    key.extend_from_slice(suffix);
    key
}

fn height_key(prefix: u8, height: u32) -> Vec<u8> {
    key(prefix, &height.to_be_bytes())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Batch of typed chain writes
#[derive(Debug, Default)]
pub struct ChainBatch {
    batch: Batch,
}

impl ChainBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_coin(&mut self, outpoint: &Outpoint, coin: &Coin) -> Result<(), StorageError> {
        self.batch.put(key(COIN_PREFIX, &outpoint.to_key()), encode(coin)?);
        Ok(())
    }

    pub fn delete_coin(&mut self, outpoint: &Outpoint) {
        self.batch.delete(key(COIN_PREFIX, &outpoint.to_key()));
    }

    pub fn put_name(&mut self, name_hash: &NameHash, state: &NameState) -> Result<(), StorageError> {
        self.batch.put(key(NAME_PREFIX, name_hash.as_bytes()), encode(state)?);
        Ok(())
    }

    pub fn delete_name(&mut self, name_hash: &NameHash) {
        self.batch.delete(key(NAME_PREFIX, name_hash.as_bytes()));
    }

    pub fn put_undo(&mut self, undo: &BlockUndo) -> Result<(), StorageError> {
        self.batch.put(height_key(UNDO_PREFIX, undo.height), encode(undo)?);
        Ok(())
    }

    pub fn delete_undo(&mut self, height: u32) {
        self.batch.delete(height_key(UNDO_PREFIX, height));
    }

    pub fn put_block(&mut self, height: u32, block: &Block) -> Result<(), StorageError> {
        self.batch.put(height_key(BLOCK_PREFIX, height), encode(block)?);
        Ok(())
    }

    pub fn delete_block(&mut self, height: u32) {
        self.batch.delete(height_key(BLOCK_PREFIX, height));
    }

    pub fn put_commitment(&mut self, commitment: &TreeCommitment) -> Result<(), StorageError> {
        self.batch
            .put(height_key(TREE_PREFIX, commitment.height), encode(commitment)?);
        Ok(())
    }

    pub fn delete_commitment(&mut self, height: u32) {
        self.batch.delete(height_key(TREE_PREFIX, height));
    }

    pub fn put_tip(&mut self, tip: &ChainTip) -> Result<(), StorageError> {
        self.batch.put(TIP_KEY, encode(tip)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Chain state persisted in a key-value store
pub struct ChainDb {
    store: Box<dyn KvStore>,
}

impl ChainDb {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn write(&mut self, batch: ChainBatch) -> Result<(), StorageError> {
        self.store.write_batch(batch.batch)
    }

    pub fn tip(&self) -> Result<Option<ChainTip>, StorageError> {
        self.store
            .get(TIP_KEY)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn get_block(&self, height: u32) -> Result<Option<Block>, StorageError> {
        self.store
            .get(&height_key(BLOCK_PREFIX, height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Main-chain blocks in height order
    pub fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        self.store
            .iter_prefix(&[BLOCK_PREFIX])?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    pub fn load_coins(&self) -> Result<HashMap<Outpoint, Coin>, StorageError> {
        let mut coins = HashMap::new();
        for (key, value) in self.store.iter_prefix(&[COIN_PREFIX])? {
            let outpoint = Outpoint::from_key(&key[1..])
                .ok_or_else(|| StorageError::InvalidData("bad coin key".to_string()))?;
            coins.insert(outpoint, decode(&value)?);
        }
        Ok(coins)
    }

    pub fn load_names(&self) -> Result<BTreeMap<NameHash, NameState>, StorageError> {
        let mut names = BTreeMap::new();
        for (key, value) in self.store.iter_prefix(&[NAME_PREFIX])? {
            let name_hash = Hash::from_slice(&key[1..])
                .ok_or_else(|| StorageError::InvalidData("bad name key".to_string()))?;
            names.insert(name_hash, decode(&value)?);
        }
        Ok(names)
    }

    pub fn load_undo(&self) -> Result<Vec<BlockUndo>, StorageError> {
        self.store
            .iter_prefix(&[UNDO_PREFIX])?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    pub fn load_commitments(&self) -> Result<Vec<TreeCommitment>, StorageError> {
        self.store
            .iter_prefix(&[TREE_PREFIX])?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }
}
