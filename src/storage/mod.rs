//! Storage module for chain persistence
//!
//! This module provides:
//! - The key-value store abstraction with atomic batches
//! - An in-memory store and a file-backed snapshot store
//! - The typed chain database layout

pub mod chaindb;
pub mod kv;
pub mod persistence;

pub use chaindb::{ChainBatch, ChainDb};
pub use kv::{Batch, BatchOp, KvStore, MemoryStore, StorageError};
pub use persistence::{FileStore, StorageConfig};
