//! Core chain components
//!
//! This module contains the fundamental building blocks:
//! - Transactions, coins and outpoints
//! - Blocks with the tree-root header field
//! - Addresses and input authorization
//! - Staging views and contextual verification
//! - The chain itself: connect, disconnect, reorganize
//! - Fee policy

pub mod address;
pub mod block;
pub mod blockchain;
pub mod chain_state;
pub mod encoding;
pub mod fee;
pub mod script;
pub mod transaction;
pub mod validation;
pub mod view;

pub use address::{Address, AddressError};
pub use block::{Block, BlockError, BlockHeader, MAX_BLOCK_SIZE, MAX_BLOCK_TXS};
pub use blockchain::{
    Balance, BlockchainError, Chain, ChainSnapshot, ConnectOutcome, NameInfo, ReorgOutcome,
};
pub use chain_state::{calculate_work, BlockIndex, BlockUndo, ChainEntry, ChainTip, UndoLog};
pub use fee::{FeeRate, ABSURD_FEE_FACTOR};
pub use script::{sign_input, InputVerifier, KeyVerifier, TrustedVerifier};
pub use transaction::{
    Coin, Input, Outpoint, Output, Transaction, TransactionError, MAX_MONEY, MAX_TX_SIZE,
    SEQUENCE_FINAL, SEQUENCE_RBF_MAX, TX_VERSION,
};
pub use validation::{verify_transaction, TxContext, TxVerdict, VerifyError};
pub use view::{CoinChanges, CoinView};
