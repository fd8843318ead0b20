//! Transaction handling for the blockchain
//!
//! Implements a UTXO-based transaction model where every output carries a
//! covenant. Features:
//! - Witness-free transaction ids (double SHA-256 of the base encoding)
//! - Sequence numbers for replace-by-fee signaling
//! - Coinbase construction with the block height as locktime
//! - Context-free sanity checks

use crate::config::COIN;
use crate::core::address::Address;
use crate::core::encoding::{write_u32, write_u64, write_var_bytes, write_varint};
use crate::covenant::Covenant;
use crate::crypto::{double_sha256, serde_hex, sha256, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Current transaction version
pub const TX_VERSION: u32 = 0;

/// Sequence number that opts out of replacement
pub const SEQUENCE_FINAL: u32 = 0xFFFFFFFF;

/// Any sequence below this signals replace-by-fee
pub const SEQUENCE_RBF_MAX: u32 = 0xFFFFFFFE;

/// Maximum serialized transaction size in bytes
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Upper bound on any single amount or sum of amounts
pub const MAX_MONEY: u64 = 2_040_000_000 * COIN;

// =============================================================================
// Error Types
// =============================================================================

/// Context-free transaction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Transaction has no outputs")]
    NoOutputs,
    #[error("Transaction too large: {0} bytes")]
    TooLarge(usize),
    #[error("Output value out of range")]
    ValueOutOfRange,
    #[error("Duplicate input {0}")]
    DuplicateInput(Outpoint),
    #[error("Null prevout in a non-coinbase transaction")]
    NullPrevout,
    #[error("Output {0} has an invalid address")]
    InvalidAddress(usize),
}

// =============================================================================
// Outpoint
// =============================================================================

/// Reference to a transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub hash: Hash,
    pub index: u32,
}

impl Outpoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The outpoint spent by coinbase inputs
    pub fn null() -> Self {
        Self::new(Hash::ZERO, u32::MAX)
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == u32::MAX
    }

    /// Fixed 36-byte key form: hash followed by big-endian index
    pub fn to_key(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(self.hash.as_bytes());
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != 36 {
            return None;
        }
        let hash = Hash::from_slice(&key[..32])?;
        let index = u32::from_be_bytes(key[32..].try_into().ok()?);
        Some(Self::new(hash, index))
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Input {
    pub prevout: Outpoint,
    /// Witness stack; for key-hash coins `[signature, public key]`
    #[serde(with = "serde_hex::list", default)]
    pub witness: Vec<Vec<u8>>,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
}

fn default_sequence() -> u32 {
    SEQUENCE_FINAL
}

impl Input {
    pub fn new(prevout: Outpoint) -> Self {
        Self {
            prevout,
            witness: Vec::new(),
            sequence: SEQUENCE_FINAL,
        }
    }

    /// Check if this input signals RBF
    pub fn signals_rbf(&self) -> bool {
        self.sequence < SEQUENCE_RBF_MAX
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Output {
    pub value: u64,
    pub address: Address,
    #[serde(default)]
    pub covenant: Covenant,
}

impl Output {
    pub fn new(value: u64, address: Address) -> Self {
        Self {
            value,
            address,
            covenant: Covenant::none(),
        }
    }

    pub fn with_covenant(value: u64, address: Address, covenant: Covenant) -> Self {
        Self {
            value,
            address,
            covenant,
        }
    }
}

// =============================================================================
// Coin
// =============================================================================

/// An unspent output together with its creation context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coin {
    pub value: u64,
    pub address: Address,
    pub covenant: Covenant,
    /// Height of the block that created the coin
    pub height: u32,
    pub coinbase: bool,
}

impl Coin {
    pub fn from_output(output: &Output, height: u32, coinbase: bool) -> Self {
        Self {
            value: output.value,
            address: output.address.clone(),
            covenant: output.covenant.clone(),
            height,
            coinbase,
        }
    }

    /// Whether a coinbase coin is still immature when spent at `height`
    pub fn is_immature(&self, height: u32, maturity: u32) -> bool {
        self.coinbase && height < self.height.saturating_add(maturity)
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    #[serde(default)]
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub locktime: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            locktime: 0,
        }
    }

    /// Coinbase paying `value` to `address` at `height`
    pub fn coinbase(height: u32, address: Address, value: u64) -> Self {
        let mut input = Input::new(Outpoint::null());
        input.witness.push(height.to_le_bytes().to_vec());
        Self {
            version: TX_VERSION,
            inputs: vec![input],
            outputs: vec![Output::new(value, address)],
            locktime: height,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Transaction id, computed over the encoding without witnesses
    pub fn hash(&self) -> Hash {
        double_sha256(&self.encode_base())
    }

    pub fn outpoint(&self, index: u32) -> Outpoint {
        Outpoint::new(self.hash(), index)
    }

    /// Encoding without witnesses
    pub fn encode_base(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_base(&mut buf);
        buf
    }

    /// Full encoding including witnesses
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_base(&mut buf);
        for input in &self.inputs {
            write_varint(&mut buf, input.witness.len());
            for item in &input.witness {
                write_var_bytes(&mut buf, item);
            }
        }
        buf
    }

    fn write_base(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.version);
        write_varint(buf, self.inputs.len());
        for input in &self.inputs {
            buf.extend_from_slice(input.prevout.hash.as_bytes());
            write_u32(buf, input.prevout.index);
            write_u32(buf, input.sequence);
        }
        write_varint(buf, self.outputs.len());
        for output in &self.outputs {
            write_u64(buf, output.value);
            buf.push(output.address.version);
            write_var_bytes(buf, &output.address.hash);
            output.covenant.encode_into(buf);
        }
        write_u32(buf, self.locktime);
    }

    /// Serialized size in bytes, witnesses included
    pub fn size(&self) -> usize {
        self.encode().len()
    }

    /// Digest signed by input `index` spending `coin`
    pub fn signature_hash(&self, index: usize, coin: &Coin) -> Hash {
        let mut buf = self.encode_base();
        write_u32(&mut buf, index as u32);
        write_u64(&mut buf, coin.value);
        sha256(&buf)
    }

    /// Sum of output values, `None` on overflow
    pub fn output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }

    /// Check if any input signals RBF
    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(|input| input.signals_rbf())
    }

    /// Checks that need no chain context
    pub fn check_sanity(&self) -> Result<(), TransactionError> {
        if self.inputs.is_empty() {
            return Err(TransactionError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(TransactionError::NoOutputs);
        }

        let size = self.size();
        if size > MAX_TX_SIZE {
            return Err(TransactionError::TooLarge(size));
        }

        let mut total: u64 = 0;
        for (index, output) in self.outputs.iter().enumerate() {
            if output.value > MAX_MONEY {
                return Err(TransactionError::ValueOutOfRange);
            }
            total = total
                .checked_add(output.value)
                .filter(|total| *total <= MAX_MONEY)
                .ok_or(TransactionError::ValueOutOfRange)?;
            if !output.address.is_valid() {
                return Err(TransactionError::InvalidAddress(index));
            }
        }

        if self.is_coinbase() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.prevout.is_null() {
                return Err(TransactionError::NullPrevout);
            }
            if !seen.insert(input.prevout) {
                return Err(TransactionError::DuplicateInput(input.prevout));
            }
        }

        Ok(())
    }
}
