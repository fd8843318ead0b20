//! Output addresses
//!
//! An address is a witness version plus a program hash. Version 0 with a
//! 20-byte hash is pay-to-key-hash, the only form the built-in
//! [`KeyVerifier`](crate::core::script::KeyVerifier) can spend. Text form is
//! Base58Check over `version || hash`.

use crate::crypto::{hash160, serde_hex, sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest witness version an address may carry
pub const MAX_ADDRESS_VERSION: u8 = 31;

/// Minimum and maximum program hash sizes
pub const MIN_ADDRESS_HASH: usize = 2;
pub const MAX_ADDRESS_HASH: usize = 40;

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid base58: {0}")]
    InvalidBase58(#[from] bs58::decode::Error),
    #[error("Invalid checksum")]
    InvalidChecksum,
    #[error("Invalid address version or hash size")]
    InvalidProgram,
}

/// Destination of an output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub version: u8,
    #[serde(with = "serde_hex")]
    pub hash: Vec<u8>,
}

impl Address {
    pub fn new(version: u8, hash: Vec<u8>) -> Self {
        Self { version, hash }
    }

    /// Pay-to-key-hash address
    pub fn from_key_hash(hash: [u8; 20]) -> Self {
        Self::new(0, hash.to_vec())
    }

    /// Pay-to-key-hash address of a serialized public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_key_hash(hash160(public_key))
    }

    /// The all-zero key hash, used by the genesis coinbase
    pub fn null() -> Self {
        Self::new(0, vec![0u8; 20])
    }

    pub fn is_valid(&self) -> bool {
        self.version <= MAX_ADDRESS_VERSION
            && (MIN_ADDRESS_HASH..=MAX_ADDRESS_HASH).contains(&self.hash.len())
    }

    pub fn is_key_hash(&self) -> bool {
        self.version == 0 && self.hash.len() == 20
    }

    fn payload(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.hash.len());
        bytes.push(self.version);
        bytes.extend_from_slice(&self.hash);
        bytes
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.payload();
        let checksum = sha256(sha256(&bytes).as_bytes());
        bytes.extend_from_slice(&checksum.as_bytes()[..4]);
        f.write_str(&bs58::encode(bytes).into_string())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec()?;
        if bytes.len() < 5 {
            return Err(AddressError::InvalidProgram);
        }

        let (payload, checksum) = bytes.split_at(bytes.len() - 4);
        let expected = sha256(sha256(payload).as_bytes());
        if &expected.as_bytes()[..4] != checksum {
            return Err(AddressError::InvalidChecksum);
        }

        let address = Address::new(payload[0], payload[1..].to_vec());
        if !address.is_valid() {
            return Err(AddressError::InvalidProgram);
        }
        Ok(address)
    }
}
