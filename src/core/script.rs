//! Input authorization
//!
//! Spending conditions are pluggable through [`InputVerifier`]. The chain
//! ships a pay-to-key-hash verifier using secp256k1 and a trusting verifier
//! for tests and regtest tooling.

use crate::core::transaction::{Coin, Transaction};
use crate::crypto::{hash160, public_key_from_slice, verify_signature, KeyError, KeyPair};

/// Compact ECDSA signature size
pub const SIGNATURE_SIZE: usize = 64;

/// Compressed public key size
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Decides whether input `index` of `tx` may spend `coin`
pub trait InputVerifier: Send + Sync {
    fn verify_input(&self, coin: &Coin, tx: &Transaction, index: usize) -> bool;
}

/// Pay-to-key-hash: witness is `[signature, compressed public key]`, the
/// public key must hash to the coin's address and the signature must cover
/// [`Transaction::signature_hash`]
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyVerifier;

impl InputVerifier for KeyVerifier {
    fn verify_input(&self, coin: &Coin, tx: &Transaction, index: usize) -> bool {
        if !coin.address.is_key_hash() {
            return false;
        }

        let Some(input) = tx.inputs.get(index) else {
            return false;
        };
        let [signature, public_key] = input.witness.as_slice() else {
            return false;
        };
        if signature.len() != SIGNATURE_SIZE || public_key.len() != PUBLIC_KEY_SIZE {
            return false;
        }

        if hash160(public_key).as_slice() != coin.address.hash.as_slice() {
            return false;
        }

        let Ok(key) = public_key_from_slice(public_key) else {
            return false;
        };
        let digest = tx.signature_hash(index, coin);
        verify_signature(&key, &digest, signature).unwrap_or(false)
    }
}

/// Accepts every input
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedVerifier;

impl InputVerifier for TrustedVerifier {
    fn verify_input(&self, _coin: &Coin, _tx: &Transaction, _index: usize) -> bool {
        true
    }
}

/// Fill the witness of input `index` with a key-hash signature
pub fn sign_input(
    tx: &mut Transaction,
    index: usize,
    coin: &Coin,
    key: &KeyPair,
) -> Result<(), KeyError> {
    let digest = tx.signature_hash(index, coin);
    let signature = key.sign(&digest)?;
    let input = tx.inputs.get_mut(index).ok_or(KeyError::InvalidSignature)?;
    input.witness = vec![signature, key.public_key_bytes().to_vec()];
    Ok(())
}
