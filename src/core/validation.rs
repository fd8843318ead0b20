//! Contextual transaction verification
//!
//! One code path serves block connection, block assembly and mempool
//! admission: resolve inputs through a [`CoinView`], authorize them, check
//! amounts, run the name machine on a [`NameView`] and stage the new coins.

use crate::config::{NameRules, Network};
use crate::core::script::InputVerifier;
use crate::core::transaction::{Coin, Outpoint, Transaction, TransactionError};
use crate::core::view::CoinView;
use crate::covenant::{CovenantError, CovenantType, NameCovenant, NameHash, NameHasher};
use crate::names::{self, ChainLookup, NameContext, NameView, TransitionError};
use std::collections::HashSet;
use thiserror::Error;

/// Reasons a transaction is invalid in context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Malformed covenant: {0}")]
    MalformedCovenant(#[from] CovenantError),
    #[error("Invalid covenant transition: {0}")]
    InvalidCovenantTransition(#[from] TransitionError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("Missing input {0}")]
    MissingInput(Outpoint),
    #[error("Immature coinbase spend {0}")]
    ImmatureCoinbase(Outpoint),
    #[error("Input {0} failed verification")]
    BadSignature(usize),
    #[error("Inputs ({input}) are below outputs ({output})")]
    InsufficientInputs { input: u64, output: u64 },
    #[error("Coinbase outside the first position")]
    UnexpectedCoinbase,
    #[error("Coinbase locktime {found} does not match height {expected}")]
    BadCoinbaseHeight { expected: u32, found: u32 },
    #[error("Coinbase pays {found}, allowed {max}")]
    CoinbaseValue { found: u64, max: u64 },
    #[error("Coinbase output {0} carries a covenant")]
    CoinbaseCovenant(usize),
}

/// Chain context a transaction is verified against
pub struct TxContext<'a> {
    /// Height of the block the transaction is (or would be) in
    pub height: u32,
    pub network: Network,
    pub rules: &'a NameRules,
    pub reserved: &'a HashSet<NameHash>,
    pub blocks: &'a dyn ChainLookup,
    pub verifier: &'a dyn InputVerifier,
    pub hasher: &'a dyn NameHasher,
}

impl TxContext<'_> {
    fn names(&self) -> NameContext<'_> {
        NameContext {
            height: self.height,
            rules: self.rules,
            reserved: self.reserved,
            blocks: self.blocks,
        }
    }
}

/// Result of a successful verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxVerdict {
    pub fee: u64,
    /// Name covenants carried by the outputs
    pub covenants: Vec<(NameHash, CovenantType)>,
}

impl TxVerdict {
    /// Names this transaction opens or updates outside the auction
    pub fn name_updates(&self) -> impl Iterator<Item = &NameHash> {
        self.covenants
            .iter()
            .filter(|(_, kind)| kind.is_update_class())
            .map(|(name_hash, _)| name_hash)
    }
}

/// Verify a non-coinbase transaction and stage its effects on both views
///
/// On error the views may hold partial changes and must be discarded.
pub fn verify_transaction(
    ctx: &TxContext<'_>,
    coins: &mut CoinView<'_>,
    names: &mut NameView<'_>,
    tx: &Transaction,
) -> Result<TxVerdict, VerifyError> {
    tx.check_sanity()?;
    if tx.is_coinbase() {
        return Err(VerifyError::UnexpectedCoinbase);
    }

    let outputs = tx
        .outputs
        .iter()
        .map(|output| NameCovenant::decode(&output.covenant, ctx.hasher))
        .collect::<Result<Vec<_>, _>>()?;

    let maturity = ctx.network.coinbase_maturity();
    let mut spent: Vec<Coin> = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let coin = coins
            .get(&input.prevout)
            .cloned()
            .ok_or(VerifyError::MissingInput(input.prevout))?;
        if coin.is_immature(ctx.height, maturity) {
            return Err(VerifyError::ImmatureCoinbase(input.prevout));
        }
        spent.push(coin);
    }

    for (index, coin) in spent.iter().enumerate() {
        if !ctx.verifier.verify_input(coin, tx, index) {
            return Err(VerifyError::BadSignature(index));
        }
    }

    let input_value = spent
        .iter()
        .try_fold(0u64, |acc, coin| acc.checked_add(coin.value))
        .ok_or(TransactionError::ValueOutOfRange)?;
    let output_value = tx.output_value().ok_or(TransactionError::ValueOutOfRange)?;
    if input_value < output_value {
        return Err(VerifyError::InsufficientInputs {
            input: input_value,
            output: output_value,
        });
    }

    let spent_covenants = spent
        .iter()
        .map(|coin| NameCovenant::decode(&coin.covenant, ctx.hasher))
        .collect::<Result<Vec<_>, _>>()?;

    let hash = tx.hash();
    names::apply_transaction(
        &ctx.names(),
        names,
        tx,
        &hash,
        &spent,
        &spent_covenants,
        &outputs,
    )?;

    for input in &tx.inputs {
        coins.spend(&input.prevout);
    }
    for (index, output) in tx.outputs.iter().enumerate() {
        coins.add(
            Outpoint::new(hash, index as u32),
            Coin::from_output(output, ctx.height, false),
        );
    }

    Ok(TxVerdict {
        fee: input_value - output_value,
        covenants: outputs
            .iter()
            .flatten()
            .map(|covenant| (*covenant.name_hash(), covenant.kind()))
            .collect(),
    })
}

/// Verify the coinbase of a block at `height` paying at most `max_value`
pub fn verify_coinbase(tx: &Transaction, height: u32, max_value: u64) -> Result<(), VerifyError> {
    tx.check_sanity()?;

    if tx.locktime != height {
        return Err(VerifyError::BadCoinbaseHeight {
            expected: height,
            found: tx.locktime,
        });
    }

    if let Some(index) = tx.outputs.iter().position(|output| !output.covenant.is_none()) {
        return Err(VerifyError::CoinbaseCovenant(index));
    }

    let value = tx.output_value().ok_or(TransactionError::ValueOutOfRange)?;
    if value > max_value {
        return Err(VerifyError::CoinbaseValue {
            found: value,
            max: max_value,
        });
    }

    Ok(())
}

/// Stage the outputs of a verified coinbase
pub fn add_coinbase(coins: &mut CoinView<'_>, tx: &Transaction, height: u32) {
    let hash = tx.hash();
    for (index, output) in tx.outputs.iter().enumerate() {
        coins.add(
            Outpoint::new(hash, index as u32),
            Coin::from_output(output, height, true),
        );
    }
}
