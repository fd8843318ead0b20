//! Covenant consensus helpers
//!
//! Blind commitments, the rollout schedule, reserved-name gating and the
//! input-to-output linkage rules. Input `i` of a transaction links to
//! output `i`; what a spent coin may become depends on its covenant.

use crate::config::NameRules;
use crate::core::transaction::{Coin, Output, Transaction};
use crate::crypto::{sha256_concat, Hash};
use std::collections::HashSet;
use thiserror::Error;

use super::codec::{NameCovenant, NameHash};
use super::types::CovenantType;

/// Number of weekly rollout buckets
pub const ROLLOUT_WEEKS: u32 = 52;

/// Linkage violations between a spent coin and its paired output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Input {index}: {input} coin cannot be spent into {output}")]
    Forbidden {
        index: usize,
        input: CovenantType,
        output: CovenantType,
    },
    #[error("Input {index}: {input} coin requires a linked output")]
    MissingOutput { index: usize, input: CovenantType },
    #[error("Output {index}: {output} has no linked input")]
    UnlinkedOutput { index: usize, output: CovenantType },
    #[error("Input {index}: linked output refers to a different name or auction")]
    NameMismatch { index: usize },
    #[error("Input {index}: reveal does not match the bid commitment")]
    BlindMismatch { index: usize },
    #[error("Input {index}: reveal value {value} exceeds bid lockup {lockup}")]
    RevealExceedsLockup {
        index: usize,
        value: u64,
        lockup: u64,
    },
    #[error("Input {index}: linked output changes the address")]
    AddressMismatch { index: usize },
    #[error("Input {index}: linked output changes the value")]
    ValueMismatch { index: usize },
    #[error("Input {index}: finalize does not pay the transfer address")]
    TransferAddressMismatch { index: usize },
}

/// Bid commitment: SHA-256(name_hash || value as u64 LE || nonce)
pub fn blind(name_hash: &NameHash, value: u64, nonce: &Hash) -> Hash {
    sha256_concat(&[
        name_hash.as_bytes(),
        &value.to_le_bytes(),
        nonce.as_bytes(),
    ])
}

/// First height at which a name may be opened under the weekly rollout
pub fn rollout_height(name_hash: &NameHash, rules: &NameRules) -> u32 {
    let bytes = name_hash.as_bytes();
    let week = u16::from_le_bytes([bytes[0], bytes[1]]) as u32 % ROLLOUT_WEEKS;
    rules.auction_start + week * rules.rollout_interval
}

pub fn has_rollout(name_hash: &NameHash, height: u32, rules: &NameRules) -> bool {
    rules.no_rollout || height >= rollout_height(name_hash, rules)
}

/// Whether opening the name is blocked by the reserved list at `height`
pub fn is_reserved(
    name_hash: &NameHash,
    height: u32,
    rules: &NameRules,
    reserved: &HashSet<NameHash>,
) -> bool {
    !rules.no_reserved && height < rules.claim_period && reserved.contains(name_hash)
}

/// Check every input-to-output link of a transaction
///
/// `spent` and `spent_covenants` are indexed by input, `outputs` by output.
/// Name-state checks happen afterwards, in the name machine.
pub fn verify_links(
    tx: &Transaction,
    spent: &[Coin],
    spent_covenants: &[Option<NameCovenant>],
    outputs: &[Option<NameCovenant>],
) -> Result<(), LinkError> {
    for (index, coin) in spent.iter().enumerate() {
        let input = coin.covenant.kind;
        let output = tx.outputs.get(index);

        if input.is_unlinked() {
            if let Some(output) = output {
                check_unlinked_output(index, output)?;
            }
            continue;
        }

        let output = output.ok_or(LinkError::MissingOutput { index, input })?;
        let (Some(prev), Some(next)) = (&spent_covenants[index], &outputs[index]) else {
            return Err(LinkError::Forbidden {
                index,
                input,
                output: output.covenant.kind,
            });
        };

        if prev.name_hash() != next.name_hash() || prev.height() != next.height() {
            return Err(LinkError::NameMismatch { index });
        }

        match (prev, next) {
            (
                NameCovenant::Bid {
                    name_hash,
                    blind: commitment,
                    ..
                },
                NameCovenant::Reveal { nonce, .. },
            ) => {
                if blind(name_hash, output.value, nonce) != *commitment {
                    return Err(LinkError::BlindMismatch { index });
                }
                if output.value > coin.value {
                    return Err(LinkError::RevealExceedsLockup {
                        index,
                        value: output.value,
                        lockup: coin.value,
                    });
                }
            }
            (
                NameCovenant::Reveal { .. },
                NameCovenant::Register { .. } | NameCovenant::Redeem { .. },
            ) => {
                if output.address != coin.address {
                    return Err(LinkError::AddressMismatch { index });
                }
            }
            (
                NameCovenant::Register { .. }
                | NameCovenant::Update { .. }
                | NameCovenant::Renew { .. }
                | NameCovenant::Finalize { .. },
                NameCovenant::Update { .. }
                | NameCovenant::Renew { .. }
                | NameCovenant::Transfer { .. }
                | NameCovenant::Revoke { .. },
            ) => {
                let keep_address = !matches!(next, NameCovenant::Revoke { .. });
                check_same_coin(index, coin, output, keep_address)?;
            }
            (NameCovenant::Transfer { address, .. }, NameCovenant::Finalize { .. }) => {
                if output.value != coin.value {
                    return Err(LinkError::ValueMismatch { index });
                }
                if output.address != *address {
                    return Err(LinkError::TransferAddressMismatch { index });
                }
            }
            (
                NameCovenant::Transfer { .. },
                NameCovenant::Update { .. } | NameCovenant::Revoke { .. },
            ) => {
                let keep_address = matches!(next, NameCovenant::Update { .. });
                check_same_coin(index, coin, output, keep_address)?;
            }
            _ => {
                return Err(LinkError::Forbidden {
                    index,
                    input,
                    output: next.kind(),
                })
            }
        }
    }

    for (index, output) in tx.outputs.iter().enumerate().skip(spent.len()) {
        if !matches!(
            output.covenant.kind,
            CovenantType::None | CovenantType::Open | CovenantType::Bid
        ) {
            return Err(LinkError::UnlinkedOutput {
                index,
                output: output.covenant.kind,
            });
        }
    }

    Ok(())
}

fn check_unlinked_output(index: usize, output: &Output) -> Result<(), LinkError> {
    match output.covenant.kind {
        CovenantType::None | CovenantType::Open | CovenantType::Bid => Ok(()),
        kind => Err(LinkError::UnlinkedOutput {
            index,
            output: kind,
        }),
    }
}

/// Owner-class links keep the value; all but REVOKE keep the address
fn check_same_coin(
    index: usize,
    coin: &Coin,
    output: &Output,
    keep_address: bool,
) -> Result<(), LinkError> {
    if output.value != coin.value {
        return Err(LinkError::ValueMismatch { index });
    }
    if keep_address && output.address != coin.address {
        return Err(LinkError::AddressMismatch { index });
    }
    Ok(())
}
