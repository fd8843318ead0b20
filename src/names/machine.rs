//! Name auction state machine
//!
//! Applies the name covenants of one transaction to a [`NameView`]. Outputs
//! are processed in order; an output linked to a name-bearing input moves
//! that name forward, while unlinked OPEN and BID outputs start or join an
//! auction. Expired names are reset to absent the first time they are
//! touched.

use crate::config::NameRules;
use crate::core::transaction::{Coin, Outpoint, Output, Transaction};
use crate::covenant::{
    has_rollout, is_reserved, rollout_height, verify_links, LinkError, NameCovenant, NameHash,
};
use crate::crypto::Hash;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::state::{AuctionPhase, NameState, TransferLock};
use super::view::NameView;

/// Name-state rule violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Name {0} has no live auction or registration")]
    NameNotActive(NameHash),
    #[error("Name {name_hash} is {found}, expected {expected}")]
    WrongPhase {
        name_hash: NameHash,
        expected: AuctionPhase,
        found: AuctionPhase,
    },
    #[error("Covenant refers to auction at {found}, current auction opened at {expected}")]
    HeightMismatch { expected: u32, found: u32 },
    #[error("Name {0} is already open")]
    AlreadyOpen(NameHash),
    #[error("Name {name_hash} is not rolled out until height {height}")]
    NotRolledOut { name_hash: NameHash, height: u32 },
    #[error("Name {0} is reserved")]
    Reserved(NameHash),
    #[error("Auction for {0} has not closed")]
    AuctionNotClosed(NameHash),
    #[error("Winning bid for {0} cannot be redeemed")]
    RedeemWinner(NameHash),
    #[error("Name {0} is already registered")]
    AlreadyRegistered(NameHash),
    #[error("Spent coin does not own {0}")]
    NotOwner(NameHash),
    #[error("Register value {found} does not match price {expected}")]
    WrongPrice { expected: u64, found: u64 },
    #[error("Name {name_hash} cannot be renewed before height {height}")]
    RenewalPremature { name_hash: NameHash, height: u32 },
    #[error("Name {0} has a pending transfer")]
    Transferring(NameHash),
    #[error("Name {0} has no pending transfer")]
    NotTransferring(NameHash),
    #[error("Transfer of {name_hash} is locked until height {height}")]
    TransferLocked { name_hash: NameHash, height: u32 },
    #[error("Finalize does not pay the transfer address of {0}")]
    WrongTransferAddress(NameHash),
    #[error("Finalize name or renewal count does not match {0}")]
    FinalizeMismatch(NameHash),
    #[error("Block {0} is not a recent main-chain block")]
    StaleBlockHash(Hash),
}

/// Resolves main-chain block hashes to heights
pub trait ChainLookup {
    fn main_chain_height(&self, hash: &Hash) -> Option<u32>;
}

impl ChainLookup for HashMap<Hash, u32> {
    fn main_chain_height(&self, hash: &Hash) -> Option<u32> {
        self.get(hash).copied()
    }
}

/// Everything the machine needs besides the view
pub struct NameContext<'a> {
    /// Height of the block the transaction is (or would be) in
    pub height: u32,
    pub rules: &'a NameRules,
    pub reserved: &'a HashSet<NameHash>,
    pub blocks: &'a dyn ChainLookup,
}

/// Apply the name covenants of `tx` to `view`
///
/// `spent` and `spent_covenants` describe the coins consumed by each input,
/// `outputs` the decoded covenant of each output.
pub fn apply_transaction(
    ctx: &NameContext<'_>,
    view: &mut NameView<'_>,
    tx: &Transaction,
    tx_hash: &Hash,
    spent: &[Coin],
    spent_covenants: &[Option<NameCovenant>],
    outputs: &[Option<NameCovenant>],
) -> Result<(), TransitionError> {
    verify_links(tx, spent, spent_covenants, outputs)?;

    for (index, output) in tx.outputs.iter().enumerate() {
        let Some(covenant) = &outputs[index] else {
            continue;
        };
        let outpoint = Outpoint::new(*tx_hash, index as u32);

        let linked = spent
            .get(index)
            .filter(|coin| !coin.covenant.kind.is_unlinked())
            .and_then(|_| spent_covenants[index].as_ref());

        match (linked, covenant) {
            (Some(prev), next) => {
                let prevout = tx.inputs[index].prevout;
                apply_linked(ctx, view, &prevout, prev, next, output, outpoint)?;
            }
            (None, NameCovenant::Open { name_hash, name }) => {
                apply_open(ctx, view, name_hash, name)?;
            }
            (
                None,
                NameCovenant::Bid {
                    name_hash, height, ..
                },
            ) => {
                let ns = require(ctx, view, name_hash)?;
                check_height(&ns, *height)?;
                expect_phase(ctx, &ns, AuctionPhase::Bidding)?;
            }
            (None, other) => {
                return Err(LinkError::UnlinkedOutput {
                    index,
                    output: other.kind(),
                }
                .into());
            }
        }
    }

    Ok(())
}

fn apply_open(
    ctx: &NameContext<'_>,
    view: &mut NameView<'_>,
    name_hash: &NameHash,
    name: &[u8],
) -> Result<(), TransitionError> {
    if !has_rollout(name_hash, ctx.height, ctx.rules) {
        return Err(TransitionError::NotRolledOut {
            name_hash: *name_hash,
            height: rollout_height(name_hash, ctx.rules),
        });
    }

    if is_reserved(name_hash, ctx.height, ctx.rules, ctx.reserved) {
        return Err(TransitionError::Reserved(*name_hash));
    }

    match load(ctx, view, name_hash) {
        None => {
            let ns = NameState::new(name.to_vec(), *name_hash, ctx.height);
            view.set(*name_hash, Some(ns));
            Ok(())
        }
        // A second OPEN in the block that started the auction
        Some(ns) if ns.height == ctx.height => Ok(()),
        Some(_) => Err(TransitionError::AlreadyOpen(*name_hash)),
    }
}

fn apply_linked(
    ctx: &NameContext<'_>,
    view: &mut NameView<'_>,
    prevout: &Outpoint,
    prev: &NameCovenant,
    next: &NameCovenant,
    output: &Output,
    outpoint: Outpoint,
) -> Result<(), TransitionError> {
    let name_hash = *next.name_hash();

    if let NameCovenant::Redeem { height, .. } = next {
        if ctx.height < height + ctx.rules.auction_length() {
            return Err(TransitionError::AuctionNotClosed(name_hash));
        }
        if let Some(ns) = load(ctx, view, &name_hash) {
            if ns.height == *height && !ns.registered && ns.owner == *prevout {
                return Err(TransitionError::RedeemWinner(name_hash));
            }
        }
        return Ok(());
    }

    let mut ns = require(ctx, view, &name_hash)?;
    if let Some(height) = next.height() {
        check_height(&ns, height)?;
    }

    match next {
        NameCovenant::Reveal { .. } => {
            expect_phase(ctx, &ns, AuctionPhase::Reveal)?;
            ns.apply_reveal(outpoint, output.value);
        }
        NameCovenant::Register {
            data, block_hash, ..
        } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            if ns.registered {
                return Err(TransitionError::AlreadyRegistered(name_hash));
            }
            check_owner(&ns, prevout)?;
            if output.value != ns.value {
                return Err(TransitionError::WrongPrice {
                    expected: ns.value,
                    found: output.value,
                });
            }
            check_block_hash(ctx, block_hash)?;

            ns.registered = true;
            ns.renewal = ctx.height;
            ns.data = data.clone();
            ns.owner = outpoint;
        }
        NameCovenant::Update { data, .. } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            check_owner(&ns, prevout)?;
            if matches!(prev, NameCovenant::Transfer { .. }) {
                ns.transfer = None;
            }
            ns.data = data.clone();
            ns.owner = outpoint;
        }
        NameCovenant::Renew { block_hash, .. } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            check_owner(&ns, prevout)?;
            if ns.is_transferring() {
                return Err(TransitionError::Transferring(name_hash));
            }
            let allowed = ns.renewal + ctx.rules.renewal_open;
            if ctx.height < allowed {
                return Err(TransitionError::RenewalPremature {
                    name_hash,
                    height: allowed,
                });
            }
            check_block_hash(ctx, block_hash)?;

            ns.renewal = ctx.height;
            ns.renewals += 1;
            ns.owner = outpoint;
        }
        NameCovenant::Transfer { address, .. } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            check_owner(&ns, prevout)?;
            if ns.is_transferring() {
                return Err(TransitionError::Transferring(name_hash));
            }
            ns.transfer = Some(TransferLock {
                address: address.clone(),
                height: ctx.height,
            });
            ns.owner = outpoint;
        }
        NameCovenant::Finalize {
            name,
            renewals,
            block_hash,
            ..
        } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            check_owner(&ns, prevout)?;
            let lock = ns
                .transfer
                .clone()
                .ok_or(TransitionError::NotTransferring(name_hash))?;
            let unlocked = lock.height + ctx.rules.transfer_lockup;
            if ctx.height < unlocked {
                return Err(TransitionError::TransferLocked {
                    name_hash,
                    height: unlocked,
                });
            }
            if output.address != lock.address {
                return Err(TransitionError::WrongTransferAddress(name_hash));
            }
            if *name != ns.name || *renewals != ns.renewals {
                return Err(TransitionError::FinalizeMismatch(name_hash));
            }
            check_block_hash(ctx, block_hash)?;

            ns.transfer = None;
            ns.renewal = ctx.height;
            ns.renewals += 1;
            ns.owner = outpoint;
        }
        NameCovenant::Revoke { .. } => {
            expect_phase(ctx, &ns, AuctionPhase::Closed)?;
            check_owner(&ns, prevout)?;
            ns.revoked = Some(ctx.height);
            ns.transfer = None;
            ns.data.clear();
            ns.owner = outpoint;
        }
        NameCovenant::Open { .. } | NameCovenant::Bid { .. } | NameCovenant::Redeem { .. } => {
            return Err(LinkError::Forbidden {
                index: outpoint.index as usize,
                input: prev.kind(),
                output: next.kind(),
            }
            .into());
        }
    }

    view.set(name_hash, Some(ns));
    Ok(())
}

/// Current state of a name, resetting it if it has expired
fn load(ctx: &NameContext<'_>, view: &mut NameView<'_>, name_hash: &NameHash) -> Option<NameState> {
    let ns = view.get(name_hash)?.clone();
    if ns.is_expired(ctx.height, ctx.rules) {
        log::debug!("Name {} expired at height {}", name_hash.short(), ctx.height);
        view.set(*name_hash, None);
        return None;
    }
    Some(ns)
}

fn require(
    ctx: &NameContext<'_>,
    view: &mut NameView<'_>,
    name_hash: &NameHash,
) -> Result<NameState, TransitionError> {
    load(ctx, view, name_hash).ok_or(TransitionError::NameNotActive(*name_hash))
}

fn check_height(ns: &NameState, height: u32) -> Result<(), TransitionError> {
    if ns.height != height {
        return Err(TransitionError::HeightMismatch {
            expected: ns.height,
            found: height,
        });
    }
    Ok(())
}

fn expect_phase(
    ctx: &NameContext<'_>,
    ns: &NameState,
    expected: AuctionPhase,
) -> Result<(), TransitionError> {
    let found = ns.phase(ctx.height, ctx.rules);
    if found != expected {
        return Err(TransitionError::WrongPhase {
            name_hash: ns.name_hash,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_owner(ns: &NameState, prevout: &Outpoint) -> Result<(), TransitionError> {
    if ns.owner != *prevout {
        return Err(TransitionError::NotOwner(ns.name_hash));
    }
    Ok(())
}

fn check_block_hash(ctx: &NameContext<'_>, hash: &Hash) -> Result<(), TransitionError> {
    match ctx.blocks.main_chain_height(hash) {
        Some(height) if height + ctx.rules.renewal_maturity >= ctx.height => Ok(()),
        _ => Err(TransitionError::StaleBlockHash(*hash)),
    }
}
