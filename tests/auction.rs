//! End-to-end name auctions on a regtest chain

use namechain::config::{ChainOptions, MempoolOptions, Network};
use namechain::core::{
    sign_input, Address, Block, BlockchainError, Chain, Input, Outpoint, Output, Transaction,
    TrustedVerifier, VerifyError,
};
use namechain::covenant::{blind, LinkError, NameCovenant, NameHash, NameHasher, Sha256NameHasher};
use namechain::crypto::{sha256, Hash, KeyPair};
use namechain::mining::{Mempool, MempoolError};
use namechain::names::{AuctionPhase, TransitionError};
use namechain::storage::{FileStore, StorageConfig};
use std::sync::Arc;

const NAME: &[u8] = b"example";
const FEE: u64 = 10_000;

fn addr(tag: u8) -> Address {
    Address::new(0, vec![tag; 20])
}

fn name_hash() -> NameHash {
    Sha256NameHasher.hash_name(NAME)
}

fn nonce(bidder: u8) -> Hash {
    sha256(&[bidder])
}

fn regtest() -> Chain {
    Chain::with_verifier(ChainOptions::new(Network::Regtest), Arc::new(TrustedVerifier)).unwrap()
}

fn tx(inputs: Vec<Outpoint>, outputs: Vec<Output>) -> Transaction {
    Transaction::new(inputs.into_iter().map(Input::new).collect(), outputs)
}

fn covenant_output(value: u64, address: Address, covenant: NameCovenant) -> Output {
    Output::with_covenant(value, address, covenant.encode())
}

struct Harness {
    chain: Chain,
    funds: Vec<(Outpoint, u64)>,
    miner: Address,
}

impl Harness {
    fn new() -> Self {
        Self::with_chain(regtest())
    }

    /// Mine ten blocks and keep the first eight coinbases as mature funds
    fn with_chain(chain: Chain) -> Self {
        let mut harness = Self {
            chain,
            funds: Vec::new(),
            miner: addr(0xee),
        };
        let mut funds = Vec::new();
        for _ in 0..10 {
            let block = harness.mine(vec![]);
            let coinbase = &block.transactions[0];
            funds.push((coinbase.outpoint(0), coinbase.outputs[0].value));
        }
        funds.truncate(8);
        harness.funds = funds;
        harness
    }

    /// Same blocks up to `height`, mining to a different address afterwards
    fn replay(&self, height: u32) -> Self {
        let mut chain = regtest();
        for h in 1..=height {
            let block = self.chain.get_block(h).unwrap().unwrap();
            chain.connect_block(&block).unwrap();
        }
        Self {
            chain,
            funds: self.funds.clone(),
            miner: addr(0xdd),
        }
    }

    fn fund(&mut self) -> (Outpoint, u64) {
        self.funds.remove(0)
    }

    fn build(&self, txs: Vec<Transaction>) -> Result<Block, BlockchainError> {
        let time = self.chain.height() as u64 + 1;
        self.chain.build_block(txs, self.miner.clone(), time, 1)
    }

    fn try_mine(&mut self, txs: Vec<Transaction>) -> Result<Block, BlockchainError> {
        let block = self.build(txs)?;
        self.chain.connect_block(&block)?;
        Ok(block)
    }

    fn mine(&mut self, txs: Vec<Transaction>) -> Block {
        self.try_mine(txs).unwrap()
    }

    fn mine_to(&mut self, height: u32) {
        while self.chain.height() < height {
            self.mine(vec![]);
        }
    }

    fn open(&mut self, owner: u8) -> Transaction {
        let (outpoint, value) = self.fund();
        tx(
            vec![outpoint],
            vec![
                covenant_output(
                    0,
                    addr(owner),
                    NameCovenant::Open {
                        name_hash: name_hash(),
                        name: NAME.to_vec(),
                    },
                ),
                Output::new(value - FEE, addr(owner)),
            ],
        )
    }

    fn bid(&mut self, bidder: u8, value: u64, lockup: u64, opened: u32) -> Transaction {
        let (outpoint, funds) = self.fund();
        let nh = name_hash();
        tx(
            vec![outpoint],
            vec![
                covenant_output(
                    lockup,
                    addr(bidder),
                    NameCovenant::Bid {
                        name_hash: nh,
                        height: opened,
                        name: NAME.to_vec(),
                        blind: blind(&nh, value, &nonce(bidder)),
                    },
                ),
                Output::new(funds - lockup - FEE, addr(bidder)),
            ],
        )
    }

    /// Mine an OPEN and return its height
    fn open_name(&mut self, owner: u8) -> u32 {
        let open = self.open(owner);
        self.mine(vec![open]);
        self.chain.height()
    }

    /// Single-bid auction won by `owner`; returns the OPEN height and the
    /// registered name coin
    fn auction(&mut self, owner: u8) -> (u32, Outpoint, u64) {
        let opened = self.open_name(owner);
        let bid = self.bid(owner, 25, 25, opened);
        self.mine(vec![bid.clone()]);

        self.mine_to(opened + 5);
        let reveal = reveal_tx(bid.outpoint(0), owner, 25, 25, opened);
        self.mine(vec![reveal.clone()]);

        self.mine_to(opened + 15);
        let price = self.chain.name_state(&name_hash()).unwrap().value;
        let register = register_tx(&self.chain, reveal.outpoint(0), owner, 25, price, opened);
        self.mine(vec![register.clone()]);

        (opened, register.outpoint(0), price)
    }
}

fn reveal_tx(bid: Outpoint, bidder: u8, value: u64, lockup: u64, opened: u32) -> Transaction {
    tx(
        vec![bid],
        vec![
            covenant_output(
                value,
                addr(bidder),
                NameCovenant::Reveal {
                    name_hash: name_hash(),
                    height: opened,
                    nonce: nonce(bidder),
                },
            ),
            Output::new(lockup - value, addr(bidder)),
        ],
    )
}

fn register_tx(
    chain: &Chain,
    reveal: Outpoint,
    owner: u8,
    revealed: u64,
    price: u64,
    opened: u32,
) -> Transaction {
    tx(
        vec![reveal],
        vec![
            covenant_output(
                price,
                addr(owner),
                NameCovenant::Register {
                    name_hash: name_hash(),
                    height: opened,
                    data: b"records".to_vec(),
                    block_hash: chain.tip_hash(),
                },
            ),
            Output::new(revealed - price, addr(owner)),
        ],
    )
}

fn redeem_tx(reveal: Outpoint, bidder: u8, value: u64, opened: u32) -> Transaction {
    tx(
        vec![reveal],
        vec![covenant_output(
            value,
            addr(bidder),
            NameCovenant::Redeem {
                name_hash: name_hash(),
                height: opened,
            },
        )],
    )
}

fn update_tx(coin: Outpoint, owner: u8, value: u64, opened: u32, data: &[u8]) -> Transaction {
    tx(
        vec![coin],
        vec![covenant_output(
            value,
            addr(owner),
            NameCovenant::Update {
                name_hash: name_hash(),
                height: opened,
                data: data.to_vec(),
            },
        )],
    )
}

fn transition_error(err: BlockchainError) -> TransitionError {
    match err {
        BlockchainError::InvalidBlock {
            source: VerifyError::InvalidCovenantTransition(err),
            ..
        } => err,
        other => panic!("expected a covenant transition error, got {other:?}"),
    }
}

#[test]
fn test_second_price_auction() {
    let mut h = Harness::new();
    let nh = name_hash();
    let opened = h.open_name(1);
    assert_eq!(
        h.chain.name_info(&nh).unwrap().phase,
        AuctionPhase::Bidding
    );

    let bids: Vec<Transaction> = [(10u8, 10u64), (11, 50), (12, 30)]
        .into_iter()
        .map(|(bidder, value)| h.bid(bidder, value, value + 5, opened))
        .collect();
    h.mine(bids.clone());

    // Reveals before the reveal phase are rejected
    let early = reveal_tx(bids[1].outpoint(0), 11, 50, 55, opened);
    let err = transition_error(h.try_mine(vec![early]).unwrap_err());
    assert!(matches!(
        err,
        TransitionError::WrongPhase {
            expected: AuctionPhase::Reveal,
            found: AuctionPhase::Bidding,
            ..
        }
    ));

    h.mine_to(opened + 5);

    // A reveal must open the blind it spends
    let lying = reveal_tx(bids[1].outpoint(0), 11, 49, 55, opened);
    let err = transition_error(h.try_mine(vec![lying]).unwrap_err());
    assert_eq!(
        err,
        TransitionError::Link(LinkError::BlindMismatch { index: 0 })
    );

    let reveals: Vec<Transaction> = [(10u8, 10u64), (11, 50), (12, 30)]
        .into_iter()
        .zip(&bids)
        .map(|((bidder, value), bid)| reveal_tx(bid.outpoint(0), bidder, value, value + 5, opened))
        .collect();
    h.mine(reveals.clone());
    assert_eq!(h.chain.height(), opened + 6);

    let ns = h.chain.name_state(&nh).unwrap().clone();
    assert_eq!(ns.highest, 50);
    assert_eq!(ns.value, 30);
    assert_eq!(ns.owner, reveals[1].outpoint(0));

    h.mine_to(opened + 14);
    let early_redeem = redeem_tx(reveals[0].outpoint(0), 10, 10, opened);
    let err = transition_error(h.try_mine(vec![early_redeem]).unwrap_err());
    assert_eq!(err, TransitionError::AuctionNotClosed(nh));

    h.mine_to(opened + 15);
    let winner_redeem = redeem_tx(reveals[1].outpoint(0), 11, 50, opened);
    let err = transition_error(h.try_mine(vec![winner_redeem]).unwrap_err());
    assert_eq!(err, TransitionError::RedeemWinner(nh));

    // Overpaying is not accepted: the winner pays the second price
    let overpay = register_tx(&h.chain, reveals[1].outpoint(0), 11, 50, 50, opened);
    let err = transition_error(h.try_mine(vec![overpay]).unwrap_err());
    assert_eq!(
        err,
        TransitionError::WrongPrice {
            expected: 30,
            found: 50
        }
    );

    let register = register_tx(&h.chain, reveals[1].outpoint(0), 11, 50, 30, opened);
    h.mine(vec![
        register.clone(),
        redeem_tx(reveals[0].outpoint(0), 10, 10, opened),
        redeem_tx(reveals[2].outpoint(0), 12, 30, opened),
    ]);

    let info = h.chain.name_info(&nh).unwrap();
    assert!(info.state.registered);
    assert_eq!(info.state.owner, register.outpoint(0));
    assert_eq!(info.state.data, b"records");
    assert_eq!(info.phase, AuctionPhase::Closed);
    assert!(!info.expired);

    let winner = h.chain.balance(&addr(11));
    assert_eq!(winner.locked, 30);
    assert_eq!(h.chain.balance(&addr(10)).locked, 0);
    assert_eq!(h.chain.balance(&addr(12)).locked, 0);
}

#[test]
fn test_header_root_repeats_between_boundaries() {
    let mut h = Harness::new();
    assert_eq!(h.chain.height(), 10);
    let committed = h.chain.tree_root();

    h.open_name(1);
    h.mine_to(14);
    for height in 11..=14 {
        let block = h.chain.get_block(height).unwrap().unwrap();
        assert_eq!(block.header.tree_root, committed);
    }

    let mut stale = h.build(vec![]).unwrap();
    stale.header.tree_root = committed;
    match h.chain.connect_block(&stale).unwrap_err() {
        BlockchainError::TreeRootMismatch(mismatch) => {
            assert_eq!(mismatch.height, 15);
            assert_eq!(mismatch.found, committed);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.chain.height(), 14);

    let block = h.build(vec![]).unwrap();
    let outcome = h.chain.connect_block(&block).unwrap();
    let commitment = outcome.commitment.unwrap();
    assert_eq!(commitment.height, 15);
    assert_ne!(commitment.root, committed);
    assert_eq!(h.chain.tree_root(), commitment.root);
}

#[test]
fn test_name_proof_against_committed_root() {
    let mut h = Harness::new();
    let nh = name_hash();
    let (opened, _, _) = h.auction(3);

    let boundary = (h.chain.height() / 5 + 1) * 5;
    h.mine_to(boundary);
    assert!(boundary > opened);

    let (proof, root) = h.chain.prove_name(&nh).unwrap();
    assert_eq!(root, h.chain.tree_root());
    let state = h.chain.name_state(&nh).unwrap();
    assert!(proof.verify(state, &root));

    let mut forged = state.clone();
    forged.data = b"forged".to_vec();
    assert!(!proof.verify(&forged, &root));
}

#[test]
fn test_disconnect_restores_snapshot() {
    let mut h = Harness::new();
    let opened = h.open_name(1);
    let before = h.chain.snapshot();

    let bid = h.bid(10, 10, 15, opened);
    h.mine(vec![bid]);
    h.mine_to(opened + 6);
    assert_eq!(h.chain.commitments().last().unwrap().height, 15);

    for _ in 0..6 {
        h.chain.disconnect_tip().unwrap();
    }
    assert_eq!(h.chain.snapshot(), before);
}

#[test]
fn test_expired_name_can_be_reopened() {
    let mut rules = Network::Regtest.name_rules();
    rules.renewal_window = 20;
    let options = ChainOptions::new(Network::Regtest).with_rules(rules);
    let chain = Chain::with_verifier(options, Arc::new(TrustedVerifier)).unwrap();
    let mut h = Harness::with_chain(chain);
    let nh = name_hash();

    let (opened, _, _) = h.auction(1);
    let registered = opened + 16;
    assert_eq!(h.chain.name_info(&nh).unwrap().expires_at, registered + 20);

    h.mine_to(registered + 18);
    let open = h.open(2);
    let err = transition_error(h.try_mine(vec![open.clone()]).unwrap_err());
    assert_eq!(err, TransitionError::AlreadyOpen(nh));

    h.mine(vec![]);
    assert!(h.chain.name_info(&nh).unwrap().expired);
    h.mine(vec![open]);

    let ns = h.chain.name_state(&nh).unwrap();
    assert_eq!(ns.height, registered + 20);
    assert!(!ns.registered);
    assert!(ns.owner.is_null());
}

#[test]
fn test_transfer_finalize_and_renew() {
    let mut h = Harness::new();
    let nh = name_hash();
    let (opened, coin, value) = h.auction(1);

    let transfer = tx(
        vec![coin],
        vec![covenant_output(
            value,
            addr(1),
            NameCovenant::Transfer {
                name_hash: nh,
                height: opened,
                address: addr(2),
            },
        )],
    );
    h.mine(vec![transfer.clone()]);
    let transferred = h.chain.height();

    let finalize = |chain: &Chain| {
        tx(
            vec![transfer.outpoint(0)],
            vec![covenant_output(
                value,
                addr(2),
                NameCovenant::Finalize {
                    name_hash: nh,
                    height: opened,
                    name: NAME.to_vec(),
                    renewals: 0,
                    block_hash: chain.tip_hash(),
                },
            )],
        )
    };

    let early = finalize(&h.chain);
    let err = transition_error(h.try_mine(vec![early]).unwrap_err());
    assert_eq!(
        err,
        TransitionError::TransferLocked {
            name_hash: nh,
            height: transferred + 10
        }
    );

    h.mine_to(transferred + 9);
    let fin = finalize(&h.chain);
    h.mine(vec![fin.clone()]);

    let ns = h.chain.name_state(&nh).unwrap().clone();
    assert_eq!(ns.owner, fin.outpoint(0));
    assert_eq!(ns.renewals, 1);
    assert_eq!(ns.renewal, transferred + 10);
    assert!(ns.transfer.is_none());

    let update = update_tx(fin.outpoint(0), 2, value, opened, b"hello");
    h.mine(vec![update.clone()]);
    assert_eq!(h.chain.name_state(&nh).unwrap().data, b"hello");

    let renew = |chain: &Chain| {
        tx(
            vec![update.outpoint(0)],
            vec![covenant_output(
                value,
                addr(2),
                NameCovenant::Renew {
                    name_hash: nh,
                    height: opened,
                    block_hash: chain.tip_hash(),
                },
            )],
        )
    };
    let early = renew(&h.chain);
    let err = transition_error(h.try_mine(vec![early]).unwrap_err());
    assert_eq!(
        err,
        TransitionError::RenewalPremature {
            name_hash: nh,
            height: transferred + 15
        }
    );

    h.mine_to(transferred + 14);
    let renewal = renew(&h.chain);
    h.mine(vec![renewal]);
    let ns = h.chain.name_state(&nh).unwrap();
    assert_eq!(ns.renewals, 2);
    assert_eq!(ns.renewal, transferred + 15);
}

#[test]
fn test_revoked_name_reopens_after_maturity() {
    let mut h = Harness::new();
    let nh = name_hash();
    let (opened, coin, value) = h.auction(1);

    let revoke = tx(
        vec![coin],
        vec![covenant_output(
            value,
            addr(9),
            NameCovenant::Revoke {
                name_hash: nh,
                height: opened,
            },
        )],
    );
    h.mine(vec![revoke.clone()]);
    let revoked = h.chain.height();

    let info = h.chain.name_info(&nh).unwrap();
    assert_eq!(info.phase, AuctionPhase::Revoked);
    assert_eq!(info.state.revoked, Some(revoked));
    assert!(info.state.data.is_empty());

    let update = update_tx(revoke.outpoint(0), 9, value, opened, b"again");
    let err = transition_error(h.try_mine(vec![update]).unwrap_err());
    assert!(matches!(
        err,
        TransitionError::Link(LinkError::Forbidden { .. })
    ));

    let open = h.open(2);
    let err = transition_error(h.try_mine(vec![open.clone()]).unwrap_err());
    assert_eq!(err, TransitionError::AlreadyOpen(nh));

    h.mine_to(revoked + 64);
    h.mine(vec![open]);
    let ns = h.chain.name_state(&nh).unwrap();
    assert_eq!(ns.height, revoked + 65);
    assert!(ns.revoked.is_none());
}

#[test]
fn test_mempool_reserves_name_updates() {
    let mut h = Harness::new();
    let mut pool = Mempool::new(MempoolOptions::default());
    let nh = name_hash();

    let first = h.open(1);
    let second = h.open(2);
    pool.add_transaction(first.clone(), &h.chain).unwrap();
    assert_eq!(
        pool.add_transaction(second.clone(), &h.chain).unwrap_err(),
        MempoolError::ConflictingNameUpdate(nh)
    );
    assert_eq!(pool.reservation(&nh), Some(first.hash()));

    let block = h.mine(pool.get_transactions(10));
    pool.add_block(&block, &h.chain);
    assert!(pool.is_empty());
    assert!(pool.reservation(&nh).is_none());

    // Bids for the same auction do not reserve the name
    h.mine(vec![]);
    let opened = h.chain.height() - 1;
    let a = h.bid(3, 10, 10, opened);
    let b = h.bid(4, 20, 20, opened);
    pool.add_transaction(a, &h.chain).unwrap();
    pool.add_transaction(b, &h.chain).unwrap();
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_reorg_rolls_back_names() {
    let mut h = Harness::new();
    let nh = name_hash();
    let fork = h.chain.height();
    h.open_name(1);
    assert!(h.chain.name_state(&nh).is_some());

    let mut alt = h.replay(fork);
    let blocks = vec![alt.mine(vec![]), alt.mine(vec![])];

    let outcome = h.chain.reorganize(fork, &blocks).unwrap();
    assert_eq!(outcome.fork_height, fork);
    assert_eq!(outcome.disconnected.len(), 1);
    assert_eq!(outcome.connected.len(), 2);
    assert!(h.chain.name_state(&nh).is_none());
    assert_eq!(h.chain.snapshot(), alt.chain.snapshot());
}

#[test]
fn test_failed_reorg_restores_chain() {
    let mut h = Harness::new();
    let fork = h.chain.height();
    h.open_name(1);
    let before = h.chain.snapshot();

    let mut alt = h.replay(fork);
    let first = alt.mine(vec![]);
    let mut second = alt.mine(vec![]);
    second.header.tree_root = sha256(b"bogus");

    let err = h.chain.reorganize(fork, &[first, second]).unwrap_err();
    assert!(matches!(err, BlockchainError::TreeRootMismatch(_)));
    assert_eq!(h.chain.snapshot(), before);

    let mut alt = h.replay(fork);
    let single = alt.mine(vec![]);
    let err = h.chain.reorganize(fork, &[single]).unwrap_err();
    assert!(matches!(err, BlockchainError::InsufficientWork { .. }));
    assert_eq!(h.chain.snapshot(), before);
}

#[test]
fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open = || {
        let store = FileStore::open(StorageConfig::in_dir(dir.path())).unwrap();
        Chain::open(
            ChainOptions::new(Network::Regtest),
            Box::new(store),
            Arc::new(TrustedVerifier),
            Arc::new(Sha256NameHasher),
        )
        .unwrap()
    };

    let mut h = Harness::with_chain(open());
    let opened = h.open_name(1);
    let bid = h.bid(2, 10, 10, opened);
    h.mine(vec![bid]);
    let before = h.chain.snapshot();
    drop(h);

    let mut chain = open();
    assert_eq!(chain.snapshot(), before);

    chain.disconnect_tip().unwrap();
    chain.disconnect_tip().unwrap();
    assert!(chain.name_state(&name_hash()).is_none());
}

#[test]
fn test_signed_spend() {
    let mut chain = Chain::new(ChainOptions::new(Network::Regtest)).unwrap();
    let key = KeyPair::generate();
    let owner = Address::from_key_hash(key.key_hash());

    let mut coinbase = None;
    for height in 1..=3u32 {
        let block = chain.build_block(vec![], owner.clone(), height as u64, 1).unwrap();
        chain.connect_block(&block).unwrap();
        coinbase.get_or_insert(block.transactions[0].outpoint(0));
    }
    let outpoint = coinbase.unwrap();
    let coin = chain.coin(&outpoint).cloned().unwrap();

    let unsigned = tx(vec![outpoint], vec![Output::new(coin.value, addr(5))]);
    assert_eq!(
        chain.check_transaction(&unsigned).unwrap_err(),
        VerifyError::BadSignature(0)
    );

    let mut signed = unsigned.clone();
    sign_input(&mut signed, 0, &coin, &key).unwrap();
    chain.check_transaction(&signed).unwrap();

    let block = chain.build_block(vec![signed], owner, 4, 1).unwrap();
    chain.connect_block(&block).unwrap();
    assert_eq!(chain.balance(&addr(5)).spendable, coin.value);
}

#[test]
fn test_disconnect_unwinds_every_name_transition() {
    let mut h = Harness::new();
    let nh = name_hash();
    let base = h.chain.height();
    let mut checkpoints = vec![h.chain.snapshot()];

    let opened = h.open_name(1);
    let bids = vec![h.bid(1, 40, 40, opened), h.bid(2, 20, 20, opened)];
    h.mine(bids.clone());

    h.mine_to(opened + 5);
    let reveals = vec![
        reveal_tx(bids[0].outpoint(0), 1, 40, 40, opened),
        reveal_tx(bids[1].outpoint(0), 2, 20, 20, opened),
    ];
    h.mine(reveals.clone());
    checkpoints.push(h.chain.snapshot());

    h.mine_to(opened + 15);
    let register = register_tx(&h.chain, reveals[0].outpoint(0), 1, 40, 20, opened);
    h.mine(vec![
        register.clone(),
        redeem_tx(reveals[1].outpoint(0), 2, 20, opened),
    ]);
    checkpoints.push(h.chain.snapshot());

    let transfer = tx(
        vec![register.outpoint(0)],
        vec![covenant_output(
            20,
            addr(1),
            NameCovenant::Transfer {
                name_hash: nh,
                height: opened,
                address: addr(3),
            },
        )],
    );
    h.mine(vec![transfer.clone()]);
    let transferred = h.chain.height();
    checkpoints.push(h.chain.snapshot());

    h.mine_to(transferred + 9);
    let finalize = tx(
        vec![transfer.outpoint(0)],
        vec![covenant_output(
            20,
            addr(3),
            NameCovenant::Finalize {
                name_hash: nh,
                height: opened,
                name: NAME.to_vec(),
                renewals: 0,
                block_hash: h.chain.tip_hash(),
            },
        )],
    );
    h.mine(vec![finalize.clone()]);
    checkpoints.push(h.chain.snapshot());

    let revoke = tx(
        vec![finalize.outpoint(0)],
        vec![covenant_output(
            20,
            addr(9),
            NameCovenant::Revoke {
                name_hash: nh,
                height: opened,
            },
        )],
    );
    h.mine(vec![revoke]);
    let revoked = h.chain.height();
    checkpoints.push(h.chain.snapshot());

    // Reopening resets the lapsed revoked state first
    h.mine_to(revoked + 64);
    let reopen = h.open(4);
    h.mine(vec![reopen]);
    assert_eq!(h.chain.name_state(&nh).unwrap().height, revoked + 65);

    while h.chain.height() > base {
        h.chain.disconnect_tip().unwrap();
        let height = h.chain.height();
        if let Some(checkpoint) = checkpoints.iter().find(|cp| cp.tip.height == height) {
            assert_eq!(&h.chain.snapshot(), checkpoint, "state differs at height {height}");
        }
    }
    assert_eq!(h.chain.snapshot(), checkpoints[0]);
    assert!(h.chain.name_state(&nh).is_none());
}
