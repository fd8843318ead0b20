//! Network parameters and node configuration
//!
//! A [`Network`] preset fixes the consensus constants of the naming system
//! ([`NameRules`]) and of coin issuance. [`ChainOptions`] and
//! [`MempoolOptions`] carry the node-local knobs.

use crate::crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Base units per coin
pub const COIN: u64 = 1_000_000;

/// Blocks per day at the target spacing
pub const BLOCKS_PER_DAY: u32 = 144;

/// Default number of undo records kept behind the tip
pub const DEFAULT_UNDO_DEPTH: u32 = 288;

/// Default minimum relay fee, per 1000 bytes
pub const DEFAULT_MIN_RELAY_FEE: u64 = 1000;

/// Maximum raw name length in bytes
pub const MAX_NAME_SIZE: usize = 63;

/// Maximum resource payload carried by REGISTER and UPDATE
pub const MAX_RESOURCE_SIZE: usize = 512;

/// Chain selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

impl Network {
    /// Naming-system consensus constants for this network
    pub fn name_rules(&self) -> NameRules {
        let day = BLOCKS_PER_DAY;
        match self {
            Network::Main => NameRules {
                tree_interval: day / 4,
                open_period: day / 4 + 1,
                bidding_period: 5 * day,
                reveal_period: 10 * day,
                renewal_window: 2 * 365 * day,
                renewal_open: day / 4,
                renewal_maturity: 30 * day,
                transfer_lockup: 2 * day,
                auction_maturity: (5 + 10 + 14) * day,
                auction_start: 14 * day,
                rollout_interval: 7 * day,
                no_rollout: false,
                claim_period: 4 * 365 * day,
                no_reserved: false,
            },
            Network::Testnet => NameRules {
                tree_interval: day / 4,
                open_period: day / 4 + 1,
                bidding_period: day,
                reveal_period: 2 * day,
                renewal_window: 30 * day,
                renewal_open: day / 4,
                renewal_maturity: 2 * day,
                transfer_lockup: day,
                auction_maturity: (1 + 2 + 4) * day,
                auction_start: day / 4,
                rollout_interval: day / 4,
                no_rollout: false,
                claim_period: 90 * day,
                no_reserved: false,
            },
            Network::Regtest => NameRules {
                tree_interval: 5,
                open_period: 1,
                bidding_period: 5,
                reveal_period: 10,
                renewal_window: 5000,
                renewal_open: 5,
                renewal_maturity: 50,
                transfer_lockup: 10,
                auction_maturity: 5 + 10 + 50,
                auction_start: 0,
                rollout_interval: 2,
                no_rollout: true,
                claim_period: 250_000,
                no_reserved: true,
            },
        }
    }

    /// Coinbase subsidy per block
    pub fn block_reward(&self) -> u64 {
        2000 * COIN
    }

    /// Blocks a coinbase output must wait before it can be spent
    pub fn coinbase_maturity(&self) -> u32 {
        match self {
            Network::Main => 100,
            Network::Testnet => 100,
            Network::Regtest => 2,
        }
    }

    /// Timestamp carried by the genesis header
    pub fn genesis_time(&self) -> u64 {
        match self {
            Network::Main => 1_580_745_078,
            Network::Testnet => 1_580_745_079,
            Network::Regtest => 1_580_745_080,
        }
    }

    /// Difficulty bits carried by the genesis header
    pub fn genesis_bits(&self) -> u32 {
        match self {
            Network::Main | Network::Testnet => 16,
            Network::Regtest => 1,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

/// Consensus constants of the naming system, all in blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRules {
    /// Distance between tree commitments
    pub tree_interval: u32,
    /// Length of the opening phase after an OPEN (at least 1)
    pub open_period: u32,
    pub bidding_period: u32,
    pub reveal_period: u32,
    /// A registered name expires this long after its last renewal
    pub renewal_window: u32,
    /// Minimum age of the last renewal before a RENEW is accepted
    pub renewal_open: u32,
    /// Maximum age of the block hash committed by REGISTER, RENEW and FINALIZE
    pub renewal_maturity: u32,
    /// Delay between TRANSFER and FINALIZE
    pub transfer_lockup: u32,
    /// Cooldown after REVOKE before the name can be opened again
    pub auction_maturity: u32,
    /// First height of the weekly rollout schedule
    pub auction_start: u32,
    pub rollout_interval: u32,
    pub no_rollout: bool,
    /// Reserved names cannot be opened before this height
    pub claim_period: u32,
    pub no_reserved: bool,
}

impl NameRules {
    /// Blocks from OPEN until the auction closes
    pub fn auction_length(&self) -> u32 {
        self.open_period + self.bidding_period + self.reveal_period
    }
}

/// Chain-level options
#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub network: Network,
    pub rules: NameRules,
    /// Undo records older than this many blocks behind the tip are discarded;
    /// it also bounds the depth of a reorganization
    pub undo_depth: u32,
    /// Name hashes that may not be opened before the claim period ends
    pub reserved: HashSet<Hash>,
}

impl ChainOptions {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            rules: network.name_rules(),
            undo_depth: DEFAULT_UNDO_DEPTH,
            reserved: HashSet::new(),
        }
    }

    /// Replace the name rules, keeping the rest of the preset
    pub fn with_rules(mut self, rules: NameRules) -> Self {
        self.rules = rules;
        self
    }
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self::new(Network::Main)
    }
}

/// Mempool policy options
#[derive(Debug, Clone)]
pub struct MempoolOptions {
    /// Maximum number of pooled transactions
    pub max_size: usize,
    /// Minimum fee per 1000 bytes
    pub min_relay_fee: u64,
    /// Reject transactions paying a wildly excessive fee
    pub reject_absurd_fees: bool,
}

impl Default for MempoolOptions {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            min_relay_fee: DEFAULT_MIN_RELAY_FEE,
            reject_absurd_fees: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_open_period_covers_one_tree_interval() {
        let rules = Network::Main.name_rules();
        assert_eq!(rules.tree_interval, 36);
        assert_eq!(rules.open_period, rules.tree_interval + 1);
        assert_eq!(rules.auction_length(), 37 + 720 + 1440);
    }

    #[test]
    fn test_options_defaults() {
        let options = ChainOptions::new(Network::Regtest);
        assert_eq!(options.rules, Network::Regtest.name_rules());
        assert_eq!(options.undo_depth, DEFAULT_UNDO_DEPTH);
        assert!(MempoolOptions::default().reject_absurd_fees);
    }
}
