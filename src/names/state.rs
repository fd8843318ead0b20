//! Per-name auction and ownership record

use crate::config::NameRules;
use crate::core::address::Address;
use crate::core::encoding::{write_u32, write_u64, write_u8, write_var_bytes};
use crate::core::transaction::Outpoint;
use crate::covenant::NameHash;
use crate::crypto::serde_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Auction phase of a name at a given height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionPhase {
    Opening,
    Bidding,
    Reveal,
    Closed,
    Revoked,
}

impl fmt::Display for AuctionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuctionPhase::Opening => "opening",
            AuctionPhase::Bidding => "bidding",
            AuctionPhase::Reveal => "reveal",
            AuctionPhase::Closed => "closed",
            AuctionPhase::Revoked => "revoked",
        };
        f.write_str(name)
    }
}

/// Pending transfer of a registered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLock {
    pub address: Address,
    /// Height of the TRANSFER
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameState {
    #[serde(with = "serde_hex")]
    pub name: Vec<u8>,
    pub name_hash: NameHash,
    /// Height of the OPEN that started the current auction
    pub height: u32,
    /// Height of the last registration, renewal or finalize
    pub renewal: u32,
    /// Highest revealed bid during the auction, the name coin afterwards
    pub owner: Outpoint,
    /// Second-highest revealed value; the price the winner pays
    pub value: u64,
    pub highest: u64,
    #[serde(with = "serde_hex")]
    pub data: Vec<u8>,
    pub transfer: Option<TransferLock>,
    pub revoked: Option<u32>,
    pub renewals: u32,
    pub registered: bool,
}

impl NameState {
    /// Fresh state for an OPEN at `height`
    pub fn new(name: Vec<u8>, name_hash: NameHash, height: u32) -> Self {
        Self {
            name,
            name_hash,
            height,
            renewal: height,
            owner: Outpoint::null(),
            value: 0,
            highest: 0,
            data: Vec::new(),
            transfer: None,
            revoked: None,
            renewals: 0,
            registered: false,
        }
    }

    pub fn phase(&self, height: u32, rules: &NameRules) -> AuctionPhase {
        if self.revoked.is_some() {
            return AuctionPhase::Revoked;
        }

        let opening_end = self.height + rules.open_period;
        let bidding_end = opening_end + rules.bidding_period;
        let reveal_end = bidding_end + rules.reveal_period;

        if height < opening_end {
            AuctionPhase::Opening
        } else if height < bidding_end {
            AuctionPhase::Bidding
        } else if height < reveal_end {
            AuctionPhase::Reveal
        } else {
            AuctionPhase::Closed
        }
    }

    /// Whether the name has lapsed at `height` and should be treated as
    /// absent
    pub fn is_expired(&self, height: u32, rules: &NameRules) -> bool {
        if let Some(revoked) = self.revoked {
            return height >= revoked + rules.auction_maturity;
        }

        if self.phase(height, rules) != AuctionPhase::Closed {
            return false;
        }

        // Nobody revealed
        if self.owner.is_null() {
            return true;
        }

        height >= self.renewal + rules.renewal_window
    }

    /// Height at which the name lapses, if it is past its auction
    pub fn expiry_height(&self, rules: &NameRules) -> u32 {
        match self.revoked {
            Some(revoked) => revoked + rules.auction_maturity,
            None if self.owner.is_null() => self.height + rules.auction_length(),
            None => self.renewal + rules.renewal_window,
        }
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    /// Record a revealed bid; ties keep the earlier reveal
    pub fn apply_reveal(&mut self, outpoint: Outpoint, value: u64) {
        if self.owner.is_null() || value > self.highest {
            self.value = self.highest;
            self.highest = value;
            self.owner = outpoint;
        } else if value > self.value {
            self.value = value;
        }
    }

    /// Canonical encoding committed to by the name tree
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.data.len());
        write_var_bytes(&mut buf, &self.name);
        write_u32(&mut buf, self.height);
        write_u32(&mut buf, self.renewal);
        buf.extend_from_slice(self.owner.hash.as_bytes());
        write_u32(&mut buf, self.owner.index);
        write_u64(&mut buf, self.value);
        write_u64(&mut buf, self.highest);
        write_var_bytes(&mut buf, &self.data);
        match &self.transfer {
            Some(lock) => {
                write_u8(&mut buf, 1);
                write_u8(&mut buf, lock.address.version);
                write_var_bytes(&mut buf, &lock.address.hash);
                write_u32(&mut buf, lock.height);
            }
            None => write_u8(&mut buf, 0),
        }
        match self.revoked {
            Some(height) => {
                write_u8(&mut buf, 1);
                write_u32(&mut buf, height);
            }
            None => write_u8(&mut buf, 0),
        }
        write_u32(&mut buf, self.renewals);
        write_u8(&mut buf, self.registered as u8);
        buf
    }
}
