//! Covenant wire form
//!
//! Every output carries a covenant: a type tag plus a list of raw byte
//! items. The typed view of the items lives in [`super::codec`].

use crate::core::encoding::{write_u8, write_var_bytes, write_varint};
use crate::crypto::{serde_hex, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::CovenantError;

/// Covenant type tags
///
/// Tag 1 is reserved for a claim mechanism this chain does not implement and
/// is rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum CovenantType {
    None = 0,
    Open = 2,
    Bid = 3,
    Reveal = 4,
    Redeem = 5,
    Register = 6,
    Update = 7,
    Renew = 8,
    Transfer = 9,
    Finalize = 10,
    Revoke = 11,
}

impl CovenantType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        let kind = match tag {
            0 => CovenantType::None,
            2 => CovenantType::Open,
            3 => CovenantType::Bid,
            4 => CovenantType::Reveal,
            5 => CovenantType::Redeem,
            6 => CovenantType::Register,
            7 => CovenantType::Update,
            8 => CovenantType::Renew,
            9 => CovenantType::Transfer,
            10 => CovenantType::Finalize,
            11 => CovenantType::Revoke,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_name(self) -> bool {
        self != CovenantType::None
    }

    /// Coins of this type may fund NONE, OPEN and BID outputs freely
    pub fn is_unlinked(self) -> bool {
        matches!(
            self,
            CovenantType::None | CovenantType::Open | CovenantType::Redeem
        )
    }

    /// Covenants that open or mutate a name outside the auction itself
    pub fn is_update_class(self) -> bool {
        matches!(
            self,
            CovenantType::Open
                | CovenantType::Register
                | CovenantType::Update
                | CovenantType::Renew
                | CovenantType::Transfer
                | CovenantType::Finalize
                | CovenantType::Revoke
        )
    }
}

impl fmt::Display for CovenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CovenantType::None => "NONE",
            CovenantType::Open => "OPEN",
            CovenantType::Bid => "BID",
            CovenantType::Reveal => "REVEAL",
            CovenantType::Redeem => "REDEEM",
            CovenantType::Register => "REGISTER",
            CovenantType::Update => "UPDATE",
            CovenantType::Renew => "RENEW",
            CovenantType::Transfer => "TRANSFER",
            CovenantType::Finalize => "FINALIZE",
            CovenantType::Revoke => "REVOKE",
        };
        f.write_str(name)
    }
}

/// A covenant as it appears on an output
///
/// Serialized with its raw tag; deserializing an unknown tag fails with
/// [`CovenantError::UnknownType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCovenant", into = "RawCovenant")]
pub struct Covenant {
    pub kind: CovenantType,
    pub items: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct RawCovenant {
    #[serde(rename = "type")]
    tag: u8,
    #[serde(with = "serde_hex::list")]
    items: Vec<Vec<u8>>,
}

impl TryFrom<RawCovenant> for Covenant {
    type Error = CovenantError;

    fn try_from(raw: RawCovenant) -> Result<Self, Self::Error> {
        Covenant::from_raw(raw.tag, raw.items)
    }
}

impl From<Covenant> for RawCovenant {
    fn from(covenant: Covenant) -> Self {
        Self {
            tag: covenant.kind.as_u8(),
            items: covenant.items,
        }
    }
}

impl Covenant {
    pub fn new(kind: CovenantType, items: Vec<Vec<u8>>) -> Self {
        Self { kind, items }
    }

    pub fn none() -> Self {
        Self::new(CovenantType::None, Vec::new())
    }

    /// Build a covenant from a raw tag, rejecting unknown tags
    pub fn from_raw(tag: u8, items: Vec<Vec<u8>>) -> Result<Self, CovenantError> {
        let kind = CovenantType::from_u8(tag).ok_or(CovenantError::UnknownType(tag))?;
        Ok(Self::new(kind, items))
    }

    pub fn is_none(&self) -> bool {
        self.kind == CovenantType::None
    }

    pub fn is_name(&self) -> bool {
        self.kind.is_name()
    }

    /// The name hash in the first item of a name covenant, without decoding
    /// the rest
    pub fn name_hash(&self) -> Option<Hash> {
        if !self.is_name() {
            return None;
        }
        self.items.first().and_then(|item| Hash::from_slice(item))
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        write_u8(buf, self.kind.as_u8());
        write_varint(buf, self.items.len());
        for item in &self.items {
            write_var_bytes(buf, item);
        }
    }
}

impl Default for Covenant {
    fn default() -> Self {
        Self::none()
    }
}
