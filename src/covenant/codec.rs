//! Typed covenant codec
//!
//! Converts between the raw item lists carried on outputs and
//! [`NameCovenant`]. Decoding enforces item counts, item sizes, name
//! syntax and that every raw name hashes to the name hash it travels with.
//! Heights are u32 little-endian.

use crate::config::{MAX_NAME_SIZE, MAX_RESOURCE_SIZE};
use crate::core::address::{Address, MAX_ADDRESS_HASH, MAX_ADDRESS_VERSION, MIN_ADDRESS_HASH};
use crate::core::encoding::read_u32;
use crate::crypto::{sha256, Hash};
use thiserror::Error;

use super::types::{Covenant, CovenantType};

/// Name hashes are plain digests
pub type NameHash = Hash;

/// Maps a raw name to its 32-byte name hash
pub trait NameHasher: Send + Sync {
    fn hash_name(&self, name: &[u8]) -> NameHash;
}

/// SHA-256 of the raw name bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256NameHasher;

impl NameHasher for Sha256NameHasher {
    fn hash_name(&self, name: &[u8]) -> NameHash {
        sha256(name)
    }
}

/// Structural covenant errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CovenantError {
    #[error("Unknown covenant type {0}")]
    UnknownType(u8),
    #[error("{kind} expects {expected} items, found {found}")]
    ItemCount {
        kind: CovenantType,
        expected: usize,
        found: usize,
    },
    #[error("{kind} item {index} has invalid size {size}")]
    ItemSize {
        kind: CovenantType,
        index: usize,
        size: usize,
    },
    #[error("Invalid name")]
    InvalidName,
    #[error("Name does not hash to {0}")]
    NameHashMismatch(NameHash),
    #[error("Reserved field must be zero")]
    NonZeroReserved,
    #[error("Invalid transfer address")]
    InvalidAddress,
}

/// A name may be 1 to 63 bytes of `a-z`, `0-9`, `-` and `_`, and may not
/// start or end with `-` or `_`
pub fn verify_name(name: &[u8]) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_SIZE {
        return false;
    }

    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(&name[0]) || !edge_ok(&name[name.len() - 1]) {
        return false;
    }

    name.iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'_')
}

/// Typed form of a name covenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameCovenant {
    Open {
        name_hash: NameHash,
        name: Vec<u8>,
    },
    Bid {
        name_hash: NameHash,
        height: u32,
        name: Vec<u8>,
        blind: Hash,
    },
    Reveal {
        name_hash: NameHash,
        height: u32,
        nonce: Hash,
    },
    Redeem {
        name_hash: NameHash,
        height: u32,
    },
    Register {
        name_hash: NameHash,
        height: u32,
        data: Vec<u8>,
        block_hash: Hash,
    },
    Update {
        name_hash: NameHash,
        height: u32,
        data: Vec<u8>,
    },
    Renew {
        name_hash: NameHash,
        height: u32,
        block_hash: Hash,
    },
    Transfer {
        name_hash: NameHash,
        height: u32,
        address: Address,
    },
    Finalize {
        name_hash: NameHash,
        height: u32,
        name: Vec<u8>,
        renewals: u32,
        block_hash: Hash,
    },
    Revoke {
        name_hash: NameHash,
        height: u32,
    },
}

struct Items<'a> {
    kind: CovenantType,
    items: &'a [Vec<u8>],
}

impl<'a> Items<'a> {
    fn new(covenant: &'a Covenant, expected: usize) -> Result<Self, CovenantError> {
        if covenant.items.len() != expected {
            return Err(CovenantError::ItemCount {
                kind: covenant.kind,
                expected,
                found: covenant.items.len(),
            });
        }
        Ok(Self {
            kind: covenant.kind,
            items: &covenant.items,
        })
    }

    fn size_error(&self, index: usize) -> CovenantError {
        CovenantError::ItemSize {
            kind: self.kind,
            index,
            size: self.items[index].len(),
        }
    }

    fn hash(&self, index: usize) -> Result<Hash, CovenantError> {
        Hash::from_slice(&self.items[index]).ok_or_else(|| self.size_error(index))
    }

    fn u32(&self, index: usize) -> Result<u32, CovenantError> {
        read_u32(&self.items[index]).ok_or_else(|| self.size_error(index))
    }

    fn u8(&self, index: usize) -> Result<u8, CovenantError> {
        match self.items[index].as_slice() {
            [byte] => Ok(*byte),
            _ => Err(self.size_error(index)),
        }
    }

    fn bytes(&self, index: usize, max: usize) -> Result<Vec<u8>, CovenantError> {
        let item = &self.items[index];
        if item.len() > max {
            return Err(self.size_error(index));
        }
        Ok(item.clone())
    }

    fn name(
        &self,
        index: usize,
        name_hash: &NameHash,
        hasher: &dyn NameHasher,
    ) -> Result<Vec<u8>, CovenantError> {
        let name = &self.items[index];
        if !verify_name(name) {
            return Err(CovenantError::InvalidName);
        }
        if hasher.hash_name(name) != *name_hash {
            return Err(CovenantError::NameHashMismatch(*name_hash));
        }
        Ok(name.clone())
    }
}

impl NameCovenant {
    /// Decode a covenant; NONE decodes to `Ok(None)`
    pub fn decode(
        covenant: &Covenant,
        hasher: &dyn NameHasher,
    ) -> Result<Option<Self>, CovenantError> {
        let decoded = match covenant.kind {
            CovenantType::None => {
                if !covenant.items.is_empty() {
                    return Err(CovenantError::ItemCount {
                        kind: CovenantType::None,
                        expected: 0,
                        found: covenant.items.len(),
                    });
                }
                return Ok(None);
            }
            CovenantType::Open => {
                let items = Items::new(covenant, 3)?;
                let name_hash = items.hash(0)?;
                if items.u32(1)? != 0 {
                    return Err(CovenantError::NonZeroReserved);
                }
                NameCovenant::Open {
                    name_hash,
                    name: items.name(2, &name_hash, hasher)?,
                }
            }
            CovenantType::Bid => {
                let items = Items::new(covenant, 4)?;
                let name_hash = items.hash(0)?;
                NameCovenant::Bid {
                    name_hash,
                    height: items.u32(1)?,
                    name: items.name(2, &name_hash, hasher)?,
                    blind: items.hash(3)?,
                }
            }
            CovenantType::Reveal => {
                let items = Items::new(covenant, 3)?;
                NameCovenant::Reveal {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                    nonce: items.hash(2)?,
                }
            }
            CovenantType::Redeem => {
                let items = Items::new(covenant, 2)?;
                NameCovenant::Redeem {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                }
            }
            CovenantType::Register => {
                let items = Items::new(covenant, 4)?;
                NameCovenant::Register {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                    data: items.bytes(2, MAX_RESOURCE_SIZE)?,
                    block_hash: items.hash(3)?,
                }
            }
            CovenantType::Update => {
                let items = Items::new(covenant, 3)?;
                NameCovenant::Update {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                    data: items.bytes(2, MAX_RESOURCE_SIZE)?,
                }
            }
            CovenantType::Renew => {
                let items = Items::new(covenant, 3)?;
                NameCovenant::Renew {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                    block_hash: items.hash(2)?,
                }
            }
            CovenantType::Transfer => {
                let items = Items::new(covenant, 4)?;
                let version = items.u8(2)?;
                let hash = items.bytes(3, MAX_ADDRESS_HASH)?;
                if version > MAX_ADDRESS_VERSION || hash.len() < MIN_ADDRESS_HASH {
                    return Err(CovenantError::InvalidAddress);
                }
                NameCovenant::Transfer {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                    address: Address::new(version, hash),
                }
            }
            CovenantType::Finalize => {
                let items = Items::new(covenant, 6)?;
                let name_hash = items.hash(0)?;
                let height = items.u32(1)?;
                let name = items.name(2, &name_hash, hasher)?;
                if items.u8(3)? != 0 {
                    return Err(CovenantError::NonZeroReserved);
                }
                NameCovenant::Finalize {
                    name_hash,
                    height,
                    name,
                    renewals: items.u32(4)?,
                    block_hash: items.hash(5)?,
                }
            }
            CovenantType::Revoke => {
                let items = Items::new(covenant, 2)?;
                NameCovenant::Revoke {
                    name_hash: items.hash(0)?,
                    height: items.u32(1)?,
                }
            }
        };
        Ok(Some(decoded))
    }

    /// Encode back into the raw item form
    pub fn encode(&self) -> Covenant {
        let h = |hash: &Hash| hash.as_bytes().to_vec();
        let n = |height: &u32| height.to_le_bytes().to_vec();

        let items = match self {
            NameCovenant::Open { name_hash, name } => {
                vec![h(name_hash), 0u32.to_le_bytes().to_vec(), name.clone()]
            }
            NameCovenant::Bid {
                name_hash,
                height,
                name,
                blind,
            } => vec![h(name_hash), n(height), name.clone(), h(blind)],
            NameCovenant::Reveal {
                name_hash,
                height,
                nonce,
            } => vec![h(name_hash), n(height), h(nonce)],
            NameCovenant::Redeem { name_hash, height } => vec![h(name_hash), n(height)],
            NameCovenant::Register {
                name_hash,
                height,
                data,
                block_hash,
            } => vec![h(name_hash), n(height), data.clone(), h(block_hash)],
            NameCovenant::Update {
                name_hash,
                height,
                data,
            } => vec![h(name_hash), n(height), data.clone()],
            NameCovenant::Renew {
                name_hash,
                height,
                block_hash,
            } => vec![h(name_hash), n(height), h(block_hash)],
            NameCovenant::Transfer {
                name_hash,
                height,
                address,
            } => vec![
                h(name_hash),
                n(height),
                vec![address.version],
                address.hash.clone(),
            ],
            NameCovenant::Finalize {
                name_hash,
                height,
                name,
                renewals,
                block_hash,
            } => vec![
                h(name_hash),
                n(height),
                name.clone(),
                vec![0u8],
                renewals.to_le_bytes().to_vec(),
                h(block_hash),
            ],
            NameCovenant::Revoke { name_hash, height } => vec![h(name_hash), n(height)],
        };

        Covenant::new(self.kind(), items)
    }

    pub fn kind(&self) -> CovenantType {
        match self {
            NameCovenant::Open { .. } => CovenantType::Open,
            NameCovenant::Bid { .. } => CovenantType::Bid,
            NameCovenant::Reveal { .. } => CovenantType::Reveal,
            NameCovenant::Redeem { .. } => CovenantType::Redeem,
            NameCovenant::Register { .. } => CovenantType::Register,
            NameCovenant::Update { .. } => CovenantType::Update,
            NameCovenant::Renew { .. } => CovenantType::Renew,
            NameCovenant::Transfer { .. } => CovenantType::Transfer,
            NameCovenant::Finalize { .. } => CovenantType::Finalize,
            NameCovenant::Revoke { .. } => CovenantType::Revoke,
        }
    }

    pub fn name_hash(&self) -> &NameHash {
        match self {
            NameCovenant::Open { name_hash, .. }
            | NameCovenant::Bid { name_hash, .. }
            | NameCovenant::Reveal { name_hash, .. }
            | NameCovenant::Redeem { name_hash, .. }
            | NameCovenant::Register { name_hash, .. }
            | NameCovenant::Update { name_hash, .. }
            | NameCovenant::Renew { name_hash, .. }
            | NameCovenant::Transfer { name_hash, .. }
            | NameCovenant::Finalize { name_hash, .. }
            | NameCovenant::Revoke { name_hash, .. } => name_hash,
        }
    }

    /// Auction height the covenant refers to; OPEN has none
    pub fn height(&self) -> Option<u32> {
        match self {
            NameCovenant::Open { .. } => None,
            NameCovenant::Bid { height, .. }
            | NameCovenant::Reveal { height, .. }
            | NameCovenant::Redeem { height, .. }
            | NameCovenant::Register { height, .. }
            | NameCovenant::Update { height, .. }
            | NameCovenant::Renew { height, .. }
            | NameCovenant::Transfer { height, .. }
            | NameCovenant::Finalize { height, .. }
            | NameCovenant::Revoke { height, .. } => Some(*height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Sha256NameHasher {
        Sha256NameHasher
    }

    #[test]
    fn test_name_syntax() {
        assert!(verify_name(b"example"));
        assert!(verify_name(b"a-b_c9"));
        assert!(verify_name(&[b'a'; 63]));
        assert!(!verify_name(&[b'a'; 64]));
        assert!(!verify_name(b""));
        assert!(!verify_name(b"-lead"));
        assert!(!verify_name(b"trail_"));
        assert!(!verify_name(b"Upper"));
        assert!(!verify_name(b"dot.com"));
    }

    #[test]
    fn test_open_decodes() {
        let name = b"example".to_vec();
        let name_hash = hasher().hash_name(&name);
        let covenant = NameCovenant::Open {
            name_hash,
            name: name.clone(),
        }
        .encode();

        assert_eq!(covenant.items[1], vec![0, 0, 0, 0]);
        let decoded = NameCovenant::decode(&covenant, &hasher()).unwrap().unwrap();
        assert_eq!(decoded, NameCovenant::Open { name_hash, name });
        assert_eq!(decoded.height(), None);
    }

    #[test]
    fn test_open_reserved_field_must_be_zero() {
        let name = b"example".to_vec();
        let name_hash = hasher().hash_name(&name);
        let covenant = Covenant::new(
            CovenantType::Open,
            vec![name_hash.as_bytes().to_vec(), vec![1, 0, 0, 0], name],
        );
        assert_eq!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::NonZeroReserved)
        );
    }

    #[test]
    fn test_name_must_match_hash() {
        let covenant = Covenant::new(
            CovenantType::Open,
            vec![sha256(b"other").as_bytes().to_vec(), vec![0; 4], b"example".to_vec()],
        );
        assert!(matches!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::NameHashMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_item_count() {
        let covenant = Covenant::new(CovenantType::Redeem, vec![vec![0; 32]]);
        assert!(matches!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::ItemCount {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_resource() {
        let covenant = Covenant::new(
            CovenantType::Update,
            vec![vec![0; 32], vec![0; 4], vec![0; MAX_RESOURCE_SIZE + 1]],
        );
        assert!(matches!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::ItemSize { index: 2, .. })
        ));
    }

    #[test]
    fn test_short_height_item() {
        let covenant = Covenant::new(CovenantType::Revoke, vec![vec![0; 32], vec![0; 3]]);
        assert!(matches!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::ItemSize { index: 1, .. })
        ));
    }

    #[test]
    fn test_none_must_be_empty() {
        assert_eq!(NameCovenant::decode(&Covenant::none(), &hasher()), Ok(None));
        let covenant = Covenant::new(CovenantType::None, vec![vec![1]]);
        assert!(NameCovenant::decode(&covenant, &hasher()).is_err());
    }

    #[test]
    fn test_transfer_address_bounds() {
        let covenant = Covenant::new(
            CovenantType::Transfer,
            vec![vec![0; 32], vec![0; 4], vec![0], vec![7; 1]],
        );
        assert_eq!(
            NameCovenant::decode(&covenant, &hasher()),
            Err(CovenantError::InvalidAddress)
        );
    }

    #[test]
    fn test_finalize_layout() {
        let name = b"example".to_vec();
        let name_hash = hasher().hash_name(&name);
        let finalize = NameCovenant::Finalize {
            name_hash,
            height: 7,
            name,
            renewals: 3,
            block_hash: sha256(b"block"),
        };
        let covenant = finalize.encode();
        assert_eq!(covenant.items.len(), 6);
        assert_eq!(covenant.items[3], vec![0]);
        assert_eq!(covenant.items[4], vec![3, 0, 0, 0]);
        assert_eq!(
            NameCovenant::decode(&covenant, &hasher()).unwrap(),
            Some(finalize)
        );
    }
}
