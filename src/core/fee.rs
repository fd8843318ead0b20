//! Fee policy
//!
//! Fee rates are expressed in base units per 1000 bytes of serialized
//! transaction. The mempool uses them for the relay minimum, the absurd-fee
//! ceiling and eviction ordering.

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// A fee larger than this multiple of the minimum fee is absurd
pub const ABSURD_FEE_FACTOR: u64 = 10_000;

// =============================================================================
// Fee Rate
// =============================================================================

/// Fee rate in base units per 1000 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl FeeRate {
    pub fn per_kb(rate: u64) -> Self {
        Self(rate)
    }

    /// Create from total fee and transaction size
    pub fn from_fee_and_size(fee: u64, size_bytes: usize) -> Self {
        if size_bytes == 0 {
            Self(0)
        } else {
            Self(fee.saturating_mul(1000) / size_bytes as u64)
        }
    }

    /// Calculate fee for a given size; a non-zero rate never rounds to zero
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        let fee = self.0.saturating_mul(size_bytes as u64) / 1000;
        if fee == 0 && self.0 > 0 {
            self.0
        } else {
            fee
        }
    }

    /// Largest acceptable fee for a transaction of this size
    pub fn absurd_threshold(&self, size_bytes: usize) -> u64 {
        self.fee_for_size(size_bytes).saturating_mul(ABSURD_FEE_FACTOR)
    }

    pub fn as_per_kb(&self) -> u64 {
        self.0
    }
}
