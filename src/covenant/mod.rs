//! Output covenants
//!
//! This module provides:
//! - The raw covenant carried on every output
//! - The typed codec with structural validation
//! - Blind commitments, rollout gating and input/output linkage rules

pub mod codec;
pub mod rules;
pub mod types;

pub use codec::{verify_name, CovenantError, NameCovenant, NameHash, NameHasher, Sha256NameHasher};
pub use rules::{blind, has_rollout, is_reserved, rollout_height, verify_links, LinkError};
pub use types::{Covenant, CovenantType};
