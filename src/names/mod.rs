//! Name auctions and ownership
//!
//! This module provides:
//! - The per-name state record and its auction phases
//! - A staging view over committed name state
//! - The state machine applying name covenants

pub mod machine;
pub mod state;
pub mod view;

pub use machine::{apply_transaction, ChainLookup, NameContext, TransitionError};
pub use state::{AuctionPhase, NameState, TransferLock};
pub use view::{NameChanges, NameView};
