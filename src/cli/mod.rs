//! Command-line front end for `namechaind`

pub mod commands;

pub use commands::*;
