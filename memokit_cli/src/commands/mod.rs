//! CLI subcommand implementations.

pub mod cache;
pub mod digest;
pub mod key;
