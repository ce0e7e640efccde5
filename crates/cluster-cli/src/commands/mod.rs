//! Subcommand implementations, one module per noun.

pub mod member;
pub mod rebuild;
