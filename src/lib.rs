//! An educational proof-of-work ledger.
//!
//! Transactions are signed with secp256k1 keys, collected into blocks, mined
//! against a leading-zero difficulty target and chained by SHA-256 hashes.

pub mod blockchain;
pub mod config;

pub use config::{ChainConfig, ConfigError};
