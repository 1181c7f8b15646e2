// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block structure and proof of work
// - Blockchain structure
// - Transaction structure
// - Cryptography utilities

pub mod block;
pub mod chain;
pub mod crypto;
pub mod mining;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use crypto::{Address, CryptoContext, CryptoError, DigitalSignature, TransactionSigner, Wallet};
pub use mining::{MiningControl, MiningError};
pub use transaction::{Transaction, TransactionError, TransactionKind};
