use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::crypto::CryptoContext;
use super::mining::{meets_difficulty, MiningControl, MiningError};
use super::transaction::{update_field, Transaction, TransactionError};

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position hint; never checked by chain validation
    pub index: u64,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the current block (calculated)
    pub hash: String,

    /// Proof of work counter
    pub nonce: u64,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `timestamp` - Creation time in milliseconds
    /// * `transactions` - The list of transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    ///
    /// # Returns
    ///
    /// A new, unmined Block with its hash computed at nonce 0
    pub fn new(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let block = Block {
            index,
            previous_hash,
            timestamp,
            transactions,
            hash: String::new(),
            nonce: 0,
        };

        let hash = block.calculate_hash();

        Block { hash, ..block }
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.index.to_le_bytes());
        update_field(&mut hasher, self.previous_hash.as_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update((self.transactions.len() as u64).to_le_bytes());
        for transaction in &self.transactions {
            transaction.update_block_hasher(&mut hasher);
        }
        hasher.update(self.nonce.to_le_bytes());

        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash has `difficulty` leading zeros
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Searches nonces until the hash meets `difficulty`.
    ///
    /// There is no bound on the search: a difficulty the hash can never
    /// satisfy never returns. Use [`Block::mine_with`] to stop early.
    pub fn mine(&mut self, difficulty: usize) {
        while !self.meets_difficulty(difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.calculate_hash();
        }
    }

    /// Searches nonces like [`Block::mine`], checking `control` before each
    /// attempt.
    ///
    /// On error the block keeps the last nonce tried and is not a valid
    /// solution.
    pub fn mine_with(
        &mut self,
        difficulty: usize,
        control: &MiningControl,
    ) -> Result<(), MiningError> {
        let mut attempts = 0u64;

        while !self.meets_difficulty(difficulty) {
            control.check(attempts)?;
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.calculate_hash();
            attempts += 1;
        }

        Ok(())
    }

    /// Checks the signature of every transaction in the block
    pub fn has_valid_transactions(&self, ctx: &CryptoContext) -> Result<bool, TransactionError> {
        for transaction in &self.transactions {
            if !transaction.is_valid(ctx)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
