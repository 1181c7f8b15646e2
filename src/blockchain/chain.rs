use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::block::Block;
use super::crypto::{Address, CryptoContext};
use super::mining::{MiningControl, MiningError};
use super::transaction::{Transaction, TransactionError};
use crate::config::ChainConfig;

/// Genesis timestamp: 1999-07-07T00:00:00Z in milliseconds
const GENESIS_TIMESTAMP: i64 = 931_305_600_000;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Invalid transaction signature")]
    InvalidSignature,

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Invalid transaction amount: {0}")]
    InvalidAmount(f64),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },
}

/// Blocks and pending pool live behind one lock so readers always see both
/// in step
#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

impl ChainState {
    fn balance_of(&self, address: &Address) -> f64 {
        let mut balance = 0.0;

        for block in &self.blocks {
            for transaction in &block.transactions {
                if transaction.from() == Some(address) {
                    balance -= transaction.amount();
                }
                if transaction.to() == address {
                    balance += transaction.amount();
                }
            }
        }

        balance
    }
}

/// Represents the blockchain
///
/// Clones share the same underlying chain.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks and the transactions waiting for the next block
    state: Arc<Mutex<ChainState>>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: usize,

    /// Mining reward
    mining_reward: f64,

    /// Context used to verify incoming transactions
    crypto: CryptoContext,
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block and default parameters
    pub fn new(crypto: CryptoContext) -> Self {
        Self::with_config(ChainConfig::default(), crypto)
    }

    /// Creates a new blockchain with a genesis block
    ///
    /// # Arguments
    ///
    /// * `config` - Difficulty and mining reward
    /// * `crypto` - Context used to verify transaction signatures
    pub fn with_config(config: ChainConfig, crypto: CryptoContext) -> Self {
        let state = ChainState {
            blocks: vec![Self::create_genesis_block()],
            pending_transactions: Vec::new(),
        };

        Blockchain {
            state: Arc::new(Mutex::new(state)),
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
            crypto,
        }
    }

    /// Creates the genesis block (first block in the chain)
    ///
    /// Always returns the same block; chain validation compares the stored
    /// genesis against it.
    pub fn create_genesis_block() -> Block {
        Block::new(0, GENESIS_TIMESTAMP, Vec::new(), "0".to_string())
    }

    fn lock_state(&self) -> MutexGuard<'_, ChainState> {
        // Mutations are single pushes and clears, so a poisoned state is
        // still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the last block in the chain
    pub fn latest_block(&self) -> Block {
        self.lock_state()
            .blocks
            .last()
            .cloned()
            .unwrap_or_else(Self::create_genesis_block)
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// The balance check only looks at mined blocks. Several pending
    /// transactions from one sender can together spend more than the
    /// sender owns.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), BlockchainError> {
        if !transaction.is_valid(&self.crypto)? {
            warn!("Rejected transaction {}: bad signature", transaction.hash());
            return Err(BlockchainError::InvalidSignature);
        }

        let from = match transaction.from() {
            Some(from) if !from.is_empty() => from,
            _ => {
                return Err(BlockchainError::MalformedTransaction(
                    "missing source address".to_string(),
                ))
            }
        };
        if transaction.to().is_empty() {
            return Err(BlockchainError::MalformedTransaction(
                "missing recipient address".to_string(),
            ));
        }

        let amount = transaction.amount();
        if amount.is_nan() || amount <= 0.0 {
            return Err(BlockchainError::InvalidAmount(amount));
        }

        let mut state = self.lock_state();

        let available = state.balance_of(from);
        if available < amount {
            warn!(
                "Rejected transaction {}: balance {} below {}",
                transaction.hash(),
                available,
                amount
            );
            return Err(BlockchainError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        debug!("Transaction added: {}", transaction.hash());
        state.pending_transactions.push(transaction);

        Ok(())
    }

    /// Mines the pending transactions plus a reward into a new block
    ///
    /// Blocks until a nonce is found; see [`Blockchain::mine_pending_transactions_with`]
    /// for a search that can be stopped.
    ///
    /// The chain lock is held for the whole nonce search, so every other
    /// call on this chain or its clones, reads included, waits until the
    /// block is appended.
    pub fn mine_pending_transactions(&self, reward_address: &Address) -> Block {
        let mut state = self.lock_state();

        let mut block = self.next_block(&state, reward_address);
        block.mine(self.difficulty);

        Self::append(&mut state, block)
    }

    /// Mines like [`Blockchain::mine_pending_transactions`] under `control`
    ///
    /// If the search is aborted or exhausted, neither the chain nor the
    /// pending pool changes. The chain lock is held until the search ends.
    pub fn mine_pending_transactions_with(
        &self,
        reward_address: &Address,
        control: &MiningControl,
    ) -> Result<Block, MiningError> {
        let mut state = self.lock_state();

        let mut block = self.next_block(&state, reward_address);
        if let Err(err) = block.mine_with(self.difficulty, control) {
            warn!("Mining stopped: {}", err);
            return Err(err);
        }

        Ok(Self::append(&mut state, block))
    }

    fn next_block(&self, state: &ChainState, reward_address: &Address) -> Block {
        let mut transactions = state.pending_transactions.clone();
        transactions.push(Transaction::new_reward(
            reward_address.clone(),
            self.mining_reward,
        ));

        let previous_hash = state
            .blocks
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_else(|| "0".to_string());

        Block::new(
            state.blocks.len() as u64,
            Utc::now().timestamp_millis(),
            transactions,
            previous_hash,
        )
    }

    fn append(state: &mut ChainState, block: Block) -> Block {
        info!(
            "Block {} successfully mined with nonce {}: {}",
            block.index, block.nonce, block.hash
        );

        state.blocks.push(block.clone());
        state.pending_transactions.clear();

        block
    }

    /// Replays the whole chain to compute the balance of `address`
    pub fn get_balance_of_address(&self, address: &Address) -> f64 {
        let balance = self.lock_state().balance_of(address);
        debug!("Balance of {}: {}", address, balance);
        balance
    }

    /// Every mined transaction sent from or to `address`, in chain order
    pub fn get_all_transactions_for_wallet(&self, address: &Address) -> Vec<Transaction> {
        let state = self.lock_state();

        let transactions: Vec<Transaction> = state
            .blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|transaction| transaction.involves(address))
            .cloned()
            .collect();

        debug!(
            "Transaction count for wallet {}: {}",
            address,
            transactions.len()
        );
        transactions
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the genesis block is untouched and every later block hashes
    /// to its stored hash and links to its predecessor, false otherwise
    pub fn is_valid(&self) -> bool {
        let state = self.lock_state();

        match state.blocks.first() {
            Some(genesis) if *genesis == Self::create_genesis_block() => {}
            _ => return false,
        }

        state.blocks.windows(2).all(|pair| {
            let (previous_block, current_block) = (&pair[0], &pair[1]);

            current_block.hash == current_block.calculate_hash()
                && current_block.previous_hash == previous_block.hash
        })
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.lock_state().blocks.clone()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.lock_state().pending_transactions.clone()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    use std::thread;
    use std::time::Duration;

    fn funded_chain() -> (Blockchain, Wallet, Wallet) {
        let blockchain = Blockchain::new(CryptoContext::new());
        let sender = Wallet::generate(blockchain.crypto());
        let recipient = Wallet::generate(blockchain.crypto());

        blockchain.mine_pending_transactions(sender.address());

        (blockchain, sender, recipient)
    }

    fn signed(blockchain: &Blockchain, from: &Wallet, to: &Wallet, amount: f64) -> Transaction {
        let mut transaction = Transaction::new(from.address().clone(), to.address().clone(), amount);
        transaction.sign(blockchain.crypto(), from).unwrap();
        transaction
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new(CryptoContext::new());
        let chain = blockchain.get_chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], Blockchain::create_genesis_block());
        assert_eq!(chain[0].previous_hash, "0");
        assert_eq!(blockchain.latest_block(), chain[0]);
        assert_eq!(blockchain.difficulty(), 2);
        assert_eq!(blockchain.mining_reward(), 100.0);
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_genesis_is_reproducible() {
        assert_eq!(
            Blockchain::create_genesis_block(),
            Blockchain::create_genesis_block()
        );
        assert_eq!(
            Blockchain::create_genesis_block().hash,
            Blockchain::create_genesis_block().calculate_hash()
        );
    }

    #[test]
    fn test_add_transaction() {
        let (blockchain, sender, recipient) = funded_chain();

        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 10.0))
            .unwrap();

        assert_eq!(blockchain.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_add_unsigned_transaction() {
        let (blockchain, sender, recipient) = funded_chain();
        let transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 10.0);

        assert!(matches!(
            blockchain.add_transaction(transaction),
            Err(BlockchainError::Transaction(TransactionError::Unsigned))
        ));
    }

    #[test]
    fn test_add_tampered_transaction() {
        let (blockchain, sender, recipient) = funded_chain();
        let mut transaction = signed(&blockchain, &sender, &recipient, 10.0);
        transaction.amount = 90.0;

        assert!(matches!(
            blockchain.add_transaction(transaction),
            Err(BlockchainError::InvalidSignature)
        ));
        assert!(blockchain.get_pending_transactions().is_empty());
    }

    #[test]
    fn test_add_reward_transaction() {
        let (blockchain, sender, _) = funded_chain();
        let reward = Transaction::new_reward(sender.address().clone(), 1_000.0);

        assert!(matches!(
            blockchain.add_transaction(reward),
            Err(BlockchainError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_add_transaction_without_recipient() {
        let (blockchain, sender, _) = funded_chain();
        let mut transaction = Transaction::new(sender.address().clone(), Address(String::new()), 5.0);
        transaction.sign(blockchain.crypto(), &sender).unwrap();

        assert!(matches!(
            blockchain.add_transaction(transaction),
            Err(BlockchainError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_add_non_positive_amount() {
        let (blockchain, sender, recipient) = funded_chain();

        for amount in [0.0, -5.0, f64::NAN] {
            let transaction = signed(&blockchain, &sender, &recipient, amount);
            assert!(matches!(
                blockchain.add_transaction(transaction),
                Err(BlockchainError::InvalidAmount(_))
            ));
        }
        assert!(blockchain.get_pending_transactions().is_empty());
    }

    #[test]
    fn test_insufficient_balance() {
        let (blockchain, sender, recipient) = funded_chain();
        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 10.0))
            .unwrap();
        let before = blockchain.get_pending_transactions();

        let err = blockchain
            .add_transaction(signed(&blockchain, &recipient, &sender, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::InsufficientBalance { required, available }
                if required == 1.0 && available == 0.0
        ));

        assert_eq!(blockchain.get_pending_transactions(), before);
    }

    #[test]
    fn test_pending_pool_is_not_counted() {
        // Known limitation: only mined blocks count toward the balance
        let (blockchain, sender, recipient) = funded_chain();

        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 80.0))
            .unwrap();
        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 80.0))
            .unwrap();

        assert_eq!(blockchain.get_pending_transactions().len(), 2);
    }

    #[test]
    fn test_mine_block() {
        let (blockchain, sender, recipient) = funded_chain();
        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 10.0))
            .unwrap();

        let miner = Wallet::generate(blockchain.crypto());
        let block = blockchain.mine_pending_transactions(miner.address());

        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 2); // Original transaction + mining reward
        assert!(block.transactions[1].is_reward());
        assert!(block.hash.starts_with("00"));
        assert_eq!(blockchain.latest_block(), block);

        assert!(blockchain.get_pending_transactions().is_empty());
        assert_eq!(blockchain.get_balance_of_address(recipient.address()), 10.0);
        assert_eq!(blockchain.get_balance_of_address(sender.address()), 90.0);
        assert_eq!(blockchain.get_balance_of_address(miner.address()), 100.0);
    }

    #[test]
    fn test_blockchain_validity() {
        let (blockchain, sender, recipient) = funded_chain();
        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 10.0))
            .unwrap();
        blockchain.mine_pending_transactions(sender.address());

        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_tampered_block_invalidates_chain() {
        let (blockchain, sender, recipient) = funded_chain();
        blockchain
            .add_transaction(signed(&blockchain, &sender, &recipient, 10.0))
            .unwrap();
        blockchain.mine_pending_transactions(sender.address());

        blockchain.lock_state().blocks[2].transactions[0].amount = 1.0;

        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_broken_link_invalidates_chain() {
        let (blockchain, sender, _) = funded_chain();
        blockchain.mine_pending_transactions(sender.address());

        {
            let mut state = blockchain.lock_state();
            let block = &mut state.blocks[2];
            block.previous_hash = "f".repeat(64);
            block.hash = block.calculate_hash();
            block.mine(blockchain.difficulty());
            assert_eq!(block.hash, block.calculate_hash());
        }

        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_removed_block_invalidates_chain() {
        let (blockchain, sender, _) = funded_chain();
        blockchain.mine_pending_transactions(sender.address());

        blockchain.lock_state().blocks.remove(1);

        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_replaced_genesis_invalidates_chain() {
        let blockchain = Blockchain::new(CryptoContext::new());

        blockchain.lock_state().blocks[0] =
            Block::new(0, GENESIS_TIMESTAMP + 1, Vec::new(), "0".to_string());

        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_wallet_history() {
        let (blockchain, sender, recipient) = funded_chain();

        let first = signed(&blockchain, &sender, &recipient, 5.0);
        blockchain.add_transaction(first.clone()).unwrap();
        blockchain.mine_pending_transactions(recipient.address());

        let history = blockchain.get_all_transactions_for_wallet(recipient.address());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], first);
        assert!(history[1].is_reward());

        let stranger = Wallet::generate(blockchain.crypto());
        assert!(blockchain
            .get_all_transactions_for_wallet(stranger.address())
            .is_empty());
    }

    #[test]
    fn test_bounded_mining_leaves_chain_untouched() {
        let config = ChainConfig {
            difficulty: 64,
            ..ChainConfig::default()
        };
        let blockchain = Blockchain::with_config(config, CryptoContext::new());
        let miner = Wallet::generate(blockchain.crypto());

        let control = MiningControl::new().with_max_attempts(10);
        let err = blockchain
            .mine_pending_transactions_with(miner.address(), &control)
            .unwrap_err();

        assert_eq!(err, MiningError::Exhausted { attempts: 10 });
        assert_eq!(blockchain.get_chain().len(), 1);
        assert!(blockchain.get_pending_transactions().is_empty());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_cancel_mining_from_another_thread() {
        let config = ChainConfig {
            difficulty: 64,
            ..ChainConfig::default()
        };
        let blockchain = Blockchain::with_config(config, CryptoContext::new());
        let miner = Wallet::generate(blockchain.crypto());
        let control = MiningControl::new();

        let worker = {
            let blockchain = blockchain.clone();
            let control = control.clone();
            let address = miner.address().clone();
            thread::spawn(move || blockchain.mine_pending_transactions_with(&address, &control))
        };

        thread::sleep(Duration::from_millis(50));
        control.cancel();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(MiningError::Aborted { .. })));
        assert_eq!(blockchain.get_chain().len(), 1);
    }

    #[test]
    fn test_mining_with_control_succeeds() {
        let blockchain = Blockchain::new(CryptoContext::new());
        let miner = Wallet::generate(blockchain.crypto());

        let block = blockchain
            .mine_pending_transactions_with(miner.address(), &MiningControl::new())
            .unwrap();

        assert!(block.meets_difficulty(2));
        assert_eq!(blockchain.get_balance_of_address(miner.address()), 100.0);
        assert!(blockchain.is_valid());
    }
}
