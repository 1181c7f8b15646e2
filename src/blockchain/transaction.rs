use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::crypto::{Address, CryptoContext, CryptoError, DigitalSignature, TransactionSigner};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Signer {signer} does not control source address {from}")]
    Authorization { signer: Address, from: Address },

    #[error("Reward transactions have no source address and cannot be signed")]
    MissingSource,

    #[error("No signature in this transaction")]
    Unsigned,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Who a transaction moves value between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// A signed transfer out of `from`
    Transfer { from: Address, to: Address },

    /// A mining reward minted by the chain itself
    Reward { to: Address },
}

/// Represents a transaction in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) kind: TransactionKind,

    /// Amount being transferred
    pub(crate) amount: f64,

    /// Creation time in milliseconds since the Unix epoch
    pub(crate) timestamp: i64,

    /// SHA-256 of the transaction contents, in hex
    pub(crate) hash: String,

    /// DER signature over `hash`, present once signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer
    ///
    /// # Arguments
    ///
    /// * `from` - The address of the sender
    /// * `to` - The address of the recipient
    /// * `amount` - The amount to transfer
    pub fn new(from: Address, to: Address, amount: f64) -> Self {
        Self::with_kind(TransactionKind::Transfer { from, to }, amount)
    }

    /// Creates a new reward transaction (mining reward)
    ///
    /// # Arguments
    ///
    /// * `to` - The address of the miner
    /// * `amount` - The reward amount
    pub fn new_reward(to: Address, amount: f64) -> Self {
        Self::with_kind(TransactionKind::Reward { to }, amount)
    }

    fn with_kind(kind: TransactionKind, amount: f64) -> Self {
        let mut transaction = Transaction {
            kind,
            amount,
            timestamp: Utc::now().timestamp_millis(),
            hash: String::new(),
            signature: None,
        };
        transaction.hash = transaction.calculate_hash();
        transaction
    }

    /// Signs the transaction on behalf of its source address
    ///
    /// # Arguments
    ///
    /// * `ctx` - The crypto context to sign with
    /// * `signer` - Holder of the private key for `from`
    pub fn sign<S>(&mut self, ctx: &CryptoContext, signer: &S) -> Result<(), TransactionError>
    where
        S: TransactionSigner + ?Sized,
    {
        let from = match &self.kind {
            TransactionKind::Transfer { from, .. } => from,
            TransactionKind::Reward { .. } => return Err(TransactionError::MissingSource),
        };

        if signer.address() != from {
            return Err(TransactionError::Authorization {
                signer: signer.address().clone(),
                from: from.clone(),
            });
        }

        let digest = self.digest();
        self.signature = Some(signer.sign_digest(ctx, &digest)?);

        Ok(())
    }

    /// Checks the transaction's signature
    ///
    /// Rewards are always valid. Transfers must carry a signature that
    /// verifies against the public key in `from` over the current contents,
    /// and the stored hash must match those contents.
    pub fn is_valid(&self, ctx: &CryptoContext) -> Result<bool, TransactionError> {
        let from = match &self.kind {
            TransactionKind::Reward { .. } => return Ok(true),
            TransactionKind::Transfer { from, .. } => from,
        };

        let signature = match &self.signature {
            Some(signature) if !signature.is_empty() => signature,
            _ => return Err(TransactionError::Unsigned),
        };

        let digest = self.digest();
        if self.hash != hex::encode(digest) {
            warn!("Transaction {} does not match its contents", self.hash);
            return Ok(false);
        }

        match ctx.verify_digest(&digest, signature, from) {
            Ok(valid) => Ok(valid),
            Err(err) => {
                warn!("Transaction {} cannot be verified: {}", self.hash, err);
                Ok(false)
            }
        }
    }

    /// Recomputes the content hash from the current fields
    pub fn calculate_hash(&self) -> String {
        hex::encode(self.digest())
    }

    fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        self.update_contents(&mut hasher);
        hasher.finalize().into()
    }

    /// Feeds from, to, amount and timestamp into a hasher
    fn update_contents(&self, hasher: &mut Sha256) {
        match self.from() {
            Some(from) => {
                hasher.update([1u8]);
                update_field(hasher, from.0.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        update_field(hasher, self.to().0.as_bytes());
        update_field(hasher, self.amount.to_string().as_bytes());
        update_field(hasher, self.timestamp.to_string().as_bytes());
    }

    /// Feeds every field, including the stored hash and signature, into a
    /// block hasher
    pub(crate) fn update_block_hasher(&self, hasher: &mut Sha256) {
        self.update_contents(hasher);
        update_field(hasher, self.hash.as_bytes());
        match &self.signature {
            Some(signature) => {
                hasher.update([1u8]);
                update_field(hasher, signature.0.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    /// The source address, `None` for rewards
    pub fn from(&self) -> Option<&Address> {
        match &self.kind {
            TransactionKind::Transfer { from, .. } => Some(from),
            TransactionKind::Reward { .. } => None,
        }
    }

    pub fn to(&self) -> &Address {
        match &self.kind {
            TransactionKind::Transfer { to, .. } | TransactionKind::Reward { to } => to,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> Option<&DigitalSignature> {
        self.signature.as_ref()
    }

    pub fn is_reward(&self) -> bool {
        matches!(self.kind, TransactionKind::Reward { .. })
    }

    /// True when `address` is the source or the recipient
    pub fn involves(&self, address: &Address) -> bool {
        self.from() == Some(address) || self.to() == address
    }
}

/// Length-prefixed write so adjacent fields cannot run into each other
pub(crate) fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
