use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Shared secp256k1 context used for key derivation, signing and verification.
///
/// Build one per process (or per test) and hand it to whatever needs it.
#[derive(Clone)]
pub struct CryptoContext {
    secp: Secp256k1<All>,
}

impl CryptoContext {
    pub fn new() -> Self {
        CryptoContext {
            secp: Secp256k1::new(),
        }
    }

    /// Derives the public key belonging to a secret key
    pub fn public_key(&self, secret_key: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, secret_key)
    }

    /// Signs a 32-byte digest and returns the DER-encoded signature as hex
    pub fn sign_digest(&self, secret_key: &SecretKey, digest: &[u8; 32]) -> DigitalSignature {
        let message = Message::from_digest(*digest);
        let signature = self.secp.sign_ecdsa(&message, secret_key);
        DigitalSignature::from_signature(&signature)
    }

    /// Verifies a signature over a digest against the key encoded in `address`
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the signature does not match, an error when the
    /// address or signature cannot be decoded at all
    pub fn verify_digest(
        &self,
        digest: &[u8; 32],
        signature: &DigitalSignature,
        address: &Address,
    ) -> Result<bool, CryptoError> {
        let public_key = address.to_public_key()?;
        let signature = signature.to_signature()?;
        let message = Message::from_digest(*digest);

        Ok(self
            .secp
            .verify_ecdsa(&message, &signature, &public_key)
            .is_ok())
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CryptoContext(secp256k1)")
    }
}

/// Represents a wallet address (uncompressed public key in hex format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(hex::encode(public_key.serialize_uncompressed()))
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        PublicKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address(s.to_string());
        address.to_public_key()?;
        Ok(address)
    }
}

/// Represents a digital signature (DER encoding in hex format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        let der = signature.serialize_der();
        DigitalSignature(hex::encode(&*der))
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Signature::from_der(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Anything able to sign transaction digests on behalf of an address
pub trait TransactionSigner {
    /// The address this signer controls
    fn address(&self) -> &Address;

    /// Signs a transaction digest
    fn sign_digest(
        &self,
        ctx: &CryptoContext,
        digest: &[u8; 32],
    ) -> Result<DigitalSignature, CryptoError>;
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn generate(ctx: &CryptoContext) -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(ctx, secret_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(ctx: &CryptoContext, secret_key: SecretKey) -> Self {
        let public_key = ctx.public_key(&secret_key);
        let address = Address::from_public_key(&public_key);

        Wallet {
            secret_key,
            public_key,
            address,
        }
    }

    /// Creates a wallet from a hex encoded secret key
    pub fn from_secret_hex(ctx: &CryptoContext, secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(secret_hex).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::from_secret_key(ctx, secret_key))
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        self.address.0.clone()
    }

    /// Exports the wallet's secret key as hex
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl TransactionSigner for Wallet {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sign_digest(
        &self,
        ctx: &CryptoContext,
        digest: &[u8; 32],
    ) -> Result<DigitalSignature, CryptoError> {
        Ok(ctx.sign_digest(&self.secret_key, digest))
    }
}
