//! Seal key pairs, challenges and challenge signing
//!
//! Every seal carries its own Ed25519 key pair. The tag proves possession of the
//! private key by signing the seal's current challenge; the service recomputes the
//! expected signature from the custodied copy of the key and compares the two in
//! constant time.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Ed25519 signature (64 bytes)
pub type Signature64 = [u8; SIGNATURE_LENGTH];

/// Ed25519 public key (32 bytes)
pub type PublicKey32 = [u8; PUBLIC_KEY_LENGTH];

/// Ed25519 secret key (32 bytes)
pub type SecretKey32 = [u8; SECRET_KEY_LENGTH];

/// Challenge nonce length in bytes
pub const CHALLENGE_LENGTH: usize = 32;

/// Error type for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("invalid public key format")]
    InvalidPublicKeyFormat,

    #[error("invalid secret key format")]
    InvalidSecretKeyFormat,

    #[error("signature verification failed")]
    VerificationFailed,
}

// ============================================================================
// Seal Signing Key
// ============================================================================

/// Ed25519 key pair bound to a single physical seal
#[derive(Clone)]
pub struct SealSigningKey {
    signing_key: SigningKey,
}

impl SealSigningKey {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore from secret key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SigningError> {
        let secret: &SecretKey32 = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidSecretKeyFormat)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(secret),
        })
    }

    /// Secret key bytes, wiped when the returned buffer is dropped
    pub fn to_secret_bytes(&self) -> Zeroizing<SecretKey32> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Get the public key for this key pair
    pub fn public_key(&self) -> SealVerifyingKey {
        SealVerifyingKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> PublicKey32 {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign an arbitrary message (Ed25519 signatures are deterministic)
    pub fn sign(&self, message: &[u8]) -> Signature64 {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign a seal challenge
    pub fn sign_challenge(&self, challenge: &[u8; CHALLENGE_LENGTH]) -> Signature64 {
        self.sign(challenge)
    }
}

impl std::fmt::Debug for SealSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealSigningKey")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Seal Verifying Key
// ============================================================================

/// Public half of a seal key pair
#[derive(Clone)]
pub struct SealVerifyingKey {
    verifying_key: VerifyingKey,
}

impl SealVerifyingKey {
    /// Create from public key bytes
    pub fn from_bytes(bytes: &PublicKey32) -> Result<Self, SigningError> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|_| SigningError::InvalidPublicKeyFormat)?;
        Ok(Self { verifying_key })
    }

    /// Get the public key bytes
    pub fn to_bytes(&self) -> PublicKey32 {
        self.verifying_key.to_bytes()
    }

    /// Verify a signature over a message
    pub fn verify(&self, message: &[u8], signature: &Signature64) -> Result<(), SigningError> {
        let sig = Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| SigningError::VerificationFailed)
    }
}

impl std::fmt::Debug for SealVerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealVerifyingKey")
            .field("public_key", &hex::encode(self.to_bytes()))
            .finish()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Generate a fresh key pair for a seal
pub fn generate_key_pair() -> SealSigningKey {
    SealSigningKey::generate()
}

/// Generate a fresh challenge nonce from the OS CSPRNG
pub fn generate_challenge_bytes() -> [u8; CHALLENGE_LENGTH] {
    let mut nonce = [0u8; CHALLENGE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Constant-time equality for signatures of possibly different lengths.
///
/// A length mismatch returns `false`; only the length leaks.
pub fn signatures_match(provided: &[u8], expected: &[u8]) -> bool {
    provided.ct_eq(expected).into()
}

/// Parse hex bytes (with or without 0x prefix)
pub fn bytes_from_hex(hex_str: &str) -> Result<Vec<u8>, SigningError> {
    let trimmed = hex_str.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(hex_str).map_err(|_| SigningError::InvalidSignatureFormat)
}

/// Parse public key from hex string (with or without 0x prefix)
pub fn public_key_from_hex(hex_str: &str) -> Result<PublicKey32, SigningError> {
    let bytes = bytes_from_hex(hex_str).map_err(|_| SigningError::InvalidPublicKeyFormat)?;
    bytes
        .try_into()
        .map_err(|_| SigningError::InvalidPublicKeyFormat)
}

// ============================================================================
// Tests
// ============================================================================
