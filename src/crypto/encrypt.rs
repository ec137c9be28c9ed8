//! Private-key encryption at rest
//!
//! Seal private keys are stored only as AES-256-GCM ciphertext under the
//! process-wide master key. The AAD binds the ciphertext to the seal's serial number
//! and public key, so a blob copied onto another seal row fails authentication
//! instead of decrypting into the wrong key.
//!
//! Blob format: `ASK1 || nonce(12) || ciphertext || tag(16)`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Master key (32 bytes for AES-256)
pub type EncryptionKey = [u8; 32];

/// 32-byte SHA-256 digest
pub type Hash256 = [u8; 32];

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Magic prefix for sealed private-key blobs (v1)
pub const SEALED_KEY_MAGIC_V1: &[u8; 4] = b"ASK1";

/// Domain prefix for private-key AAD
pub const DOMAIN_SEAL_KEY_AAD_V1: &[u8] = b"AGRISEAL_PRIVKEY_ATREST_AAD_V1";

/// Error type for encryption operations
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid ciphertext length")]
    InvalidCiphertext,

    #[error("invalid sealed key format")]
    InvalidFormat,
}

/// Length-prefixed string encoding used inside AAD preimages
pub fn encode_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

/// Compute the AAD that binds a sealed private key to its seal.
///
/// ```text
/// aad = SHA256(b"AGRISEAL_PRIVKEY_ATREST_AAD_V1" || ENC_STR(serial_number) || public_key(32))
/// ```
pub fn compute_private_key_aad(serial_number: &str, public_key: &[u8; 32]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SEAL_KEY_AAD_V1);
    hasher.update(encode_string(serial_number));
    hasher.update(public_key);
    hasher.finalize().into()
}

/// Returns true if `data` carries the sealed-key magic prefix
pub fn is_sealed_key(data: &[u8]) -> bool {
    data.len() >= SEALED_KEY_MAGIC_V1.len()
        && &data[..SEALED_KEY_MAGIC_V1.len()] == SEALED_KEY_MAGIC_V1
}

/// Encrypt private key bytes under the master key.
pub fn encrypt_private_key(
    private_key: &[u8],
    master_key: &EncryptionKey,
    aad: &Hash256,
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_with_tag = cipher
        .encrypt(
            nonce,
            Payload {
                msg: private_key,
                aad,
            },
        )
        .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

    let mut result =
        Vec::with_capacity(SEALED_KEY_MAGIC_V1.len() + NONCE_SIZE + ciphertext_with_tag.len());
    result.extend_from_slice(SEALED_KEY_MAGIC_V1);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext_with_tag);
    Ok(result)
}

/// Decrypt a sealed private key. Fails on any integrity violation.
pub fn decrypt_private_key(
    ciphertext: &[u8],
    master_key: &EncryptionKey,
    aad: &Hash256,
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let header_len = SEALED_KEY_MAGIC_V1.len() + NONCE_SIZE;
    if ciphertext.len() < header_len + TAG_SIZE {
        return Err(EncryptionError::InvalidCiphertext);
    }
    if !is_sealed_key(ciphertext) {
        return Err(EncryptionError::InvalidFormat);
    }

    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

    let nonce_start = SEALED_KEY_MAGIC_V1.len();
    let nonce = Nonce::from_slice(&ciphertext[nonce_start..header_len]);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext[header_len..],
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
}

/// Generate a new random master key
pub fn generate_key() -> EncryptionKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}
