//! Master-key configuration and custody of seal private keys.
//!
//! The master key is loaded once at startup and only ever read afterwards.
//! Seal private keys exist in plaintext only inside [`KeyCustody`] calls and are
//! wiped on drop.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::{
    compute_private_key_aad, decrypt_private_key, encrypt_private_key, generate_key,
    EncryptionKey, SealSigningKey,
};
use crate::domain::{Seal, SerialNumber};
use crate::infra::{Result, SealError};

/// Environment variable holding the 32-byte master key (hex or base64)
pub const MASTER_KEY_ENV: &str = "SEAL_MASTER_KEY";

/// Deployment environment, from `APP_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(SealError::Configuration(format!(
                "invalid APP_ENV={other} (expected: development|test|production)"
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        match std::env::var("APP_ENV") {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(Self::Development),
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

/// Symmetric key protecting every seal private key at rest
#[derive(Clone)]
pub struct MasterKey(Arc<Zeroizing<EncryptionKey>>);

impl MasterKey {
    pub fn new(key: EncryptionKey) -> Self {
        Self(Arc::new(Zeroizing::new(key)))
    }

    /// Random key for development and tests
    pub fn ephemeral() -> Self {
        Self::new(generate_key())
    }

    pub fn from_env(environment: AppEnvironment) -> Result<Self> {
        Self::from_setting(std::env::var(MASTER_KEY_ENV).ok().as_deref(), environment)
    }

    /// Resolve the master key from an optional configured value.
    ///
    /// Production requires a valid key. Elsewhere a missing key falls back to an
    /// ephemeral one; a present but malformed key is always rejected.
    pub fn from_setting(value: Option<&str>, environment: AppEnvironment) -> Result<Self> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => Ok(Self::new(parse_32_byte_key(raw)?)),
            None if environment.is_production() => Err(SealError::KeyManagementFailure(format!(
                "{MASTER_KEY_ENV} is required when APP_ENV=production"
            ))),
            None => {
                tracing::warn!(
                    "{MASTER_KEY_ENV} not set; using an ephemeral master key. \
                     Provisioned seals will be unverifiable after restart"
                );
                Ok(Self::ephemeral())
            }
        }
    }

    fn as_bytes(&self) -> &EncryptionKey {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Parse a 32-byte key given as hex (64 chars, optional `0x`) or base64
pub fn parse_32_byte_key(s: &str) -> Result<EncryptionKey> {
    let trimmed = s.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if hex_str.len() == 64 && hex_str.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes = Zeroizing::new(hex::decode(hex_str).map_err(|e| {
            SealError::KeyManagementFailure(format!("invalid {MASTER_KEY_ENV} hex: {e}"))
        })?);
        return bytes[..].try_into().map_err(|_| {
            SealError::KeyManagementFailure(format!("{MASTER_KEY_ENV} must be 32 bytes"))
        });
    }

    let bytes = Zeroizing::new(
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, trimmed)
            .or_else(|_| {
                base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, trimmed)
            })
            .map_err(|e| {
                SealError::KeyManagementFailure(format!("invalid {MASTER_KEY_ENV} base64: {e}"))
            })?,
    );

    bytes[..].try_into().map_err(|_| {
        SealError::KeyManagementFailure(format!("{MASTER_KEY_ENV} must be 32 bytes"))
    })
}

/// Seals and unseals per-seal private keys under the master key
#[derive(Clone, Debug)]
pub struct KeyCustody {
    master_key: MasterKey,
}

impl KeyCustody {
    pub fn new(master_key: MasterKey) -> Self {
        Self { master_key }
    }

    /// Encrypt a freshly generated private key for storage on the seal row
    pub fn seal_private_key(
        &self,
        serial_number: &SerialNumber,
        signing_key: &SealSigningKey,
    ) -> Result<Vec<u8>> {
        let aad = compute_private_key_aad(serial_number.as_str(), &signing_key.public_key_bytes());
        let secret = signing_key.to_secret_bytes();
        Ok(encrypt_private_key(&secret[..], self.master_key.as_bytes(), &aad)?)
    }

    /// Recover the signing key of a stored seal.
    ///
    /// Fails with `KeyManagementFailure` if the blob does not authenticate or the
    /// decrypted key does not match the stored public key.
    pub fn unseal(&self, seal: &Seal) -> Result<SealSigningKey> {
        let aad = compute_private_key_aad(seal.serial_number.as_str(), &seal.public_key);
        let secret = decrypt_private_key(&seal.encrypted_private_key, self.master_key.as_bytes(), &aad)?;
        let signing_key = SealSigningKey::from_bytes(&secret)
            .map_err(|e| SealError::KeyManagementFailure(e.to_string()))?;

        if signing_key.public_key_bytes() != seal.public_key {
            return Err(SealError::KeyManagementFailure(format!(
                "decrypted key does not match public key of seal {}",
                seal.id
            )));
        }
        Ok(signing_key)
    }
}
