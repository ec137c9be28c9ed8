//! Core type definitions for the seal service
//!
//! Identifiers, validated serial numbers, status enums and the challenge nonce.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::crypto::{generate_challenge_bytes, CHALLENGE_LENGTH};

/// 32-byte Ed25519 public key
pub type PublicKey32 = [u8; 32];

static SERIAL_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9]{2,8}-[A-Z0-9]{4,24}$").expect("serial number regex is valid")
});

// ============================================================================
// Identifiers
// ============================================================================

/// Seal identifier (system-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealId(pub uuid::Uuid);

impl SealId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for SealId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification attempt identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationId(pub uuid::Uuid);

impl VerificationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for VerificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VerificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a shipment owned by the wider platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentRef(pub String);

impl ShipmentRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShipmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShipmentRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Serial Number
// ============================================================================

/// Error returned when a serial number does not match the printed-tag format
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid serial number format: {0:?} (expected e.g. SEAL-0001)")]
pub struct InvalidSerialNumber(pub String);

/// Printed / physical tag identifier.
///
/// Normalised to trimmed upper case; must match `^[A-Z0-9]{2,8}-[A-Z0-9]{4,24}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn parse(raw: &str) -> Result<Self, InvalidSerialNumber> {
        let normalized = raw.trim().to_ascii_uppercase();
        if SERIAL_NUMBER_PATTERN.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidSerialNumber(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SerialNumber {
    type Err = InvalidSerialNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Status & Tamper Indicator
// ============================================================================

/// Seal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SealStatus {
    Provisioned,
    Attached,
    Verified,
    Tampered,
    Expired,
    Removed,
}

impl SealStatus {
    pub const ALL: [SealStatus; 6] = [
        SealStatus::Provisioned,
        SealStatus::Attached,
        SealStatus::Verified,
        SealStatus::Tampered,
        SealStatus::Expired,
        SealStatus::Removed,
    ];

    /// Statuses the expiry sweep may still act on
    pub const EXPIRABLE: [SealStatus; 4] = [
        SealStatus::Provisioned,
        SealStatus::Attached,
        SealStatus::Verified,
        SealStatus::Tampered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SealStatus::Provisioned => "PROVISIONED",
            SealStatus::Attached => "ATTACHED",
            SealStatus::Verified => "VERIFIED",
            SealStatus::Tampered => "TAMPERED",
            SealStatus::Expired => "EXPIRED",
            SealStatus::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_expirable(&self) -> bool {
        Self::EXPIRABLE.contains(self)
    }

    /// REMOVED and EXPIRED are retained as-is for audit
    pub fn is_soft_terminal(&self) -> bool {
        matches!(self, SealStatus::Removed | SealStatus::Expired)
    }
}

impl fmt::Display for SealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of why a seal is considered compromised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TamperIndicator {
    #[default]
    None,
    SignatureMismatch,
    CounterAnomaly,
    PhysicalDamage,
}

impl TamperIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            TamperIndicator::None => "NONE",
            TamperIndicator::SignatureMismatch => "SIGNATURE_MISMATCH",
            TamperIndicator::CounterAnomaly => "COUNTER_ANOMALY",
            TamperIndicator::PhysicalDamage => "PHYSICAL_DAMAGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(TamperIndicator::None),
            "SIGNATURE_MISMATCH" => Some(TamperIndicator::SignatureMismatch),
            "COUNTER_ANOMALY" => Some(TamperIndicator::CounterAnomaly),
            "PHYSICAL_DAMAGE" => Some(TamperIndicator::PhysicalDamage),
            _ => None,
        }
    }
}

impl fmt::Display for TamperIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Challenge
// ============================================================================

/// Single-use nonce the tag must sign on its next read
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenge(pub [u8; CHALLENGE_LENGTH]);

impl Challenge {
    /// Draw a fresh challenge from the OS CSPRNG
    pub fn generate() -> Self {
        Self(generate_challenge_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(s).ok().and_then(|b| Self::from_slice(&b))
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", self.to_hex())
    }
}

impl Serialize for Challenge {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Challenge {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 32-byte hex challenge"))
    }
}

// ============================================================================
// Location
// ============================================================================

/// Where an attach, verification or removal took place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl GeoLocation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            lat: None,
            lng: None,
        }
    }

    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Serde module for byte vectors as lowercase hex strings
pub mod bytes_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex_str = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(hex_str).map_err(serde::de::Error::custom)
    }
}

/// Serde module for 32-byte public keys as hex strings
pub mod public_key_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex_str = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(hex_str).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes for public key"))
    }
}
