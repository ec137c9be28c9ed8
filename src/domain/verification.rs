//! Verification attempts and request/outcome shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::seal::Seal;
use super::types::{
    bytes_hex, Challenge, GeoLocation, SealId, SerialNumber, TamperIndicator, VerificationId,
};

/// Append-only audit record of one verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAttempt {
    pub id: VerificationId,
    pub seal_id: SealId,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,

    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,

    /// Counter value asserted by the tag
    pub read_counter: u64,

    #[serde(with = "bytes_hex")]
    pub signature_provided: Vec<u8>,
    #[serde(with = "bytes_hex")]
    pub signature_expected: Vec<u8>,
    pub challenge_used: Challenge,

    pub is_valid: bool,
    pub tamper_indicator: TamperIndicator,
    pub tamper_details: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

/// Largest read counter a tag may claim; counters are stored as signed 64-bit
pub const MAX_READ_COUNTER: u64 = i64::MAX as u64;

/// Input to a verification
#[derive(Debug, Clone)]
pub struct VerifySealRequest {
    pub serial_number: SerialNumber,
    pub signature: Vec<u8>,
    pub read_counter: u64,
    pub verified_by: String,
    pub location: Option<GeoLocation>,
    pub device_info: Option<serde_json::Value>,
}

impl VerifySealRequest {
    pub fn new(
        serial_number: SerialNumber,
        signature: impl Into<Vec<u8>>,
        read_counter: u64,
        verified_by: impl Into<String>,
    ) -> Self {
        Self {
            serial_number,
            signature: signature.into(),
            read_counter,
            verified_by: verified_by.into(),
            location: None,
            device_info: None,
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_device_info(mut self, device_info: serde_json::Value) -> Self {
        self.device_info = Some(device_info);
        self
    }
}

/// Result of a verification; signature mismatch and counter anomaly are
/// reported here rather than as errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub seal: Seal,
    pub verification: VerificationAttempt,
    pub is_valid: bool,
    pub tamper_indicator: TamperIndicator,
    pub integrity_score: u8,
    /// Nonce the tag must sign on its next read
    pub next_challenge: Challenge,
}
