//! Request and response bodies for the REST handlers.
//!
//! Field names are camelCase on the wire. Signatures travel as hex.

use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, GeoLocation, SealId, SerialNumber, VerifySealRequest};
use crate::service::{BatchProvisionResult, ProvisionSealRequest};

use super::error::{validation_error, ApiError};

/// Largest batch accepted by `POST /v1/seals/batch`
pub const MAX_BATCH_SIZE: usize = 500;

// ============================================================================
// Provisioning
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BatchProvisionBody {
    pub seals: Vec<ProvisionSealRequest>,
}

impl BatchProvisionBody {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.seals.is_empty() {
            return Err(validation_error("seals", "batch must contain at least one seal"));
        }
        if self.seals.len() > MAX_BATCH_SIZE {
            return Err(validation_error(
                "seals",
                format!(
                    "batch of {} exceeds the limit of {MAX_BATCH_SIZE}",
                    self.seals.len()
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProvisionResponse {
    pub provisioned: usize,
    pub failed: usize,
    pub results: Vec<BatchProvisionResult>,
}

impl From<Vec<BatchProvisionResult>> for BatchProvisionResponse {
    fn from(results: Vec<BatchProvisionResult>) -> Self {
        let provisioned = results.iter().filter(|r| r.is_success()).count();
        Self {
            provisioned,
            failed: results.len() - provisioned,
            results,
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSealBody {
    pub shipment_ref: String,
    pub attached_by: String,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSealBody {
    pub removed_by: String,
    pub reason: String,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDamageBody {
    pub reported_by: String,
    pub description: String,
}

/// An NFC read as submitted by a field device
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySealBody {
    pub serial_number: String,
    /// Hex, optional `0x` prefix
    pub signature: String,
    pub read_counter: u64,
    pub verified_by: String,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

impl TryFrom<VerifySealBody> for VerifySealRequest {
    type Error = ApiError;

    fn try_from(body: VerifySealBody) -> Result<Self, Self::Error> {
        let serial_number = SerialNumber::parse(&body.serial_number)
            .map_err(|e| validation_error("serialNumber", e.to_string()))?;
        let signature_hex = body.signature.trim();
        let signature = hex::decode(signature_hex.strip_prefix("0x").unwrap_or(signature_hex))
            .map_err(|e| validation_error("signature", format!("signature is not hex: {e}")))?;
        require_non_blank("verifiedBy", &body.verified_by)?;

        let mut request =
            VerifySealRequest::new(serial_number, signature, body.read_counter, body.verified_by);
        if let Some(location) = body.location {
            request = request.with_location(location);
        }
        if let Some(device_info) = body.device_info {
            request = request.with_device_info(device_info);
        }
        Ok(request)
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailableSealsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub serial_number: String,
    pub challenge: Challenge,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySweepResponse {
    pub expired: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealIntegrityResponse {
    pub seal_id: SealId,
    #[serde(flatten)]
    pub report: crate::domain::IntegrityReport,
}

pub fn require_non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(validation_error(field, format!("{field} must not be empty")));
    }
    Ok(())
}
