//! Seal orchestration service
//!
//! Composes the state machine, the verification protocol and key custody against
//! the persistence and shipment collaborators. One instance is built by the
//! composition root and shared behind an `Arc`.
//!
//! Every mutating operation emits exactly one audit entry describing its outcome.
//! Audit failures are logged and never fail the operation.

mod sweeper;

pub use sweeper::ExpirySweeper;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::crypto::generate_key_pair;
use crate::domain::{
    integrity_report, public_key_hex, Challenge, GeoLocation, IntegrityReport, PublicKey32, Seal,
    SealId, SealIntegrity, SealOperation, SealStats, SerialNumber, ShipmentIntegritySummary,
    ShipmentRef, VerificationAttempt, VerificationOutcome, VerifySealRequest, MAX_READ_COUNTER,
};
use crate::infra::{
    AuditAction, AuditLogBuilder, AuditSink, ErrorKind, KeyCustody, Result, SealError,
    SealRepository, ShipmentDirectory,
};
use crate::protocol;

/// Actor recorded for system-initiated transitions
pub const SYSTEM_ACTOR: &str = "system";

/// Page size used when the caller does not ask for one
pub const DEFAULT_AVAILABLE_LIMIT: i64 = 100;

/// One item of a batch provisioning request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionSealRequest {
    pub serial_number: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly provisioned seal and the public key to program into the tag
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedSeal {
    pub seal: Seal,
    #[serde(with = "public_key_hex")]
    pub public_key: PublicKey32,
}

/// Outcome of one batch item; failures do not affect other items
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProvisionResult {
    pub serial_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioned: Option<ProvisionedSeal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

impl BatchProvisionResult {
    pub fn is_success(&self) -> bool {
        self.provisioned.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub kind: &'static str,
    pub message: String,
}

/// Seal lifecycle and verification service
pub struct SealService {
    repository: Arc<dyn SealRepository>,
    shipments: Arc<dyn ShipmentDirectory>,
    audit: Arc<dyn AuditSink>,
    custody: KeyCustody,
}

impl SealService {
    pub fn new(
        repository: Arc<dyn SealRepository>,
        shipments: Arc<dyn ShipmentDirectory>,
        audit: Arc<dyn AuditSink>,
        custody: KeyCustody,
    ) -> Self {
        Self {
            repository,
            shipments,
            audit,
            custody,
        }
    }

    // ------------------------------------------------------------------
    // Provisioning
    // ------------------------------------------------------------------

    /// Create a PROVISIONED seal with a fresh key pair and initial challenge
    #[instrument(skip_all, fields(serial_number = %serial_number))]
    pub async fn provision_seal(
        &self,
        serial_number: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ProvisionedSeal> {
        let result = self.try_provision(serial_number, expires_at).await;

        let mut entry = AuditLogBuilder::new(AuditAction::SealProvisioned, SYSTEM_ACTOR)
            .details(serde_json::json!({ "serialNumber": serial_number, "expiresAt": expires_at }));
        if let Ok(provisioned) = &result {
            entry = entry.seal(provisioned.seal.id);
        }
        self.record_audit(with_outcome(entry, &result)).await;

        result
    }

    async fn try_provision(
        &self,
        serial_number: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ProvisionedSeal> {
        let serial_number = SerialNumber::parse(serial_number)?;
        if self
            .repository
            .find_seal_by_serial(&serial_number)
            .await?
            .is_some()
        {
            return Err(SealError::DuplicateSerialNumber(serial_number));
        }

        let signing_key = generate_key_pair();
        let encrypted_private_key = self.custody.seal_private_key(&serial_number, &signing_key)?;
        let public_key = signing_key.public_key_bytes();
        let seal = Seal::provisioned(
            serial_number,
            public_key,
            encrypted_private_key,
            expires_at,
            Utc::now(),
        );

        self.repository.create_seal(&seal).await?;
        info!(seal_id = %seal.id, serial_number = %seal.serial_number, "Seal provisioned");

        Ok(ProvisionedSeal { seal, public_key })
    }

    /// Provision several seals one after another. Each item stands alone:
    /// a failure is reported in its result and earlier successes stay persisted.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn provision_seals(
        &self,
        requests: Vec<ProvisionSealRequest>,
    ) -> Vec<BatchProvisionResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = match self
                .provision_seal(&request.serial_number, request.expires_at)
                .await
            {
                Ok(provisioned) => BatchProvisionResult {
                    serial_number: request.serial_number,
                    provisioned: Some(provisioned),
                    error: None,
                },
                Err(e) => BatchProvisionResult {
                    serial_number: request.serial_number,
                    provisioned: None,
                    error: Some(BatchItemError {
                        kind: e.kind().as_str(),
                        message: e.to_string(),
                    }),
                },
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(total = results.len(), failed, "Batch provisioning finished");
        results
    }

    // ------------------------------------------------------------------
    // Lifecycle transitions
    // ------------------------------------------------------------------

    /// Bind a PROVISIONED seal to an existing shipment
    #[instrument(skip_all, fields(seal_id = %seal_id, shipment_ref = %shipment_ref))]
    pub async fn attach_seal(
        &self,
        seal_id: SealId,
        shipment_ref: ShipmentRef,
        actor: &str,
        location: Option<GeoLocation>,
    ) -> Result<Seal> {
        let entry = AuditLogBuilder::new(AuditAction::SealAttached, actor)
            .seal(seal_id)
            .details(serde_json::json!({ "shipmentRef": shipment_ref, "location": location }));

        let result = self
            .try_attach(seal_id, shipment_ref, actor, location.as_ref())
            .await;
        self.record_audit(with_outcome(entry, &result)).await;
        result
    }

    async fn try_attach(
        &self,
        seal_id: SealId,
        shipment_ref: ShipmentRef,
        actor: &str,
        location: Option<&GeoLocation>,
    ) -> Result<Seal> {
        let mut seal = self.load(seal_id).await?;
        let now = Utc::now();
        self.guard(&seal, SealOperation::Attach, now).await?;

        if !self.shipments.exists(&shipment_ref).await? {
            return Err(SealError::ShipmentNotFound(shipment_ref.to_string()));
        }

        let expected_version = seal.version;
        seal.attach(shipment_ref, actor, location, now);
        let stored = self.repository.update_seal(&seal, expected_version).await?;

        info!(
            seal_id = %stored.id,
            shipment_ref = ?stored.shipment_ref,
            actor,
            "Seal attached"
        );
        Ok(stored)
    }

    /// Verify a tag read.
    ///
    /// Signature mismatch and counter anomaly are returned as an invalid outcome,
    /// not as errors. The challenge rotates on every attempt that reaches
    /// evaluation.
    #[instrument(
        skip(self, request),
        fields(serial_number = %request.serial_number, read_counter = request.read_counter)
    )]
    pub async fn verify_seal(&self, request: VerifySealRequest) -> Result<VerificationOutcome> {
        let result = self.try_verify(&request).await;

        let (action, mut details) = match &result {
            Ok(outcome) if !outcome.is_valid => (
                AuditAction::SealTamperDetected,
                serde_json::json!({ "tamperIndicator": outcome.tamper_indicator }),
            ),
            _ => (AuditAction::SealVerified, serde_json::json!({})),
        };
        details["serialNumber"] = serde_json::json!(request.serial_number);
        details["readCounter"] = serde_json::json!(request.read_counter);

        let mut builder =
            AuditLogBuilder::new(action, request.verified_by.as_str()).details(details);
        if let Ok(outcome) = &result {
            builder = builder.seal(outcome.seal.id);
        }
        self.record_audit(with_outcome(builder, &result)).await;

        result
    }

    async fn try_verify(&self, request: &VerifySealRequest) -> Result<VerificationOutcome> {
        if request.read_counter > MAX_READ_COUNTER {
            return Err(SealError::InvalidFormat(format!(
                "readCounter {} exceeds {MAX_READ_COUNTER}",
                request.read_counter
            )));
        }
        let seal = self
            .repository
            .find_seal_by_serial(&request.serial_number)
            .await?
            .ok_or_else(|| SealError::SealNotFound(request.serial_number.to_string()))?;
        let now = Utc::now();
        self.guard(&seal, SealOperation::Verify, now).await?;

        let signing_key = self.custody.unseal(&seal)?;
        let evaluation =
            protocol::evaluate(&seal, &request.signature, request.read_counter, &signing_key);
        let attempt = protocol::record_attempt(&seal, request, &evaluation, now);

        let expected_version = seal.version;
        let mut updated = seal;
        protocol::apply(&mut updated, request, &evaluation, now);

        let stored = self
            .repository
            .record_verification(&updated, &attempt, expected_version)
            .await?;

        let history = self.repository.list_verifications(stored.id).await?;
        let report = integrity_report(&stored, &history);

        if evaluation.is_valid() {
            info!(
                seal_id = %stored.id,
                read_counter = request.read_counter,
                integrity_score = report.score,
                "Seal verified"
            );
        } else {
            warn!(
                seal_id = %stored.id,
                tamper_indicator = %evaluation.tamper_indicator,
                details = ?evaluation.tamper_details,
                verified_by = %request.verified_by,
                "Seal tamper detected"
            );
        }

        Ok(VerificationOutcome {
            is_valid: evaluation.is_valid(),
            tamper_indicator: evaluation.tamper_indicator,
            integrity_score: report.score,
            next_challenge: stored.challenge,
            verification: attempt,
            seal: stored,
        })
    }

    /// Take a seal off its shipment
    #[instrument(skip_all, fields(seal_id = %seal_id, actor = %actor))]
    pub async fn remove_seal(
        &self,
        seal_id: SealId,
        actor: &str,
        reason: &str,
        location: Option<GeoLocation>,
    ) -> Result<Seal> {
        let entry = AuditLogBuilder::new(AuditAction::SealRemoved, actor)
            .seal(seal_id)
            .details(serde_json::json!({ "reason": reason, "location": location }));

        let result = self.try_remove(seal_id, actor, reason, location.as_ref()).await;
        self.record_audit(with_outcome(entry, &result)).await;
        result
    }

    async fn try_remove(
        &self,
        seal_id: SealId,
        actor: &str,
        reason: &str,
        location: Option<&GeoLocation>,
    ) -> Result<Seal> {
        let mut seal = self.load(seal_id).await?;
        if !seal.can_remove() {
            return Err(invalid_state(&seal, SealOperation::Remove));
        }

        let expected_version = seal.version;
        let shipment_ref = seal.shipment_ref.clone();
        seal.remove(actor, reason, location, Utc::now());
        let stored = self.repository.update_seal(&seal, expected_version).await?;

        info!(seal_id = %stored.id, ?shipment_ref, actor, reason, "Seal removed");
        Ok(stored)
    }

    /// Record a visual-inspection finding. Moves the seal to TAMPERED with
    /// `PHYSICAL_DAMAGE` from any status.
    #[instrument(skip_all, fields(seal_id = %seal_id, reported_by = %reported_by))]
    pub async fn report_physical_damage(
        &self,
        seal_id: SealId,
        reported_by: &str,
        description: &str,
    ) -> Result<Seal> {
        let entry = AuditLogBuilder::new(AuditAction::SealDamageReported, reported_by)
            .seal(seal_id)
            .details(serde_json::json!({ "description": description }));

        let result = self.try_report_damage(seal_id, reported_by, description).await;
        self.record_audit(with_outcome(entry, &result)).await;
        result
    }

    async fn try_report_damage(
        &self,
        seal_id: SealId,
        reported_by: &str,
        description: &str,
    ) -> Result<Seal> {
        let mut seal = self.load(seal_id).await?;
        let previous_status = seal.status;
        let expected_version = seal.version;
        seal.mark_physically_damaged(description, Utc::now());
        let stored = self.repository.update_seal(&seal, expected_version).await?;

        warn!(
            seal_id = %stored.id,
            %previous_status,
            reported_by,
            "Physical damage reported"
        );
        Ok(stored)
    }

    /// Expire every non-terminal seal past its `expires_at`.
    ///
    /// Returns the number of seals this call transitioned; seals already expired
    /// (or expired concurrently by someone else) are not counted.
    #[instrument(skip(self))]
    pub async fn process_expired_seals(&self) -> Result<u64> {
        let now = Utc::now();
        let result: Result<Vec<SealId>> = async {
            let candidates = self.repository.find_expired(now).await?;
            if candidates.is_empty() {
                return Ok(Vec::new());
            }
            self.repository.mark_expired(&candidates, now).await
        }
        .await;

        let expired_ids: Vec<String> = result
            .as_ref()
            .map(|ids| ids.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        let entry = AuditLogBuilder::new(AuditAction::SealExpired, SYSTEM_ACTOR)
            .details(serde_json::json!({ "sweep": true, "sealIds": expired_ids }));
        self.record_audit(with_outcome(entry, &result)).await;

        let expired = result?;
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired seals swept");
        }
        Ok(expired.len() as u64)
    }

    // ------------------------------------------------------------------
    // Read-only projections
    // ------------------------------------------------------------------

    pub async fn get_seal(&self, seal_id: SealId) -> Result<Seal> {
        self.load(seal_id).await
    }

    pub async fn get_seal_by_serial_number(&self, serial_number: &str) -> Result<Seal> {
        let serial_number = SerialNumber::parse(serial_number)?;
        self.repository
            .find_seal_by_serial(&serial_number)
            .await?
            .ok_or_else(|| SealError::SealNotFound(serial_number.to_string()))
    }

    pub async fn get_shipment_seals(&self, shipment_ref: &ShipmentRef) -> Result<Vec<Seal>> {
        self.repository.list_by_shipment(shipment_ref).await
    }

    /// Verification attempts for a seal, oldest first
    pub async fn get_verification_history(
        &self,
        seal_id: SealId,
    ) -> Result<Vec<VerificationAttempt>> {
        let seal = self.load(seal_id).await?;
        self.repository.list_verifications(seal.id).await
    }

    pub async fn get_integrity_score(&self, seal_id: SealId) -> Result<IntegrityReport> {
        let seal = self.load(seal_id).await?;
        let history = self.repository.list_verifications(seal.id).await?;
        Ok(integrity_report(&seal, &history))
    }

    pub async fn get_shipment_integrity_summary(
        &self,
        shipment_ref: &ShipmentRef,
    ) -> Result<ShipmentIntegritySummary> {
        let seals = self.repository.list_by_shipment(shipment_ref).await?;
        let mut lines = Vec::with_capacity(seals.len());
        for seal in seals {
            let history = self.repository.list_verifications(seal.id).await?;
            lines.push(SealIntegrity {
                report: integrity_report(&seal, &history),
                seal_id: seal.id,
                serial_number: seal.serial_number,
                status: seal.status,
                tamper_indicator: seal.tamper_indicator,
            });
        }
        Ok(ShipmentIntegritySummary::from_seals(
            shipment_ref.clone(),
            lines,
        ))
    }

    /// PROVISIONED, unexpired seals ready to be attached
    pub async fn get_available_seals(&self, limit: Option<i64>) -> Result<Vec<Seal>> {
        let limit = limit.unwrap_or(DEFAULT_AVAILABLE_LIMIT).clamp(1, 1000);
        self.repository.list_available(Utc::now(), limit).await
    }

    pub async fn get_seal_stats(&self) -> Result<SealStats> {
        Ok(SealStats::from_counts(self.repository.count_by_status().await?))
    }

    /// The nonce a tag must sign on its next read, or `None` for an unknown serial
    pub async fn get_current_challenge(&self, serial_number: &str) -> Result<Option<Challenge>> {
        let serial_number = SerialNumber::parse(serial_number)?;
        Ok(self
            .repository
            .find_seal_by_serial(&serial_number)
            .await?
            .map(|seal| seal.challenge))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load(&self, seal_id: SealId) -> Result<Seal> {
        self.repository
            .find_seal(seal_id)
            .await?
            .ok_or_else(|| SealError::SealNotFound(seal_id.to_string()))
    }

    /// Status guard first, then lazy expiry
    async fn guard(
        &self,
        seal: &Seal,
        operation: SealOperation,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !seal.status_permits(operation) {
            return Err(invalid_state(seal, operation));
        }
        if seal.is_expired(now) {
            let changed = self.repository.mark_expired(&[seal.id], now).await?;
            if !changed.is_empty() {
                warn!(seal_id = %seal.id, %operation, "Seal expired on access");
                let entry = AuditLogBuilder::new(AuditAction::SealExpired, SYSTEM_ACTOR)
                    .seal(seal.id)
                    .details(serde_json::json!({ "trigger": operation.as_str() }))
                    .build();
                self.record_audit(entry).await;
            }
            return Err(SealError::Expired(seal.id));
        }
        Ok(())
    }

    async fn record_audit(&self, entry: crate::infra::AuditLogEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.audit.record(entry).await {
            warn!(%action, error = %e, "Failed to write audit log entry");
        }
    }
}

fn invalid_state(seal: &Seal, operation: SealOperation) -> SealError {
    SealError::InvalidState {
        seal_id: seal.id,
        operation,
        status: seal.status,
    }
}

fn with_outcome<T>(builder: AuditLogBuilder, result: &Result<T>) -> crate::infra::AuditLogEntry {
    match result {
        Ok(_) => builder.build(),
        Err(e) if e.kind() == ErrorKind::Database => builder.failed("database error").build(),
        Err(e) => builder.failed(e.to_string()).build(),
    }
}
