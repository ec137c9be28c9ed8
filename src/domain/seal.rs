//! Seal entity and lifecycle state machine
//!
//! ```text
//! PROVISIONED ──attach──▶ ATTACHED ──verify──▶ VERIFIED ⇄ verify
//!                            │                   │
//!                            └──verify (invalid)─┴──▶ TAMPERED
//!
//! PROVISIONED | ATTACHED | VERIFIED | TAMPERED ──expiry──▶ EXPIRED
//! ATTACHED | VERIFIED | TAMPERED ──remove──▶ REMOVED
//! ```
//!
//! Guards are pure; transitions mutate the entity and assume the guard held.
//! Persisting the result (and detecting concurrent writers) is the repository's job.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{
    public_key_hex, Challenge, GeoLocation, PublicKey32, SealId, SealStatus, SerialNumber,
    ShipmentRef, TamperIndicator,
};

/// Operations gated by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealOperation {
    Attach,
    Verify,
    Remove,
}

impl SealOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SealOperation::Attach => "attach",
            SealOperation::Verify => "verify",
            SealOperation::Remove => "remove",
        }
    }
}

impl std::fmt::Display for SealOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical tamper-evident tag
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seal {
    pub id: SealId,
    pub serial_number: SerialNumber,
    pub status: SealStatus,
    pub shipment_ref: Option<ShipmentRef>,

    #[serde(with = "public_key_hex")]
    pub public_key: PublicKey32,
    /// AES-256-GCM blob; see [`crate::crypto::encrypt_private_key`]
    #[serde(skip_serializing)]
    pub encrypted_private_key: Vec<u8>,
    pub challenge: Challenge,

    pub expected_read_count: u64,
    pub actual_read_count: u64,

    pub attached_at: Option<DateTime<Utc>>,
    pub attached_by: Option<String>,
    pub attached_location: Option<String>,
    pub attached_lat: Option<f64>,
    pub attached_lng: Option<f64>,

    pub removed_at: Option<DateTime<Utc>>,
    pub removed_by: Option<String>,
    pub removed_location: Option<String>,
    pub removal_reason: Option<String>,

    pub tamper_indicator: TamperIndicator,
    pub tamper_details: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency token, bumped on every persisted write
    pub version: u64,
}

impl Seal {
    /// Build a freshly provisioned seal
    pub fn provisioned(
        serial_number: SerialNumber,
        public_key: PublicKey32,
        encrypted_private_key: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SealId::new(),
            serial_number,
            status: SealStatus::Provisioned,
            shipment_ref: None,
            public_key,
            encrypted_private_key,
            challenge: Challenge::generate(),
            expected_read_count: 0,
            actual_read_count: 0,
            attached_at: None,
            attached_by: None,
            attached_location: None,
            attached_lat: None,
            attached_lng: None,
            removed_at: None,
            removed_by: None,
            removed_location: None,
            removal_reason: None,
            tamper_indicator: TamperIndicator::None,
            tamper_details: None,
            expires_at,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    /// `expires_at` is set and lies in the past
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    pub fn can_attach(&self, now: DateTime<Utc>) -> bool {
        self.status == SealStatus::Provisioned && !self.is_expired(now)
    }

    pub fn can_verify(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SealStatus::Attached | SealStatus::Verified) && !self.is_expired(now)
    }

    pub fn can_remove(&self) -> bool {
        matches!(
            self.status,
            SealStatus::Attached | SealStatus::Verified | SealStatus::Tampered
        )
    }

    /// Status check only, ignoring expiry. Used to report `InvalidState` before
    /// lazy expiry is considered.
    pub fn status_permits(&self, operation: SealOperation) -> bool {
        match operation {
            SealOperation::Attach => self.status == SealStatus::Provisioned,
            SealOperation::Verify => {
                matches!(self.status, SealStatus::Attached | SealStatus::Verified)
            }
            SealOperation::Remove => self.can_remove(),
        }
    }

    /// True while the seal should still be picked up by expiry
    pub fn is_expiry_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_expirable() && self.is_expired(now)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    pub fn attach(
        &mut self,
        shipment_ref: ShipmentRef,
        actor: &str,
        location: Option<&GeoLocation>,
        now: DateTime<Utc>,
    ) {
        self.status = SealStatus::Attached;
        self.shipment_ref = Some(shipment_ref);
        self.attached_at = Some(now);
        self.attached_by = Some(actor.to_string());
        self.attached_location = location.and_then(|l| l.name.clone());
        self.attached_lat = location.and_then(|l| l.lat);
        self.attached_lng = location.and_then(|l| l.lng);
        self.updated_at = now;
    }

    pub fn remove(
        &mut self,
        actor: &str,
        reason: &str,
        location: Option<&GeoLocation>,
        now: DateTime<Utc>,
    ) {
        self.status = SealStatus::Removed;
        self.shipment_ref = None;
        self.removed_at = Some(now);
        self.removed_by = Some(actor.to_string());
        self.removed_location = location.and_then(|l| l.name.clone());
        self.removal_reason = Some(reason.to_string());
        self.updated_at = now;
    }

    /// Record a visual inspection finding.
    ///
    /// Live seals move to TAMPERED. REMOVED and EXPIRED seals keep their status
    /// and only gain the tamper fields.
    pub fn mark_physically_damaged(&mut self, description: &str, now: DateTime<Utc>) {
        if !self.status.is_soft_terminal() {
            self.status = SealStatus::Tampered;
        }
        self.tamper_indicator = TamperIndicator::PhysicalDamage;
        self.tamper_details = Some(description.to_string());
        self.updated_at = now;
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = SealStatus::Expired;
        self.shipment_ref = None;
        self.updated_at = now;
    }

    /// Apply the outcome of a verification attempt.
    ///
    /// The challenge always rotates and both counters follow the claimed value,
    /// whatever the outcome. Tamper fields change only on an invalid outcome.
    pub fn apply_verification(
        &mut self,
        claimed_counter: u64,
        tamper_indicator: TamperIndicator,
        tamper_details: Option<String>,
        next_challenge: Challenge,
        now: DateTime<Utc>,
    ) {
        let is_valid = tamper_indicator == TamperIndicator::None;
        self.challenge = next_challenge;
        self.expected_read_count = claimed_counter;
        self.actual_read_count = claimed_counter;
        if is_valid {
            self.status = SealStatus::Verified;
        } else {
            self.status = SealStatus::Tampered;
            self.tamper_indicator = tamper_indicator;
            self.tamper_details = tamper_details;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seal(status: SealStatus, expires_at: Option<DateTime<Utc>>) -> Seal {
        let mut seal = Seal::provisioned(
            SerialNumber::parse("SEAL-0001").unwrap(),
            [0u8; 32],
            vec![],
            expires_at,
            Utc::now(),
        );
        seal.status = status;
        seal
    }

    #[test]
    fn test_can_attach_only_when_provisioned_and_live() {
        let now = Utc::now();
        for status in SealStatus::ALL {
            let s = seal(status, None);
            assert_eq!(s.can_attach(now), status == SealStatus::Provisioned);
        }
        let expired = seal(SealStatus::Provisioned, Some(now - Duration::minutes(1)));
        assert!(!expired.can_attach(now));
    }

    #[test]
    fn test_can_verify_only_attached_or_verified() {
        let now = Utc::now();
        for status in SealStatus::ALL {
            let s = seal(status, Some(now + Duration::days(1)));
            assert_eq!(
                s.can_verify(now),
                matches!(status, SealStatus::Attached | SealStatus::Verified)
            );
        }
        let expired = seal(SealStatus::Verified, Some(now - Duration::seconds(1)));
        assert!(!expired.can_verify(now));
        assert!(expired.status_permits(SealOperation::Verify));
    }

    #[test]
    fn test_can_remove() {
        for status in SealStatus::ALL {
            let s = seal(status, None);
            assert_eq!(
                s.can_remove(),
                matches!(
                    status,
                    SealStatus::Attached | SealStatus::Verified | SealStatus::Tampered
                )
            );
        }
    }

    #[test]
    fn test_attach_and_verify_guards_never_both_accept() {
        let now = Utc::now();
        for status in SealStatus::ALL {
            let s = seal(status, None);
            assert!(!(s.can_attach(now) && s.can_verify(now)));
        }
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let s = seal(SealStatus::Attached, None);
        assert!(!s.is_expired(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_expiry_due_skips_terminal_states() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));
        assert!(seal(SealStatus::Tampered, past).is_expiry_due(now));
        assert!(!seal(SealStatus::Removed, past).is_expiry_due(now));
        assert!(!seal(SealStatus::Expired, past).is_expiry_due(now));
    }

    #[test]
    fn test_attach_records_metadata() {
        let now = Utc::now();
        let mut s = seal(SealStatus::Provisioned, None);
        let location = GeoLocation::named("Packhouse 3").with_coordinates(-1.28, 36.82);
        s.attach(ShipmentRef::new("SHP-42"), "agent-7", Some(&location), now);

        assert_eq!(s.status, SealStatus::Attached);
        assert_eq!(s.shipment_ref, Some(ShipmentRef::new("SHP-42")));
        assert_eq!(s.attached_by.as_deref(), Some("agent-7"));
        assert_eq!(s.attached_location.as_deref(), Some("Packhouse 3"));
        assert_eq!(s.attached_lat, Some(-1.28));
    }

    #[test]
    fn test_remove_clears_shipment() {
        let now = Utc::now();
        let mut s = seal(SealStatus::Provisioned, None);
        s.attach(ShipmentRef::new("SHP-42"), "agent", None, now);
        s.remove("inspector", "delivered", None, now);

        assert_eq!(s.status, SealStatus::Removed);
        assert!(s.shipment_ref.is_none());
        assert_eq!(s.removal_reason.as_deref(), Some("delivered"));
    }

    #[test]
    fn test_damage_tampers_live_seal() {
        let mut s = seal(SealStatus::Attached, None);
        s.mark_physically_damaged("cut shackle", Utc::now());

        assert_eq!(s.status, SealStatus::Tampered);
        assert_eq!(s.tamper_indicator, TamperIndicator::PhysicalDamage);
    }

    #[test]
    fn test_damage_keeps_soft_terminal_status() {
        let now = Utc::now();
        for status in [SealStatus::Removed, SealStatus::Expired] {
            let mut s = seal(status, Some(now - Duration::hours(1)));
            s.mark_physically_damaged("torn adhesive", now);

            assert_eq!(s.status, status);
            assert_eq!(s.tamper_indicator, TamperIndicator::PhysicalDamage);
            assert_eq!(s.tamper_details.as_deref(), Some("torn adhesive"));
            assert!(!s.can_remove());
            assert!(!s.is_expiry_due(now));
        }
    }

    #[test]
    fn test_apply_verification_preserves_tamper_fields_when_valid() {
        let now = Utc::now();
        let mut s = seal(SealStatus::Attached, None);
        s.tamper_details = Some("earlier note".into());
        let before = s.challenge;
        let next = Challenge::generate();

        s.apply_verification(1, TamperIndicator::None, None, next, now);

        assert_eq!(s.status, SealStatus::Verified);
        assert_ne!(s.challenge, before);
        assert_eq!(s.actual_read_count, 1);
        assert_eq!(s.expected_read_count, 1);
        assert_eq!(s.tamper_details.as_deref(), Some("earlier note"));
    }

    #[test]
    fn test_apply_verification_invalid_marks_tampered() {
        let now = Utc::now();
        let mut s = seal(SealStatus::Verified, None);
        s.apply_verification(
            0,
            TamperIndicator::CounterAnomaly,
            Some("replay".into()),
            Challenge::generate(),
            now,
        );
        assert_eq!(s.status, SealStatus::Tampered);
        assert_eq!(s.tamper_indicator, TamperIndicator::CounterAnomaly);
        assert_eq!(s.actual_read_count, 0);
    }

    #[test]
    fn test_serialization_hides_private_key() {
        let mut s = seal(SealStatus::Provisioned, None);
        s.encrypted_private_key = vec![1, 2, 3];
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("encryptedPrivateKey").is_none());
        assert_eq!(json["status"], "PROVISIONED");
        assert_eq!(json["serialNumber"], "SEAL-0001");
    }
}
