//! Trait definitions for the seal service collaborators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::domain::{Seal, SealId, SealStatus, SerialNumber, ShipmentRef, VerificationAttempt};

use super::audit::AuditLogEntry;
use super::Result;

/// Durable storage for seals and their verification history.
///
/// Invariant: every write to an existing seal is conditional on the version the
/// caller read. A stale version fails with `ConcurrentModification` and leaves
/// the stored row untouched. Seals are never deleted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SealRepository: Send + Sync {
    /// Insert a freshly provisioned seal.
    ///
    /// Fails with `DuplicateSerialNumber` if the serial is already taken.
    async fn create_seal(&self, seal: &Seal) -> Result<()>;

    async fn find_seal(&self, id: SealId) -> Result<Option<Seal>>;

    async fn find_seal_by_serial(&self, serial_number: &SerialNumber) -> Result<Option<Seal>>;

    /// Persist `seal` if the stored version still equals `expected_version`.
    ///
    /// Returns the seal as stored (with its bumped version).
    async fn update_seal(&self, seal: &Seal, expected_version: u64) -> Result<Seal>;

    /// Append a verification attempt and persist the updated seal atomically.
    ///
    /// If the conditional update loses, the attempt is not written either.
    async fn record_verification(
        &self,
        seal: &Seal,
        attempt: &VerificationAttempt,
        expected_version: u64,
    ) -> Result<Seal>;

    /// Verification history ordered by `verified_at` ascending
    async fn list_verifications(&self, seal_id: SealId) -> Result<Vec<VerificationAttempt>>;

    async fn list_by_shipment(&self, shipment_ref: &ShipmentRef) -> Result<Vec<Seal>>;

    /// PROVISIONED seals that are not past their expiry
    async fn list_available(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Seal>>;

    /// Ids of seals in a non-terminal status whose `expires_at` is before `now`
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<SealId>>;

    /// Transition the given seals to EXPIRED, re-checking eligibility at write
    /// time. Returns the ids that actually changed.
    async fn mark_expired(&self, ids: &[SealId], now: DateTime<Utc>) -> Result<Vec<SealId>>;

    async fn count_by_status(&self) -> Result<Vec<(SealStatus, u64)>>;
}

/// Read-only view of the platform's shipment records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShipmentDirectory: Send + Sync {
    async fn exists(&self, shipment_ref: &ShipmentRef) -> Result<bool>;
}

/// Destination for audit records.
///
/// Callers treat failures as non-fatal.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditLogEntry) -> Result<()>;
}
