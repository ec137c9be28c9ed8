//! In-memory collaborators for development and tests
//!
//! Same contracts as the Postgres implementations, including the version check
//! on every seal write.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Seal, SealId, SealStatus, SerialNumber, ShipmentRef, VerificationAttempt};

use super::audit::AuditLogEntry;
use super::traits::{AuditSink, SealRepository, ShipmentDirectory};
use super::{Result, SealError};

#[derive(Default)]
struct SealTables {
    seals: HashMap<SealId, Seal>,
    by_serial: HashMap<SerialNumber, SealId>,
    verifications: HashMap<SealId, Vec<VerificationAttempt>>,
}

impl SealTables {
    fn check_version(&self, seal: &Seal, expected_version: u64) -> Result<()> {
        match self.seals.get(&seal.id) {
            None => Err(SealError::SealNotFound(seal.id.to_string())),
            Some(stored) if stored.version != expected_version => {
                Err(SealError::ConcurrentModification {
                    seal_id: seal.id,
                    expected_version,
                })
            }
            Some(_) => Ok(()),
        }
    }

    fn store(&mut self, seal: &Seal, expected_version: u64) -> Seal {
        let mut stored = seal.clone();
        stored.version = expected_version + 1;
        self.seals.insert(stored.id, stored.clone());
        stored
    }
}

/// In-memory seal repository
#[derive(Default)]
pub struct InMemorySealRepository {
    tables: RwLock<SealTables>,
}

impl InMemorySealRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SealRepository for InMemorySealRepository {
    async fn create_seal(&self, seal: &Seal) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_serial.contains_key(&seal.serial_number) {
            return Err(SealError::DuplicateSerialNumber(seal.serial_number.clone()));
        }
        tables.by_serial.insert(seal.serial_number.clone(), seal.id);
        tables.seals.insert(seal.id, seal.clone());
        Ok(())
    }

    async fn find_seal(&self, id: SealId) -> Result<Option<Seal>> {
        Ok(self.tables.read().await.seals.get(&id).cloned())
    }

    async fn find_seal_by_serial(&self, serial_number: &SerialNumber) -> Result<Option<Seal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_serial
            .get(serial_number)
            .and_then(|id| tables.seals.get(id))
            .cloned())
    }

    async fn update_seal(&self, seal: &Seal, expected_version: u64) -> Result<Seal> {
        let mut tables = self.tables.write().await;
        tables.check_version(seal, expected_version)?;
        Ok(tables.store(seal, expected_version))
    }

    async fn record_verification(
        &self,
        seal: &Seal,
        attempt: &VerificationAttempt,
        expected_version: u64,
    ) -> Result<Seal> {
        let mut tables = self.tables.write().await;
        tables.check_version(seal, expected_version)?;
        tables
            .verifications
            .entry(seal.id)
            .or_default()
            .push(attempt.clone());
        Ok(tables.store(seal, expected_version))
    }

    async fn list_verifications(&self, seal_id: SealId) -> Result<Vec<VerificationAttempt>> {
        let tables = self.tables.read().await;
        let mut history = tables.verifications.get(&seal_id).cloned().unwrap_or_default();
        history.sort_by_key(|a| a.verified_at);
        Ok(history)
    }

    async fn list_by_shipment(&self, shipment_ref: &ShipmentRef) -> Result<Vec<Seal>> {
        let tables = self.tables.read().await;
        let mut seals: Vec<Seal> = tables
            .seals
            .values()
            .filter(|s| s.shipment_ref.as_ref() == Some(shipment_ref))
            .cloned()
            .collect();
        seals.sort_by_key(|s| s.attached_at);
        Ok(seals)
    }

    async fn list_available(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Seal>> {
        let tables = self.tables.read().await;
        let mut seals: Vec<Seal> = tables
            .seals
            .values()
            .filter(|s| s.status == SealStatus::Provisioned && !s.is_expired(now))
            .cloned()
            .collect();
        seals.sort_by_key(|s| s.created_at);
        seals.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(seals)
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<SealId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .seals
            .values()
            .filter(|s| s.is_expiry_due(now))
            .map(|s| s.id)
            .collect())
    }

    async fn mark_expired(&self, ids: &[SealId], now: DateTime<Utc>) -> Result<Vec<SealId>> {
        let mut tables = self.tables.write().await;
        let mut changed = Vec::new();
        for id in ids {
            if let Some(seal) = tables.seals.get_mut(id) {
                if seal.is_expiry_due(now) {
                    seal.expire(now);
                    seal.version += 1;
                    changed.push(*id);
                }
            }
        }
        Ok(changed)
    }

    async fn count_by_status(&self) -> Result<Vec<(SealStatus, u64)>> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<SealStatus, u64> = HashMap::new();
        for seal in tables.seals.values() {
            *counts.entry(seal.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

/// In-memory shipment directory
#[derive(Default)]
pub struct InMemoryShipmentDirectory {
    shipments: RwLock<HashSet<ShipmentRef>>,
}

impl InMemoryShipmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shipments<I, S>(shipments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ShipmentRef>,
    {
        Self {
            shipments: RwLock::new(shipments.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn register(&self, shipment_ref: ShipmentRef) {
        self.shipments.write().await.insert(shipment_ref);
    }
}

#[async_trait]
impl ShipmentDirectory for InMemoryShipmentDirectory {
    async fn exists(&self, shipment_ref: &ShipmentRef) -> Result<bool> {
        Ok(self.shipments.read().await.contains(shipment_ref))
    }
}

/// Audit sink that keeps entries in memory
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}
