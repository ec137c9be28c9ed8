//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};

use agri_seal::crypto::SealSigningKey;
use agri_seal::domain::{Seal, SerialNumber, ShipmentRef, VerifySealRequest};
use agri_seal::infra::{
    InMemoryAuditSink, InMemorySealRepository, InMemoryShipmentDirectory, KeyCustody, MasterKey,
};
use agri_seal::service::SealService;

/// Shipment registered in every test directory
pub const SHIPMENT: &str = "SHP-42";

/// Seal service over in-memory collaborators
pub struct TestContext {
    pub service: Arc<SealService>,
    pub repository: Arc<InMemorySealRepository>,
    pub audit: Arc<InMemoryAuditSink>,
    pub custody: KeyCustody,
}

impl TestContext {
    pub fn new() -> Self {
        let repository = Arc::new(InMemorySealRepository::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let custody = KeyCustody::new(MasterKey::ephemeral());
        let service = Arc::new(SealService::new(
            repository.clone(),
            Arc::new(InMemoryShipmentDirectory::with_shipments([SHIPMENT, "SHP-43"])),
            audit.clone(),
            custody.clone(),
        ));
        Self {
            service,
            repository,
            audit,
            custody,
        }
    }

    /// Provision and attach to [`SHIPMENT`], returning the seal and its genuine tag
    pub async fn attached_seal(&self, serial: &str) -> (Seal, GenuineTag) {
        self.attached_seal_expiring(serial, None).await
    }

    pub async fn attached_seal_expiring(
        &self,
        serial: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> (Seal, GenuineTag) {
        let provisioned = self
            .service
            .provision_seal(serial, expires_at)
            .await
            .expect("provision");
        let seal = self
            .service
            .attach_seal(
                provisioned.seal.id,
                ShipmentRef::new(SHIPMENT),
                "field-agent",
                None,
            )
            .await
            .expect("attach");
        let tag = GenuineTag::new(self.custody.unseal(&seal).expect("unseal"), &seal);
        (seal, tag)
    }

    pub async fn current_seal(&self, seal: &Seal) -> Seal {
        self.service.get_seal(seal.id).await.expect("seal exists")
    }
}

/// Simulates the physical NFC tag: holds the private key and an on-chip
/// counter that advances on every read.
pub struct GenuineTag {
    key: SealSigningKey,
    serial_number: SerialNumber,
    counter: u64,
}

impl GenuineTag {
    pub fn new(key: SealSigningKey, seal: &Seal) -> Self {
        Self {
            key,
            serial_number: seal.serial_number.clone(),
            counter: seal.actual_read_count,
        }
    }

    /// Answer the challenge currently stored on the seal
    pub fn read(&mut self, seal: &Seal) -> VerifySealRequest {
        self.counter += 1;
        VerifySealRequest::new(
            self.serial_number.clone(),
            self.key.sign_challenge(seal.challenge.as_bytes()).to_vec(),
            self.counter,
            "inspector-7",
        )
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

/// A counterfeit tag built without the sealed private key
pub fn cloned_tag_read(seal: &Seal, claimed_counter: u64) -> VerifySealRequest {
    let impostor = SealSigningKey::generate();
    VerifySealRequest::new(
        seal.serial_number.clone(),
        impostor.sign_challenge(seal.challenge.as_bytes()).to_vec(),
        claimed_counter,
        "inspector-7",
    )
}
