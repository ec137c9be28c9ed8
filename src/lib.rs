//! agri-seal
//!
//! Lifecycle and challenge-response verification for tamper-evident NFC seals
//! on agricultural shipments.
//!
//! ## Modules
//!
//! - [`domain`] - Seal entity, state machine, verification records, integrity score
//! - [`protocol`] - Signature check, counter anomaly detection, challenge rotation
//! - [`crypto`] - Ed25519 tag keys and AES-256-GCM key encryption at rest
//! - [`infra`] - Repositories (PostgreSQL, in-memory), key custody, audit log
//! - [`service`] - The seal service and the expiry sweeper
//! - [`api`] - REST API routes

pub mod api;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod migrations;
pub mod protocol;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use domain::{
    Challenge, GeoLocation, IntegrityReport, Seal, SealId, SealStatus, SerialNumber, ShipmentRef,
    TamperIndicator, VerificationAttempt, VerificationOutcome, VerifySealRequest,
};

pub use infra::{ErrorKind, Result, SealError};
pub use service::SealService;
