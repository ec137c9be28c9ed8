//! Infrastructure layer for the seal service
//!
//! Contains trait definitions and implementations for:
//! - Seal storage (PostgreSQL, in-memory)
//! - Shipment existence lookups
//! - Audit logging (seal lifecycle operations)
//! - Master-key configuration and private-key custody
//! - Graceful shutdown (signal handling, background tasks)

mod audit;
mod error;
mod graceful_shutdown;
mod key_custody;
pub mod memory;
pub mod postgres;
mod traits;

pub use audit::{
    AuditAction, AuditLogBuilder, AuditLogEntry, AuditQueryFilters, PgAuditLogger,
    TracingAuditSink, SEAL_RESOURCE,
};
pub use error::*;
pub use graceful_shutdown::{
    shutdown_signal, spawn_until_shutdown, ShutdownCoordinator, ShutdownSignal,
};
pub use key_custody::{parse_32_byte_key, AppEnvironment, KeyCustody, MasterKey, MASTER_KEY_ENV};
pub use memory::{InMemoryAuditSink, InMemorySealRepository, InMemoryShipmentDirectory};
pub use postgres::{PgSealRepository, PgShipmentDirectory};
pub use traits::*;
