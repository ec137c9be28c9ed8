//! Error types for the seal service

use thiserror::Error;

use crate::crypto::EncryptionError;
use crate::domain::{InvalidSerialNumber, SealId, SealOperation, SealStatus, SerialNumber};

/// Stable, caller-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    Conflict,
    NotFound,
    InvalidState,
    Expired,
    KeyManagementFailure,
    ConcurrentModification,
    Database,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Expired => "EXPIRED",
            ErrorKind::KeyManagementFailure => "KEY_MANAGEMENT_FAILURE",
            ErrorKind::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the seal service
#[derive(Error, Debug)]
pub enum SealError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed input (serial number, hex, signature length, ...)
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Serial number already provisioned
    #[error("seal with serial number {0} already exists")]
    DuplicateSerialNumber(SerialNumber),

    /// Seal not found
    #[error("seal not found: {0}")]
    SealNotFound(String),

    /// Shipment not found
    #[error("shipment not found: {0}")]
    ShipmentNotFound(String),

    /// Operation not permitted from the seal's current status
    #[error("cannot {operation} seal {seal_id}: status is {status}")]
    InvalidState {
        seal_id: SealId,
        operation: SealOperation,
        status: SealStatus,
    },

    /// Seal passed its expiry timestamp
    #[error("seal {0} has expired")]
    Expired(SealId),

    /// Master key missing/invalid, or sealed key failed to decrypt
    #[error("key management failure: {0}")]
    KeyManagementFailure(String),

    /// Conditional update lost a race with another writer
    #[error("seal {seal_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification {
        seal_id: SealId,
        expected_version: u64,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealError::Database(_) => ErrorKind::Database,
            SealError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            SealError::DuplicateSerialNumber(_) => ErrorKind::Conflict,
            SealError::SealNotFound(_) | SealError::ShipmentNotFound(_) => ErrorKind::NotFound,
            SealError::InvalidState { .. } => ErrorKind::InvalidState,
            SealError::Expired(_) => ErrorKind::Expired,
            SealError::KeyManagementFailure(_) => ErrorKind::KeyManagementFailure,
            SealError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            SealError::Configuration(_) | SealError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<EncryptionError> for SealError {
    fn from(err: EncryptionError) -> Self {
        SealError::KeyManagementFailure(err.to_string())
    }
}

impl From<InvalidSerialNumber> for SealError {
    fn from(err: InvalidSerialNumber) -> Self {
        SealError::InvalidFormat(err.to_string())
    }
}

/// Result type for seal operations
pub type Result<T> = std::result::Result<T, SealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_names_status() {
        let err = SealError::InvalidState {
            seal_id: SealId::new(),
            operation: SealOperation::Verify,
            status: SealStatus::Removed,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(err.to_string().contains("REMOVED"));
        assert!(err.to_string().contains("cannot verify"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            SealError::from(InvalidSerialNumber("x".into())).kind(),
            ErrorKind::InvalidFormat
        );
        assert_eq!(
            SealError::from(EncryptionError::InvalidCiphertext).kind(),
            ErrorKind::KeyManagementFailure
        );
        assert_eq!(
            SealError::ShipmentNotFound("SHP-1".into()).kind().as_str(),
            "NOT_FOUND"
        );
        assert_eq!(SealError::Internal("x".into()).kind().as_str(), "INTERNAL_ERROR");
    }
}
