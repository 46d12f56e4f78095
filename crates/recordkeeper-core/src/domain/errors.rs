//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! - [`DomainError`] for validation failures on values entering the domain
//! - [`LifecycleError`] for the outcomes of record lifecycle operations

use thiserror::Error;

use super::newtypes::RecordId;

/// Errors that can occur while constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown personal-data field name
    #[error("Unknown personal data field: {0}")]
    UnknownField(String),

    /// A personal-data value failed validation
    #[error("Invalid value for {field}: {message}")]
    InvalidFieldValue {
        /// The offending field
        field: String,
        /// Why the value was rejected
        message: String,
    },

    /// Retention period must be a positive number of days
    #[error("Invalid retention period: {0} days")]
    InvalidRetentionPeriod(u32),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

/// Outcome errors of record lifecycle operations
///
/// Only [`LifecycleError::ConcurrentModification`] is recoverable by the
/// caller (re-read and retry). Every other kind is terminal for the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Creation refused: marketing consent was absent or not granted
    #[error("Consent missing: marketing consent must be granted before a record is created")]
    ConsentMissing,

    /// Creation refused: a record with this id already exists
    #[error("Record {0} already exists")]
    DuplicateId(RecordId),

    /// No record with this id exists
    #[error("Record {0} not found")]
    NotFound(RecordId),

    /// Rectification refused because the record has been erased
    #[error("Record {0} has been erased and can no longer be modified")]
    ErasureFinalized(RecordId),

    /// The record changed between read and commit
    #[error("Concurrent modification of record {id}: expected version {expected}")]
    ConcurrentModification {
        /// The record that changed underneath the operation
        id: RecordId,
        /// The version the operation was computed against
        expected: u64,
    },

    /// The audit entry could not be written; the paired mutation was not applied
    #[error("Audit write failed: {0}")]
    AuditWriteFailure(String),

    /// Input rejected by domain validation
    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// The storage adapter failed for a reason unrelated to the audit ledger
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LifecycleError {
    /// Returns true if the caller may re-read the record and retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::ConcurrentModification { .. })
    }

    /// Short machine-readable code, suitable for logs and status mapping
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::ConsentMissing => "consent_missing",
            LifecycleError::DuplicateId(_) => "duplicate_id",
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::ErasureFinalized(_) => "erasure_finalized",
            LifecycleError::ConcurrentModification { .. } => "concurrent_modification",
            LifecycleError::AuditWriteFailure(_) => "audit_write_failure",
            LifecycleError::Invalid(_) => "invalid_input",
            LifecycleError::Storage(_) => "storage_failure",
        }
    }
}
