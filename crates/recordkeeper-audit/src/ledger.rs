//! AuditLedger - append-only, per-record sequenced audit log
//!
//! Wraps the audit half of `IRecordRepository`. Unlike best-effort activity
//! logging, every failure here is fatal to the enclosing operation: an
//! entry that cannot be written aborts the operation it describes.
//!
//! Two write paths exist:
//! - [`AuditLedger::commit`] pairs a record mutation with its entry and
//!   applies both atomically (created, rectified, erasure_finalized).
//! - [`AuditLedger::append`] records events that change no record state
//!   (accessed, exported, erasure_requested).

use std::sync::Arc;

use recordkeeper_core::{
    domain::{AuditAction, AuditEntry, LifecycleError, Record, RecordId},
    ports::{IRecordRepository, WriteError},
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Append-only audit ledger backed by the record repository.
pub struct AuditLedger {
    repo: Arc<dyn IRecordRepository>,
}

impl AuditLedger {
    /// Creates a new `AuditLedger` backed by the given repository.
    pub fn new(repo: Arc<dyn IRecordRepository>) -> Self {
        Self { repo }
    }

    /// Appends an entry that accompanies no record mutation.
    ///
    /// Returns the sequence number assigned to the entry.
    ///
    /// # Errors
    ///
    /// `AuditWriteFailure` if the entry could not be persisted, or if the
    /// entry describes a mutation (those must go through [`commit`](Self::commit)).
    pub async fn append(&self, entry: &AuditEntry) -> Result<u64, LifecycleError> {
        if entry.action().is_mutation() {
            return Err(LifecycleError::AuditWriteFailure(format!(
                "'{}' entries must be committed together with their mutation",
                entry.action()
            )));
        }

        match self.repo.append_audit(entry).await {
            Ok(sequence) => {
                debug!(
                    record_id = %entry.record_id(),
                    action = %entry.action(),
                    sequence,
                    "Appended audit entry"
                );
                Ok(sequence)
            }
            Err(e) => {
                error!(
                    record_id = %entry.record_id(),
                    action = %entry.action(),
                    error = %e,
                    "Failed to append audit entry"
                );
                Err(LifecycleError::AuditWriteFailure(e.to_string()))
            }
        }
    }

    /// Persists `record` and its describing entry as one atomic unit.
    ///
    /// `expected_version` is `None` for creation and the version the
    /// mutation was computed against otherwise. Returns the sequence number
    /// assigned to the entry.
    ///
    /// # Errors
    ///
    /// - `DuplicateId` when creating over an existing record
    /// - `ConcurrentModification` when the stored version moved on
    /// - `AuditWriteFailure` when the entry could not be written; the record
    ///   write was rolled back with it
    /// - `Storage` for any other adapter failure
    pub async fn commit(
        &self,
        record: &Record,
        expected_version: Option<u64>,
        entry: &AuditEntry,
    ) -> Result<u64, LifecycleError> {
        if entry.record_id() != record.id() || !entry.action().is_mutation() {
            return Err(LifecycleError::AuditWriteFailure(format!(
                "entry '{}' for {} does not describe a mutation of {}",
                entry.action(),
                entry.record_id(),
                record.id()
            )));
        }

        match self.repo.put_if_version(record, expected_version, entry).await {
            Ok(sequence) => {
                debug!(
                    record_id = %record.id(),
                    action = %entry.action(),
                    version = record.version(),
                    sequence,
                    "Committed record mutation"
                );
                Ok(sequence)
            }
            Err(WriteError::AlreadyExists(id)) => Err(LifecycleError::DuplicateId(id)),
            Err(WriteError::VersionConflict { id, expected, actual }) => {
                debug!(record_id = %id, expected, ?actual, "Version conflict on commit");
                Err(LifecycleError::ConcurrentModification { id, expected })
            }
            Err(WriteError::Audit(e)) => {
                error!(
                    record_id = %record.id(),
                    action = %entry.action(),
                    error = %e,
                    "Audit append failed, mutation rolled back"
                );
                Err(LifecycleError::AuditWriteFailure(e.to_string()))
            }
            Err(WriteError::Storage(e)) => {
                error!(record_id = %record.id(), error = %e, "Record write failed");
                Err(LifecycleError::Storage(e.to_string()))
            }
        }
    }

    /// Replays the complete history of a record in append order.
    pub async fn read_all(&self, id: &RecordId) -> Result<Vec<AuditEntry>, LifecycleError> {
        self.repo
            .audit_trail(id)
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))
    }

    /// Replays a record's history and checks it for structural damage.
    pub async fn verify(&self, id: &RecordId) -> Result<LedgerCheck, LifecycleError> {
        let entries = self.read_all(id).await?;
        let violations = check_history(id, &entries);
        for violation in &violations {
            warn!(record_id = %id, %violation, "Audit history violation");
        }
        Ok(LedgerCheck {
            entries: entries.len(),
            violations,
        })
    }
}

// ============================================================================
// History verification
// ============================================================================

/// A structural defect in a record's audit history
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerViolation {
    #[error("entry at position {position} belongs to record {found}")]
    ForeignEntry { position: usize, found: RecordId },

    #[error("expected sequence {expected}, found {found:?}")]
    SequenceGap { expected: u64, found: Option<u64> },

    #[error("history does not start with a 'created' entry")]
    MissingCreation,

    #[error("'created' repeated at sequence {sequence}")]
    DuplicateCreation { sequence: u64 },

    #[error("'erasure_finalized' repeated at sequence {sequence}")]
    DuplicateFinalization { sequence: u64 },

    #[error("'{action}' at sequence {sequence} after erasure was finalized")]
    MutationAfterErasure { sequence: u64, action: AuditAction },
}

/// Result of [`AuditLedger::verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCheck {
    /// Number of entries replayed
    pub entries: usize,
    /// Defects found, empty for an intact history
    pub violations: Vec<LedgerViolation>,
}

impl LedgerCheck {
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks an ordered history against the ledger invariants
///
/// Sequences must run `1..=n` without gaps, the first entry must be
/// `created`, `erasure_finalized` may occur once, and after it only
/// non-mutating entries may follow. An empty history is intact.
pub fn check_history(id: &RecordId, entries: &[AuditEntry]) -> Vec<LedgerViolation> {
    let mut violations = Vec::new();
    let mut finalized = false;

    for (position, entry) in entries.iter().enumerate() {
        let expected = position as u64 + 1;

        if entry.record_id() != id {
            violations.push(LedgerViolation::ForeignEntry {
                position,
                found: *entry.record_id(),
            });
        }
        if entry.sequence() != Some(expected) {
            violations.push(LedgerViolation::SequenceGap {
                expected,
                found: entry.sequence(),
            });
        }

        match entry.action() {
            AuditAction::Created if position == 0 => {}
            AuditAction::Created => {
                violations.push(LedgerViolation::DuplicateCreation { sequence: expected })
            }
            _ if position == 0 => violations.push(LedgerViolation::MissingCreation),
            AuditAction::ErasureFinalized if finalized => {
                violations.push(LedgerViolation::DuplicateFinalization { sequence: expected })
            }
            AuditAction::ErasureFinalized => finalized = true,
            AuditAction::Rectified if finalized => {
                violations.push(LedgerViolation::MutationAfterErasure {
                    sequence: expected,
                    action: AuditAction::Rectified,
                })
            }
            _ => {}
        }
    }

    violations
}
