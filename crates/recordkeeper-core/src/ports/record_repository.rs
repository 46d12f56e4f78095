//! Record repository port (driven/secondary port)
//!
//! This module defines the interface for persisting records and their
//! audit history.
//!
//! ## Design Notes
//!
//! - Reads use `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, remote document store, etc.) and don't need domain-level
//!   classification.
//! - The single write path, [`IRecordRepository::put_if_version`], returns a
//!   typed [`WriteError`] so the lifecycle services can tell a lost race or
//!   an audit failure apart from an ordinary storage fault.
//! - Records and audit entries live behind the same trait so an adapter can
//!   commit a mutation and its audit entry in one transaction.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{AuditEntry, Record, RecordId};

// ============================================================================
// RecordFilter
// ============================================================================

/// Filter criteria for scanning records
///
/// All fields are optional; when `None`, no filtering is applied for that field.
/// Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use recordkeeper_core::ports::RecordFilter;
///
/// // Records that the retention sweep should erase right now
/// let filter = RecordFilter::due_for_erasure(Utc::now());
/// assert_eq!(filter.erased, Some(false));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Filter by erasure flag
    pub erased: Option<bool>,
    /// Records whose scheduled deletion is at or before this instant
    pub scheduled_deletion_until: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-erased records whose scheduled deletion is at or before `now`
    pub fn due_for_erasure(now: DateTime<Utc>) -> Self {
        Self {
            erased: Some(false),
            scheduled_deletion_until: Some(now),
        }
    }

    /// Sets the erased filter
    pub fn with_erased(mut self, erased: bool) -> Self {
        self.erased = Some(erased);
        self
    }

    /// Sets the scheduled deletion upper bound (inclusive)
    pub fn with_scheduled_deletion_until(mut self, until: DateTime<Utc>) -> Self {
        self.scheduled_deletion_until = Some(until);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.erased.is_none() && self.scheduled_deletion_until.is_none()
    }

    /// Evaluates the filter against a record
    ///
    /// Adapters that cannot push the predicate down to storage use this.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(erased) = self.erased {
            if record.is_erased() != erased {
                return false;
            }
        }
        if let Some(until) = self.scheduled_deletion_until {
            if record.retention().scheduled_deletion() > until {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// WriteError
// ============================================================================

/// Failure of an atomic record write
///
/// Whatever the variant, neither the record nor the audit entry was applied.
#[derive(Debug, Error)]
pub enum WriteError {
    /// An insert found an existing record with the same id
    #[error("record {0} already exists")]
    AlreadyExists(RecordId),

    /// The stored version did not match the expected version
    #[error("version conflict on record {id}: expected {expected}, found {actual:?}")]
    VersionConflict {
        id: RecordId,
        expected: u64,
        /// Stored version, or `None` if the record disappeared
        actual: Option<u64>,
    },

    /// The audit entry could not be appended
    #[error("audit append failed: {0}")]
    Audit(#[source] anyhow::Error),

    /// The record could not be written
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

// ============================================================================
// IRecordRepository trait
// ============================================================================

/// Port trait for record and audit persistence
///
/// ## Implementation Notes
///
/// - `put_if_version` must be atomic across the record row and the audit
///   entry: both are applied, or neither is.
/// - Audit sequence numbers are assigned by the adapter, per record,
///   starting at 1 and increasing by one on every append. Entries are never
///   updated or deleted.
/// - No operation may hold a lock across calls; concurrency control is the
///   compare-and-set on `version` only.
#[async_trait::async_trait]
pub trait IRecordRepository: Send + Sync {
    // --- Record operations ---

    /// Retrieves a record by id
    async fn get_record(&self, id: &RecordId) -> anyhow::Result<Option<Record>>;

    /// Returns all records matching the filter, in no particular order
    async fn scan_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Record>>;

    /// Writes `record` and appends `entry` atomically
    ///
    /// With `expected_version == None` the record must not exist yet. With
    /// `Some(v)` the stored version must equal `v`; the record is then
    /// replaced by `record` (whose version is `v + 1`).
    ///
    /// Returns the sequence number assigned to `entry`.
    async fn put_if_version(
        &self,
        record: &Record,
        expected_version: Option<u64>,
        entry: &AuditEntry,
    ) -> Result<u64, WriteError>;

    // --- Audit operations ---

    /// Appends an entry that accompanies no record mutation
    ///
    /// Returns the sequence number assigned to `entry`.
    async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<u64>;

    /// Retrieves the full audit history of a record in sequence order
    async fn audit_trail(&self, id: &RecordId) -> anyhow::Result<Vec<AuditEntry>>;
}
