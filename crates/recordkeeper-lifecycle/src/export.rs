//! ExportCompiler - subject access exports and audited reads
//!
//! An export is a processing event in its own right, so compiling one
//! appends an `exported` entry. The payload's audit log ends with that
//! entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recordkeeper_audit::{AuditLedger, LegalBasis};
use recordkeeper_core::{
    domain::{
        AuditAction, AuditEntry, Changeset, Consent, LifecycleError, PersonalData, Record,
        RecordId, RequestContext,
    },
    ports::IClock,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::record_store::RecordStore;

/// Reads of record and trail tried before an export gives up
const SNAPSHOT_ATTEMPTS: u32 = 3;

// ============================================================================
// Export payload
// ============================================================================

/// Point-in-time export of a record and its full history
///
/// Serializes to the externally consumed DSAR document:
///
/// ```text
/// {
///   exportMetadata: { exportDate, legalBasis: "access-right", retentionPeriodDays },
///   personalData:   { ... },
///   consent:        { marketingGranted, analyticsGranted, consentDate, consentVersion },
///   auditLog:       [ { sequence, action, timestamp, actor, changes? }, ... ],
///   retention:      { createdAt, scheduledDeletion, erased }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub export_metadata: ExportMetadata,
    pub personal_data: PersonalData,
    pub consent: Consent,
    pub audit_log: Vec<ExportedEntry>,
    pub retention: ExportedRetention,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: DateTime<Utc>,
    pub legal_basis: LegalBasis,
    pub retention_period_days: u32,
}

/// Audit entry as shown to the data subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEntry {
    pub sequence: u64,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Changeset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRetention {
    pub created_at: DateTime<Utc>,
    pub scheduled_deletion: DateTime<Utc>,
    pub erased: bool,
}

impl ExportPayload {
    fn compile(record: &Record, history: &[AuditEntry], export_date: DateTime<Utc>) -> Self {
        let retention = record.retention();
        Self {
            export_metadata: ExportMetadata {
                export_date,
                legal_basis: LegalBasis::AccessRight,
                retention_period_days: retention.retention_period_days(),
            },
            personal_data: record.personal_data().clone(),
            consent: record.consent().clone(),
            audit_log: history
                .iter()
                .map(|entry| ExportedEntry {
                    sequence: entry.sequence().unwrap_or_default(),
                    action: entry.action(),
                    timestamp: entry.timestamp(),
                    actor: entry.actor().to_string(),
                    changes: entry.changes().cloned(),
                })
                .collect(),
            retention: ExportedRetention {
                created_at: retention.created_at(),
                scheduled_deletion: retention.scheduled_deletion(),
                erased: retention.is_erased(),
            },
        }
    }
}

// ============================================================================
// ExportCompiler
// ============================================================================

pub struct ExportCompiler {
    store: Arc<RecordStore>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn IClock>,
}

impl ExportCompiler {
    pub fn new(store: Arc<RecordStore>, ledger: Arc<AuditLedger>, clock: Arc<dyn IClock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Compiles the export of record `id` and logs it as `exported`
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `AuditWriteFailure` if the export
    /// could not be logged (no payload is returned then),
    /// `ConcurrentModification` if the record kept changing while it was
    /// being read.
    pub async fn compile_export(
        &self,
        id: &RecordId,
        ctx: &RequestContext,
    ) -> Result<ExportPayload, LifecycleError> {
        let (record, mut history) = self.snapshot(id).await?;

        let now = self.clock.now();
        let entry = AuditEntry::new(*id, AuditAction::Exported, now, ctx)
            .with_purpose("subject access request")
            .with_legal_basis(LegalBasis::AccessRight.as_str());
        let sequence = self.ledger.append(&entry).await?;
        history.push(entry.with_sequence(sequence));

        info!(
            record_id = %id,
            entries = history.len(),
            erased = record.is_erased(),
            sequence,
            "Record exported"
        );
        Ok(ExportPayload::compile(&record, &history, now))
    }

    /// Reads the record and a trail that accounts for exactly its version
    ///
    /// The two reads are separate, so a write landing between them shows up
    /// as a trail with more mutations than the record has versions. Such a
    /// pair is discarded and read again.
    async fn snapshot(&self, id: &RecordId) -> Result<(Record, Vec<AuditEntry>), LifecycleError> {
        let mut attempt = 0;
        loop {
            let record = self.store.get(id).await?;
            let history = self.ledger.read_all(id).await?;
            let mutations = history.iter().filter(|e| e.action().is_mutation()).count() as u64;
            if mutations == record.version() {
                return Ok((record, history));
            }

            attempt += 1;
            warn!(
                record_id = %id,
                version = record.version(),
                mutations,
                attempt,
                "Record changed during export read"
            );
            if attempt >= SNAPSHOT_ATTEMPTS {
                return Err(LifecycleError::ConcurrentModification {
                    id: *id,
                    expected: record.version(),
                });
            }
        }
    }

    /// Returns the current record for a stated purpose and logs it as `accessed`
    pub async fn inspect(
        &self,
        id: &RecordId,
        ctx: &RequestContext,
        purpose: &str,
    ) -> Result<Record, LifecycleError> {
        let record = self.store.get(id).await?;

        let entry = AuditEntry::new(*id, AuditAction::Accessed, self.clock.now(), ctx)
            .with_purpose(purpose)
            .with_legal_basis(LegalBasis::Consent.as_str());
        let sequence = self.ledger.append(&entry).await?;

        info!(record_id = %id, sequence, "Record accessed");
        Ok(record)
    }
}
