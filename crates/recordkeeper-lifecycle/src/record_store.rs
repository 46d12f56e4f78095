//! RecordStore - record identity, creation and rectification
//!
//! Owns the create and rectify transitions. Each write is a compare-and-set
//! on the record version paired with its audit entry, committed through
//! [`AuditLedger::commit`]. Lost races surface as
//! `ConcurrentModification`; retrying is left to the caller.

use std::sync::Arc;

use recordkeeper_audit::{AuditLedger, LegalBasis};
use recordkeeper_core::{
    config::RecordDefaults,
    domain::{
        AuditAction, AuditEntry, Changeset, ConsentClaim, LifecycleError, PersonalData, Record,
        RecordId, RecordPatch, RequestContext,
    },
    ports::{IClock, IRecordRepository, RecordFilter},
};
use tracing::{debug, info};

use crate::consent::ConsentGate;

/// Creates, rectifies and looks up records
pub struct RecordStore {
    repo: Arc<dyn IRecordRepository>,
    ledger: Arc<AuditLedger>,
    gate: ConsentGate,
    clock: Arc<dyn IClock>,
    defaults: RecordDefaults,
}

impl RecordStore {
    pub fn new(
        repo: Arc<dyn IRecordRepository>,
        ledger: Arc<AuditLedger>,
        gate: ConsentGate,
        clock: Arc<dyn IClock>,
        defaults: RecordDefaults,
    ) -> Self {
        Self {
            repo,
            ledger,
            gate,
            clock,
            defaults,
        }
    }

    /// Creates a record with the default retention period
    ///
    /// # Errors
    ///
    /// `ConsentMissing` unless marketing consent is granted, `DuplicateId`
    /// if `id` is taken, `AuditWriteFailure` if the `created` entry could not
    /// be written (the record is then not persisted either).
    pub async fn create(
        &self,
        id: RecordId,
        personal_data: PersonalData,
        claim: &ConsentClaim,
        ctx: &RequestContext,
    ) -> Result<Record, LifecycleError> {
        self.create_with_retention(
            id,
            personal_data,
            claim,
            self.defaults.retention_period_days,
            ctx,
        )
        .await
    }

    /// Creates a record with an explicit retention period in days
    pub async fn create_with_retention(
        &self,
        id: RecordId,
        personal_data: PersonalData,
        claim: &ConsentClaim,
        retention_period_days: u32,
        ctx: &RequestContext,
    ) -> Result<Record, LifecycleError> {
        let consent = self.gate.validate(claim)?;
        let now = self.clock.now();
        let record = Record::new(id, personal_data, consent, now, retention_period_days)?;

        let entry = AuditEntry::new(id, AuditAction::Created, now, ctx)
            .with_legal_basis(LegalBasis::Consent.as_str());
        let sequence = self.ledger.commit(&record, None, &entry).await?;

        info!(
            record_id = %id,
            fields = record.personal_data().len(),
            retention_period_days,
            sequence,
            "Record created"
        );
        Ok(record)
    }

    /// Applies `patch` to the current state of record `id`
    ///
    /// Returns the field-level changeset. Fields set to their current value
    /// are left out; an empty changeset means nothing was written and no
    /// entry was appended.
    ///
    /// # Errors
    ///
    /// `NotFound`, `ErasureFinalized` for an erased record,
    /// `ConcurrentModification` if the record changed since it was read.
    pub async fn rectify(
        &self,
        id: &RecordId,
        patch: &RecordPatch,
        ctx: &RequestContext,
    ) -> Result<Changeset, LifecycleError> {
        let current = self.get(id).await?;
        if current.is_erased() {
            return Err(LifecycleError::ErasureFinalized(*id));
        }

        let (next, changes) = current.rectified(patch)?;
        if changes.is_empty() {
            debug!(record_id = %id, "Rectification changes nothing, skipping write");
            return Ok(changes);
        }

        let entry = AuditEntry::new(*id, AuditAction::Rectified, self.clock.now(), ctx)
            .with_changes(changes.clone())
            .with_legal_basis(LegalBasis::RectificationRight.as_str());
        let sequence = self
            .ledger
            .commit(&next, Some(current.version()), &entry)
            .await?;

        info!(
            record_id = %id,
            fields = ?changes.fields(),
            version = next.version(),
            sequence,
            "Record rectified"
        );
        Ok(changes)
    }

    /// Returns the current state of record `id`; not audited
    pub async fn get(&self, id: &RecordId) -> Result<Record, LifecycleError> {
        self.repo
            .get_record(id)
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?
            .ok_or(LifecycleError::NotFound(*id))
    }

    /// Returns every record matching `filter`; not audited
    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>, LifecycleError> {
        self.repo
            .scan_records(filter)
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))
    }
}
