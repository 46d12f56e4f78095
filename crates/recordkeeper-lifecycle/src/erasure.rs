//! ErasureEngine - idempotent pseudonymizing erasure
//!
//! The first erasure of a record replaces every personal-data value with
//! the sentinel, marks the record erased and commits an
//! `erasure_finalized` entry in the same write. Any later request leaves the
//! record untouched and appends one `erasure_requested` entry.

use std::fmt;
use std::sync::Arc;

use recordkeeper_audit::{AuditLedger, ErasureReason};
use recordkeeper_core::{
    domain::{AuditAction, AuditEntry, LifecycleError, RecordId, RequestContext},
    ports::IClock,
};
use tracing::info;

use crate::record_store::RecordStore;

/// What an erase call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasureOutcome {
    /// The record was pseudonymized by this call
    Finalized { sequence: u64 },
    /// The record was already erased; only the request was logged
    AlreadyErased { sequence: u64 },
}

impl ErasureOutcome {
    /// Sequence number of the entry written by this call
    pub fn sequence(&self) -> u64 {
        match self {
            ErasureOutcome::Finalized { sequence } | ErasureOutcome::AlreadyErased { sequence } => {
                *sequence
            }
        }
    }
}

impl fmt::Display for ErasureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErasureOutcome::Finalized { .. } => write!(f, "erased"),
            ErasureOutcome::AlreadyErased { .. } => write!(f, "already erased"),
        }
    }
}

pub struct ErasureEngine {
    store: Arc<RecordStore>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn IClock>,
}

impl ErasureEngine {
    pub fn new(store: Arc<RecordStore>, ledger: Arc<AuditLedger>, clock: Arc<dyn IClock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Erases record `id`
    ///
    /// Succeeds for an already erased record. A concurrent rectification
    /// that commits first makes this call fail with
    /// `ConcurrentModification`; nothing is applied in that case.
    pub async fn erase(
        &self,
        id: &RecordId,
        ctx: &RequestContext,
        reason: ErasureReason,
    ) -> Result<ErasureOutcome, LifecycleError> {
        let current = self.store.get(id).await?;
        let now = self.clock.now();

        if current.is_erased() {
            let entry = AuditEntry::new(*id, AuditAction::ErasureRequested, now, ctx)
                .with_purpose(reason.as_str())
                .with_legal_basis(reason.legal_basis().as_str());
            let sequence = self.ledger.append(&entry).await?;
            info!(record_id = %id, %reason, sequence, "Repeated erasure request logged");
            return Ok(ErasureOutcome::AlreadyErased { sequence });
        }

        let erased = current.erased(now)?;
        let entry = AuditEntry::new(*id, AuditAction::ErasureFinalized, now, ctx)
            .with_purpose(reason.as_str())
            .with_legal_basis(reason.legal_basis().as_str());
        let sequence = self
            .ledger
            .commit(&erased, Some(current.version()), &entry)
            .await?;

        info!(
            record_id = %id,
            %reason,
            fields = erased.personal_data().len(),
            sequence,
            "Record erased"
        );
        Ok(ErasureOutcome::Finalized { sequence })
    }
}
