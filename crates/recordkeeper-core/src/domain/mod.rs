//! Domain entities and business logic
//!
//! This module contains the core domain types for RecordKeeper:
//! - Newtypes for type-safe identifiers
//! - Personal-data records with consent and retention metadata
//! - Field-level changesets produced by rectification
//! - Audit entries for the append-only ledger
//! - Domain-specific error types

pub mod audit;
pub mod errors;
pub mod newtypes;
pub mod record;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, RequestContext};
pub use errors::{DomainError, LifecycleError};
pub use newtypes::RecordId;
pub use record::{
    Changeset, Consent, ConsentClaim, FieldChange, PersonalData, PiiField, Record, RecordPatch,
    RecordState, Retention, ERASURE_SENTINEL, MAX_RETENTION_PERIOD_DAYS,
};
