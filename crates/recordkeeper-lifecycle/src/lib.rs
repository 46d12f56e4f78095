//! Recordkeeper Lifecycle - consent-gated record lifecycle
//!
//! Provides the services that create, rectify, erase and export
//! personal-data records. Every state change is committed together with
//! the audit entry describing it through the
//! [`AuditLedger`](recordkeeper_audit::AuditLedger).
//!
//! ## Modules
//!
//! - [`consent`] - Consent gate run before any record is created
//! - [`record_store`] - Record creation, rectification and lookup
//! - [`erasure`] - Idempotent pseudonymizing erasure
//! - [`retention`] - Periodic, cancellable retention sweep
//! - [`export`] - Subject access export and audited reads
//!
//! ## Wiring
//!
//! Components are constructed explicitly and share the repository, clock
//! and ledger through `Arc`:
//!
//! ```text
//! ConsentGate ──→ RecordStore ──→ ErasureEngine ──→ RetentionScheduler
//!                      │                │
//!                      └── AuditLedger ─┴──→ ExportCompiler
//! ```

pub mod consent;
pub mod erasure;
pub mod export;
pub mod record_store;
pub mod retention;

#[cfg(test)]
pub(crate) mod testing;

pub use consent::ConsentGate;
pub use erasure::{ErasureEngine, ErasureOutcome};
pub use export::{ExportCompiler, ExportPayload};
pub use record_store::RecordStore;
pub use retention::{RetentionScheduler, SweepReport};
