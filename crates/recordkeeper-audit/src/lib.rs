//! RecordKeeper Audit - Append-only audit ledger
//!
//! Provides:
//! - `AuditLedger`: sequenced appends, mutation-paired commits and full replay
//! - `LegalBasis`: reference codes recorded on every entry
//! - `ErasureReason`: why a record was pseudonymized
//! - Integration with `IRecordRepository` for persistent audit storage

pub mod ledger;
pub mod reason;

pub use ledger::{check_history, AuditLedger, LedgerCheck, LedgerViolation};
pub use reason::{ErasureReason, LegalBasis};
