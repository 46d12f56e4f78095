//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRecordRepository`] - Version-guarded record storage and the audit table
//! - [`IClock`] - Source of the current time, injected for testability

pub mod clock;
pub mod record_repository;

pub use clock::{FixedClock, IClock, SystemClock};
pub use record_repository::{IRecordRepository, RecordFilter, WriteError};
