//! RecordKeeper Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Record`, `PersonalData`, `Consent`, `Retention`, `AuditEntry`
//! - **Port definitions** - Traits for adapters: `IRecordRepository`, `IClock`
//! - **Configuration** - Typed YAML configuration with validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The lifecycle services in `recordkeeper-lifecycle` orchestrate domain
//! entities through these port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
