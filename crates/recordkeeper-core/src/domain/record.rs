//! Record domain entity
//!
//! This module defines the personal-data [`Record`] together with its
//! consent and retention metadata, and the patch/changeset types used by
//! rectification.
//!
//! ## State Machine
//!
//! ```text
//!                 rectify (changeset)
//!                  ┌────────┐
//!                  ▼        │
//!   create   ┌──────────┐   │     erase      ┌──────────┐
//!  ────────► │  Active  │ ──┴──────────────► │  Erased  │ ◄─┐
//!  (consent) └──────────┘                    └──────────┘   │ erase (inert)
//!                                                 │         │
//!                                                 └─────────┘
//! ```
//!
//! `Erased` is terminal: no transition leaves it, and rectification is
//! rejected. Erasure is pseudonymization, the record itself is retained.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RecordId;

/// Fixed value written over every personal-data field on erasure
pub const ERASURE_SENTINEL: &str = "[ERASED]";

// ============================================================================
// Personal data
// ============================================================================

/// Named personally identifiable fields a record may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiField {
    Name,
    Email,
    Phone,
    DateOfBirth,
    Address,
}

impl PiiField {
    /// All known fields, in canonical order
    pub const ALL: [PiiField; 5] = [
        PiiField::Name,
        PiiField::Email,
        PiiField::Phone,
        PiiField::DateOfBirth,
        PiiField::Address,
    ];

    /// Returns the wire name of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiField::Name => "name",
            PiiField::Email => "email",
            PiiField::Phone => "phone",
            PiiField::DateOfBirth => "dateOfBirth",
            PiiField::Address => "address",
        }
    }

    /// Checks that `value` is acceptable for this field
    pub fn validate(&self, value: &str) -> Result<(), DomainError> {
        let invalid = |message: &str| DomainError::InvalidFieldValue {
            field: self.as_str().to_string(),
            message: message.to_string(),
        };

        if value.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }
        if value == ERASURE_SENTINEL {
            return Err(invalid("reserved value"));
        }

        match self {
            PiiField::Email => {
                let (local, domain) = value
                    .split_once('@')
                    .ok_or_else(|| invalid("missing '@'"))?;
                if local.is_empty() || !domain.contains('.') || domain.starts_with('.') {
                    return Err(invalid("not an email address"));
                }
            }
            PiiField::DateOfBirth => {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| invalid("expected YYYY-MM-DD"))?;
            }
            PiiField::Name | PiiField::Phone | PiiField::Address => {}
        }

        Ok(())
    }
}

impl fmt::Display for PiiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PiiField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(PiiField::Name),
            "email" => Ok(PiiField::Email),
            "phone" => Ok(PiiField::Phone),
            "dateOfBirth" | "date_of_birth" | "date-of-birth" | "dob" => Ok(PiiField::DateOfBirth),
            "address" => Ok(PiiField::Address),
            other => Err(DomainError::UnknownField(other.to_string())),
        }
    }
}

/// Mapping of PII fields to their current values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalData(BTreeMap<PiiField, String>);

impl PersonalData {
    /// Creates an empty set of personal data
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validated field value
    pub fn with(mut self, field: PiiField, value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        field.validate(&value)?;
        self.0.insert(field, value);
        Ok(self)
    }

    /// Returns the value of a field, if present
    pub fn get(&self, field: PiiField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// Iterates over present fields in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (PiiField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if every present field holds the erasure sentinel
    pub fn is_pseudonymized(&self) -> bool {
        self.0.values().all(|value| value == ERASURE_SENTINEL)
    }

    /// Validates every present value
    pub fn validate(&self) -> Result<(), DomainError> {
        self.0
            .iter()
            .try_for_each(|(field, value)| field.validate(value))
    }

    /// Replaces every present value with [`ERASURE_SENTINEL`]
    fn pseudonymize(&mut self) {
        for value in self.0.values_mut() {
            *value = ERASURE_SENTINEL.to_string();
        }
    }
}

// ============================================================================
// Consent
// ============================================================================

/// Consent claim as supplied by a caller, before the gate has checked it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentClaim {
    #[serde(default)]
    pub marketing_granted: Option<bool>,
    #[serde(default)]
    pub analytics_granted: Option<bool>,
    #[serde(default)]
    pub consent_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consent_version: Option<String>,
}

impl ConsentClaim {
    /// A claim with marketing consent granted and everything else defaulted
    pub fn granted() -> Self {
        Self {
            marketing_granted: Some(true),
            ..Self::default()
        }
    }

    /// Sets the analytics consent flag
    pub fn with_analytics(mut self, granted: bool) -> Self {
        self.analytics_granted = Some(granted);
        self
    }

    /// Sets the consent schema version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.consent_version = Some(version.into());
        self
    }

    /// Sets the date consent was given
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.consent_date = Some(date);
        self
    }
}

/// Consent recorded on a stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub marketing_granted: bool,
    pub analytics_granted: bool,
    pub consent_date: DateTime<Utc>,
    pub consent_version: String,
}

// ============================================================================
// Retention
// ============================================================================

/// Longest retention period a record may carry (100 years)
pub const MAX_RETENTION_PERIOD_DAYS: u32 = 36_500;

/// Retention metadata, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    created_at: DateTime<Utc>,
    retention_period_days: u32,
    scheduled_deletion: DateTime<Utc>,
    erased: bool,
    erased_at: Option<DateTime<Utc>>,
}

impl Retention {
    /// Computes retention for a record created at `created_at`
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidRetentionPeriod` when `retention_period_days` is zero,
    /// above [`MAX_RETENTION_PERIOD_DAYS`], or would move the deletion date out of range.
    pub fn new(created_at: DateTime<Utc>, retention_period_days: u32) -> Result<Self, DomainError> {
        if retention_period_days == 0 || retention_period_days > MAX_RETENTION_PERIOD_DAYS {
            return Err(DomainError::InvalidRetentionPeriod(retention_period_days));
        }
        let scheduled_deletion = created_at
            .checked_add_signed(Duration::days(i64::from(retention_period_days)))
            .ok_or(DomainError::InvalidRetentionPeriod(retention_period_days))?;
        Ok(Self {
            created_at,
            retention_period_days,
            scheduled_deletion,
            erased: false,
            erased_at: None,
        })
    }

    /// Rebuilds retention metadata from persisted values
    pub fn restore(
        created_at: DateTime<Utc>,
        retention_period_days: u32,
        scheduled_deletion: DateTime<Utc>,
        erased: bool,
        erased_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            created_at,
            retention_period_days,
            scheduled_deletion,
            erased,
            erased_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn retention_period_days(&self) -> u32 {
        self.retention_period_days
    }

    pub fn scheduled_deletion(&self) -> DateTime<Utc> {
        self.scheduled_deletion
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }

    pub fn erased_at(&self) -> Option<DateTime<Utc>> {
        self.erased_at
    }

    /// Returns true if the record is past its scheduled deletion and not yet erased
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.erased && self.scheduled_deletion <= now
    }
}

// ============================================================================
// Patch and changeset
// ============================================================================

/// Requested changes to personal data
///
/// `Some(value)` sets a field, `None` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordPatch(BTreeMap<PiiField, Option<String>>);

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`
    pub fn set(mut self, field: PiiField, value: impl Into<String>) -> Self {
        self.0.insert(field, Some(value.into()));
        self
    }

    /// Removes `field` from the record
    pub fn clear(mut self, field: PiiField) -> Self {
        self.0.insert(field, None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn validate(&self) -> Result<(), DomainError> {
        self.0.iter().try_for_each(|(field, value)| match value {
            Some(value) => field.validate(value),
            None => Ok(()),
        })
    }
}

/// Old and new value of a single rectified field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Field-level changes applied by one rectification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changeset(BTreeMap<PiiField, FieldChange>);

impl Changeset {
    pub fn get(&self, field: PiiField) -> Option<&FieldChange> {
        self.0.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PiiField, &FieldChange)> {
        self.0.iter().map(|(field, change)| (*field, change))
    }

    /// Names of the changed fields
    pub fn fields(&self) -> Vec<PiiField> {
        self.0.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Record
// ============================================================================

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Created and possibly rectified; personal data is live
    Active,
    /// Pseudonymized; terminal
    Erased,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Active => f.write_str("Active"),
            RecordState::Erased => f.write_str("Erased"),
        }
    }
}

/// A personal-data record with consent and retention metadata
///
/// Records are plain values. Transitions return a new record with the
/// version advanced by one; persisting it is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    id: RecordId,
    personal_data: PersonalData,
    consent: Consent,
    retention: Retention,
    version: u64,
}

impl Record {
    /// Creates a new, not yet persisted record at version 1
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` if any personal-data value is invalid or the
    /// retention period is zero or out of range.
    pub fn new(
        id: RecordId,
        personal_data: PersonalData,
        consent: Consent,
        created_at: DateTime<Utc>,
        retention_period_days: u32,
    ) -> Result<Self, DomainError> {
        personal_data.validate()?;
        let retention = Retention::new(created_at, retention_period_days)?;
        Ok(Self {
            id,
            personal_data,
            consent,
            retention,
            version: 1,
        })
    }

    /// Rebuilds a record from persisted state without validation
    pub fn restore(
        id: RecordId,
        personal_data: PersonalData,
        consent: Consent,
        retention: Retention,
        version: u64,
    ) -> Self {
        Self {
            id,
            personal_data,
            consent,
            retention,
            version,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn personal_data(&self) -> &PersonalData {
        &self.personal_data
    }

    pub fn consent(&self) -> &Consent {
        &self.consent
    }

    pub fn retention(&self) -> &Retention {
        &self.retention
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_erased(&self) -> bool {
        self.retention.erased
    }

    pub fn state(&self) -> RecordState {
        if self.retention.erased {
            RecordState::Erased
        } else {
            RecordState::Active
        }
    }

    /// Computes the rectified record and the changeset describing it
    ///
    /// Fields whose requested value equals the current value are not part
    /// of the changeset. An empty changeset leaves the returned record
    /// identical to `self`, version included.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the record is erased, or a
    /// validation error for an invalid patch value.
    pub fn rectified(&self, patch: &RecordPatch) -> Result<(Record, Changeset), DomainError> {
        if self.is_erased() {
            return Err(DomainError::InvalidState {
                from: RecordState::Erased.to_string(),
                to: RecordState::Active.to_string(),
            });
        }
        patch.validate()?;

        let mut next = self.clone();
        let mut changes = BTreeMap::new();

        for (field, requested) in &patch.0 {
            let current = self.personal_data.0.get(field);
            if current == requested.as_ref() {
                continue;
            }
            changes.insert(
                *field,
                FieldChange {
                    from: current.cloned(),
                    to: requested.clone(),
                },
            );
            match requested {
                Some(value) => {
                    next.personal_data.0.insert(*field, value.clone());
                }
                None => {
                    next.personal_data.0.remove(field);
                }
            }
        }

        if !changes.is_empty() {
            next.version += 1;
        }

        Ok((next, Changeset(changes)))
    }

    /// Computes the pseudonymized form of this record
    ///
    /// Consent version, creation time and scheduled deletion are kept as
    /// compliance evidence. Only fields present on the record receive the
    /// sentinel; a record without personal data is still marked erased and
    /// keeps an empty map.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the record is already erased.
    pub fn erased(&self, at: DateTime<Utc>) -> Result<Record, DomainError> {
        if self.is_erased() {
            return Err(DomainError::InvalidState {
                from: RecordState::Erased.to_string(),
                to: RecordState::Erased.to_string(),
            });
        }

        let mut next = self.clone();
        next.personal_data.pseudonymize();
        next.retention.erased = true;
        next.retention.erased_at = Some(at);
        next.version += 1;
        Ok(next)
    }
}
