//! Audit entry domain entities
//!
//! This module defines the entries of the append-only audit ledger. Every
//! state-changing operation on a record, and every accountable read, is
//! described by exactly one [`AuditEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::RecordId;
use super::record::Changeset;

/// Actions that can be recorded in the audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Record was created after consent was validated
    Created,
    /// Personal data was rectified
    Rectified,
    /// Record was read for a stated purpose
    Accessed,
    /// Record was compiled into a subject access export
    Exported,
    /// Erasure was requested for an already erased record
    ErasureRequested,
    /// Personal data was pseudonymized
    ErasureFinalized,
}

impl AuditAction {
    /// Returns true if this action accompanies a change of persisted record state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            AuditAction::Created | AuditAction::Rectified | AuditAction::ErasureFinalized
        )
    }

    /// Returns the stored name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Rectified => "rectified",
            AuditAction::Accessed => "accessed",
            AuditAction::Exported => "exported",
            AuditAction::ErasureRequested => "erasure_requested",
            AuditAction::ErasureFinalized => "erasure_finalized",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "rectified" => Ok(AuditAction::Rectified),
            "accessed" => Ok(AuditAction::Accessed),
            "exported" => Ok(AuditAction::Exported),
            "erasure_requested" => Ok(AuditAction::ErasureRequested),
            "erasure_finalized" => Ok(AuditAction::ErasureFinalized),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Caller-supplied context recorded on every audit entry
///
/// The core does not authenticate these values, it only records them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub actor: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            source_ip: None,
            user_agent: None,
        }
    }

    /// Context for operations initiated by the system itself
    pub fn system(component: &str) -> Self {
        Self::new(format!("system:{component}"))
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// An entry in a record's audit history
///
/// The sequence number is `None` until the ledger appends the entry; it is
/// then strictly increasing per record and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    record_id: RecordId,
    sequence: Option<u64>,
    action: AuditAction,
    timestamp: DateTime<Utc>,
    actor: String,
    source_ip: Option<String>,
    user_agent: Option<String>,
    changes: Option<Changeset>,
    purpose: Option<String>,
    legal_basis: Option<String>,
}

impl AuditEntry {
    /// Creates a new, unsequenced audit entry
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use recordkeeper_core::domain::{AuditAction, AuditEntry, RecordId, RequestContext};
    ///
    /// let ctx = RequestContext::new("dpo@example.com").with_source_ip("10.0.0.7");
    /// let entry = AuditEntry::new(RecordId::new(), AuditAction::Created, Utc::now(), &ctx);
    /// assert!(entry.sequence().is_none()); // assigned on append
    /// assert_eq!(entry.source_ip(), Some("10.0.0.7"));
    /// ```
    pub fn new(
        record_id: RecordId,
        action: AuditAction,
        timestamp: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            record_id,
            sequence: None,
            action,
            timestamp,
            actor: ctx.actor.clone(),
            source_ip: ctx.source_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            changes: None,
            purpose: None,
            legal_basis: None,
        }
    }

    /// Rebuilds a persisted entry
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        record_id: RecordId,
        sequence: u64,
        action: AuditAction,
        timestamp: DateTime<Utc>,
        actor: String,
        source_ip: Option<String>,
        user_agent: Option<String>,
        changes: Option<Changeset>,
        purpose: Option<String>,
        legal_basis: Option<String>,
    ) -> Self {
        Self {
            record_id,
            sequence: Some(sequence),
            action,
            timestamp,
            actor,
            source_ip,
            user_agent,
            changes,
            purpose,
            legal_basis,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.source_ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn changes(&self) -> Option<&Changeset> {
        self.changes.as_ref()
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn legal_basis(&self) -> Option<&str> {
        self.legal_basis.as_deref()
    }

    /// Sets the sequence number (called by the ledger after append)
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_changes(mut self, changes: Changeset) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn with_legal_basis(mut self, legal_basis: impl Into<String>) -> Self {
        self.legal_basis = Some(legal_basis.into());
        self
    }
}
