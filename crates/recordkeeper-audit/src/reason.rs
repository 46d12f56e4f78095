//! Reason and legal-basis codes for audit entries
//!
//! Provides the structured codes written into the `purpose` and
//! `legal_basis` fields of audit entries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lawful basis referenced by an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LegalBasis {
    /// Processing based on the subject's recorded consent
    Consent,
    /// The subject's right to have inaccurate data corrected
    RectificationRight,
    /// The subject's right to erasure
    ErasureRight,
    /// Erasure mandated by the retention schedule
    RetentionPolicy,
    /// The subject's right of access
    AccessRight,
}

impl LegalBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegalBasis::Consent => "consent",
            LegalBasis::RectificationRight => "rectification-right",
            LegalBasis::ErasureRight => "erasure-right",
            LegalBasis::RetentionPolicy => "retention-policy",
            LegalBasis::AccessRight => "access-right",
        }
    }
}

impl fmt::Display for LegalBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record is being erased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasureReason {
    /// The data subject asked for erasure
    SubjectRequest,
    /// The record passed its scheduled deletion date
    RetentionExpired,
}

impl ErasureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErasureReason::SubjectRequest => "subject_request",
            ErasureReason::RetentionExpired => "retention_expired",
        }
    }

    /// Legal basis under which this kind of erasure happens
    pub fn legal_basis(&self) -> LegalBasis {
        match self {
            ErasureReason::SubjectRequest => LegalBasis::ErasureRight,
            ErasureReason::RetentionExpired => LegalBasis::RetentionPolicy,
        }
    }
}

impl fmt::Display for ErasureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErasureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject_request" => Ok(ErasureReason::SubjectRequest),
            "retention_expired" => Ok(ErasureReason::RetentionExpired),
            other => Err(format!("unknown erasure reason: {other}")),
        }
    }
}
