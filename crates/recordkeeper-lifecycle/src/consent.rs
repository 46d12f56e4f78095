//! Consent gate
//!
//! Checks a caller's consent claim before a record may be created and
//! turns it into the [`Consent`] stored on the record. Nothing is
//! persisted or logged to the audit ledger here.

use std::sync::Arc;

use recordkeeper_core::{
    config::RecordDefaults,
    domain::{Consent, ConsentClaim, LifecycleError},
    ports::IClock,
};
use tracing::debug;

/// Validates consent claims and stamps their defaults
pub struct ConsentGate {
    defaults: RecordDefaults,
    clock: Arc<dyn IClock>,
}

impl ConsentGate {
    pub fn new(defaults: RecordDefaults, clock: Arc<dyn IClock>) -> Self {
        Self { defaults, clock }
    }

    /// Returns the consent to record, or `ConsentMissing`
    ///
    /// Marketing consent must be explicitly granted. A missing consent
    /// version takes the configured schema version, a missing date takes
    /// the current time and missing analytics consent counts as refused.
    pub fn validate(&self, claim: &ConsentClaim) -> Result<Consent, LifecycleError> {
        if claim.marketing_granted != Some(true) {
            debug!(
                marketing_granted = ?claim.marketing_granted,
                "Consent claim rejected"
            );
            return Err(LifecycleError::ConsentMissing);
        }

        let consent_version = claim
            .consent_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.defaults.consent_version.as_str())
            .to_string();

        Ok(Consent {
            marketing_granted: true,
            analytics_granted: claim.analytics_granted.unwrap_or(false),
            consent_date: claim.consent_date.unwrap_or_else(|| self.clock.now()),
            consent_version,
        })
    }
}
