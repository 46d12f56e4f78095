//! Retention scheduler - periodic erasure of expired records
//!
//! Every tick scans the repository for records that are not yet erased
//! and whose scheduled deletion has passed, then erases each one with
//! reason `retention_expired`. The sweep keeps no state between ticks:
//! what is due is derived from the persisted `scheduled_deletion` and
//! `erased` fields alone, so sweeping the same instant twice is harmless.
//!
//! ## Cancellation
//!
//! The loop listens to a [`CancellationToken`]. Once cancelled no new sweep
//! starts and a running sweep issues no further erasures. An erasure that
//! is already in flight is awaited, so it either commits together with
//! its audit entry or not at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recordkeeper_audit::ErasureReason;
use recordkeeper_core::{
    domain::{LifecycleError, RecordId, RequestContext},
    ports::{IClock, IRecordRepository, RecordFilter},
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::erasure::{ErasureEngine, ErasureOutcome};

/// Actor recorded on entries written by the sweep
pub const SCHEDULER_COMPONENT: &str = "retention-scheduler";

// ============================================================================
// SweepReport
// ============================================================================

/// Summary of a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records found due for erasure
    pub scanned: usize,
    /// Records erased by this sweep
    pub erased: usize,
    /// Records another caller had erased between scan and erase
    pub already_erased: usize,
    /// Records whose erasure failed; retried on the next tick
    pub failed: usize,
    /// Per-record failures
    pub errors: Vec<(RecordId, LifecycleError)>,
    /// True if cancellation cut the sweep short
    pub interrupted: bool,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }
}

// ============================================================================
// RetentionScheduler
// ============================================================================

pub struct RetentionScheduler {
    repo: Arc<dyn IRecordRepository>,
    erasure: Arc<ErasureEngine>,
    clock: Arc<dyn IClock>,
    interval: Duration,
    cancel: CancellationToken,
}

impl RetentionScheduler {
    pub fn new(
        repo: Arc<dyn IRecordRepository>,
        erasure: Arc<ErasureEngine>,
        clock: Arc<dyn IClock>,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            erasure,
            clock,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` instead of a private token, e.g. a child of the daemon's
    /// shutdown token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a handle that cancels this scheduler
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests shutdown; a running sweep finishes its in-flight erasure
    pub fn stop(&self) {
        info!("Retention scheduler stop requested");
        self.cancel.cancel();
    }

    /// Spawns [`run`](Self::run) on the current runtime
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Sweeps every `interval` until cancelled
    ///
    /// The first sweep runs immediately. A failing scan is logged and
    /// retried on the next tick.
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Retention scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = ticker.tick() => {
                    match self.run_once(self.clock.now()).await {
                        Ok(report) if report.scanned > 0 => info!(
                            scanned = report.scanned,
                            erased = report.erased,
                            already_erased = report.already_erased,
                            failed = report.failed,
                            "Retention sweep completed"
                        ),
                        Ok(_) => debug!("Retention sweep found nothing due"),
                        Err(e) => warn!(error = %e, "Retention sweep could not scan records"),
                    }
                }
            }
        }

        info!("Retention scheduler stopped");
    }

    /// Erases every record due at `now`
    ///
    /// Failures on individual records are collected in the report, not
    /// returned. Only a failed scan is an error.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, LifecycleError> {
        let due = self
            .repo
            .scan_records(&RecordFilter::due_for_erasure(now))
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        let ctx = RequestContext::system(SCHEDULER_COMPONENT);
        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for record in &due {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            match self
                .erasure
                .erase(record.id(), &ctx, ErasureReason::RetentionExpired)
                .await
            {
                Ok(ErasureOutcome::Finalized { .. }) => report.erased += 1,
                Ok(ErasureOutcome::AlreadyErased { .. }) => report.already_erased += 1,
                Err(e) => {
                    warn!(
                        record_id = %record.id(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Retention erasure failed, will retry next sweep"
                    );
                    report.failed += 1;
                    report.errors.push((*record.id(), e));
                }
            }
        }

        debug!(?now, scanned = report.scanned, erased = report.erased, "Sweep finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use recordkeeper_core::{
        domain::{AuditAction, AuditEntry, ConsentClaim, PiiField, Record, ERASURE_SENTINEL},
        ports::WriteError,
    };
    use tokio::sync::{Notify, Semaphore};

    use super::*;
    use crate::testing::{sample_data, t0, Harness, MemoryRepo};

    const TICK: Duration = Duration::from_secs(60);

    fn scheduler(h: &Harness) -> RetentionScheduler {
        RetentionScheduler::new(h.repo.clone(), h.erasure.clone(), h.clock.clone(), TICK)
    }

    async fn create(h: &Harness, days: u32) -> RecordId {
        let id = RecordId::new();
        h.store
            .create_with_retention(
                id,
                sample_data(),
                &ConsentClaim::granted(),
                days,
                &RequestContext::new("registrar"),
            )
            .await
            .unwrap();
        id
    }

    async fn actions(h: &Harness, id: &RecordId) -> Vec<AuditAction> {
        h.ledger
            .read_all(id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.action())
            .collect()
    }

    #[tokio::test]
    async fn test_sweep_erases_exactly_the_due_records() {
        let h = Harness::new(30);
        let due = create(&h, 1).await;
        let boundary = create(&h, 2).await;
        let later = create(&h, 3).await;

        let now = t0() + ChronoDuration::days(2);
        let report = scheduler(&h).run_once(now).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.erased, 2);
        assert!(report.is_clean());

        assert!(h.store.get(&due).await.unwrap().is_erased());
        assert!(h.store.get(&boundary).await.unwrap().is_erased());
        assert!(!h.store.get(&later).await.unwrap().is_erased());

        // Sweeping the same instant again changes nothing
        let again = scheduler(&h).run_once(now).await.unwrap();
        assert_eq!(again, SweepReport::default());
        assert_eq!(
            actions(&h, &due).await,
            vec![AuditAction::Created, AuditAction::ErasureFinalized]
        );
    }

    #[tokio::test]
    async fn test_sweep_entries_name_the_scheduler() {
        let h = Harness::new(30);
        let id = create(&h, 1).await;

        scheduler(&h)
            .run_once(t0() + ChronoDuration::days(2))
            .await
            .unwrap();

        let record = h.store.get(&id).await.unwrap();
        assert_eq!(record.personal_data().get(PiiField::Email), Some(ERASURE_SENTINEL));
        assert_eq!(record.retention().scheduled_deletion(), t0() + ChronoDuration::days(1));

        let history = h.ledger.read_all(&id).await.unwrap();
        assert_eq!(history[1].actor(), "system:retention-scheduler");
        assert_eq!(history[1].purpose(), Some("retention_expired"));
        assert_eq!(history[1].legal_basis(), Some("retention-policy"));
    }

    #[tokio::test]
    async fn test_failed_erasure_is_reported_and_retried() {
        let h = Harness::new(30);
        let id = create(&h, 1).await;
        let sweeper = scheduler(&h);
        let now = t0() + ChronoDuration::days(2);

        h.repo.fail_audit(true);
        let report = sweeper.run_once(now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].0, id);
        assert!(!h.store.get(&id).await.unwrap().is_erased());

        h.repo.fail_audit(false);
        let report = sweeper.run_once(now).await.unwrap();
        assert_eq!(report.erased, 1);
        assert!(h.store.get(&id).await.unwrap().is_erased());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweeps_until_stopped() {
        let h = Harness::new(30);
        let first = create(&h, 1).await;
        h.clock.advance(ChronoDuration::days(2));

        let scheduler = Arc::new(scheduler(&h));
        let handle = scheduler.clone().start();

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.store.get(&first).await.unwrap().is_erased());

        let second = create(&h, 1).await;
        h.clock.advance(ChronoDuration::days(2));
        assert!(!h.store.get(&second).await.unwrap().is_erased());

        tokio::time::sleep(TICK).await;
        assert!(h.store.get(&second).await.unwrap().is_erased());

        scheduler.stop();
        handle.await.unwrap();

        // No sweep runs after the stop
        let third = create(&h, 1).await;
        h.clock.advance(ChronoDuration::days(2));
        tokio::time::sleep(TICK * 3).await;
        assert!(!h.store.get(&third).await.unwrap().is_erased());
    }

    /// Repository that parks every record write until released
    struct ParkedWrites {
        inner: Arc<MemoryRepo>,
        entered: Notify,
        release: Semaphore,
    }

    #[async_trait]
    impl IRecordRepository for ParkedWrites {
        async fn get_record(&self, id: &RecordId) -> anyhow::Result<Option<Record>> {
            self.inner.get_record(id).await
        }

        async fn scan_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
            self.inner.scan_records(filter).await
        }

        async fn put_if_version(
            &self,
            record: &Record,
            expected_version: Option<u64>,
            entry: &AuditEntry,
        ) -> Result<u64, WriteError> {
            if entry.action() == AuditAction::ErasureFinalized {
                self.entered.notify_one();
                let permit = self
                    .release
                    .acquire()
                    .await
                    .map_err(|e| WriteError::Storage(e.into()))?;
                permit.forget();
            }
            self.inner
                .put_if_version(record, expected_version, entry)
                .await
        }

        async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<u64> {
            self.inner.append_audit(entry).await
        }

        async fn audit_trail(&self, id: &RecordId) -> anyhow::Result<Vec<AuditEntry>> {
            self.inner.audit_trail(id).await
        }
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_erasure_commit_and_issues_no_more() {
        let memory = Arc::new(MemoryRepo::default());
        let setup = Harness::with_repo(memory.clone(), 1);
        let a = create(&setup, 1).await;
        let b = create(&setup, 1).await;

        let parked = Arc::new(ParkedWrites {
            inner: memory.clone(),
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        let ledger = Arc::new(recordkeeper_audit::AuditLedger::new(parked.clone()));
        let defaults = recordkeeper_core::config::RecordDefaults::default();
        let store = Arc::new(crate::RecordStore::new(
            parked.clone(),
            ledger.clone(),
            crate::ConsentGate::new(defaults.clone(), setup.clock.clone()),
            setup.clock.clone(),
            defaults,
        ));
        let erasure = Arc::new(ErasureEngine::new(store, ledger, setup.clock.clone()));
        setup.clock.advance(ChronoDuration::days(2));

        let scheduler = Arc::new(RetentionScheduler::new(
            parked.clone(),
            erasure,
            setup.clock.clone(),
            TICK,
        ));
        let handle = scheduler.clone().start();

        // Wait until the first erasure is inside its commit, then cancel
        parked.entered.notified().await;
        scheduler.stop();
        parked.release.add_permits(2);
        handle.await.unwrap();

        let mut erased = Vec::new();
        for id in [a, b] {
            let record = memory.get_record(&id).await.unwrap().unwrap();
            let finalized = memory
                .audit_trail(&id)
                .await
                .unwrap()
                .iter()
                .filter(|e| e.action() == AuditAction::ErasureFinalized)
                .count();
            // Record state and ledger agree for both records
            assert_eq!(finalized, usize::from(record.is_erased()));
            if record.is_erased() {
                erased.push(id);
            }
        }
        assert_eq!(erased.len(), 1, "only the in-flight erasure completes");
    }
}
