//! End-to-end lifecycle scenarios over an in-memory SQLite store
//!
//! Components are wired the same way the daemon wires them, with a
//! `FixedClock` in place of the system clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use recordkeeper_audit::{AuditLedger, ErasureReason};
use recordkeeper_core::{
    config::RecordDefaults,
    domain::{
        AuditAction, ConsentClaim, LifecycleError, PersonalData, PiiField, RecordId, RecordPatch,
        RequestContext, ERASURE_SENTINEL,
    },
    ports::{FixedClock, IClock, IRecordRepository},
};
use recordkeeper_lifecycle::{
    ConsentGate, ErasureEngine, ExportCompiler, RecordStore, RetentionScheduler,
};
use recordkeeper_store::{DatabasePool, SqliteRecordRepository};

// ============================================================================
// Test helpers
// ============================================================================

struct System {
    _pool: DatabasePool,
    clock: Arc<FixedClock>,
    ledger: Arc<AuditLedger>,
    store: Arc<RecordStore>,
    erasure: Arc<ErasureEngine>,
    export: ExportCompiler,
    scheduler: RetentionScheduler,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 15, 0).unwrap()
}

async fn system(retention_period_days: u32) -> System {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo: Arc<dyn IRecordRepository> = Arc::new(SqliteRecordRepository::new(pool.pool().clone()));
    let clock = Arc::new(FixedClock::new(t0()));
    let defaults = RecordDefaults {
        retention_period_days,
        consent_version: "1.0".to_string(),
    };

    let ledger = Arc::new(AuditLedger::new(repo.clone()));
    let store = Arc::new(RecordStore::new(
        repo.clone(),
        ledger.clone(),
        ConsentGate::new(defaults.clone(), clock.clone()),
        clock.clone(),
        defaults,
    ));
    let erasure = Arc::new(ErasureEngine::new(store.clone(), ledger.clone(), clock.clone()));
    let export = ExportCompiler::new(store.clone(), ledger.clone(), clock.clone());
    let scheduler = RetentionScheduler::new(
        repo,
        erasure.clone(),
        clock.clone(),
        StdDuration::from_secs(3600),
    );

    System {
        _pool: pool,
        clock,
        ledger,
        store,
        erasure,
        export,
        scheduler,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new("case-worker")
        .with_source_ip("192.0.2.33")
        .with_user_agent("recordkeeper-tests")
}

fn person() -> PersonalData {
    PersonalData::new()
        .with(PiiField::Name, "Christine Darden")
        .unwrap()
        .with(PiiField::Email, "christine@example.com")
        .unwrap()
        .with(PiiField::Phone, "+1 555 0142")
        .unwrap()
}

async fn history(sys: &System, id: &RecordId) -> Vec<AuditAction> {
    sys.ledger
        .read_all(id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.action())
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_retention_expiry_erases_record() {
    let sys = system(1).await;
    let id = RecordId::new();
    sys.store
        .create(id, person(), &ConsentClaim::granted(), &ctx())
        .await
        .unwrap();

    sys.clock.advance(Duration::days(2));
    let report = sys.scheduler.run_once(sys.clock.now()).await.unwrap();
    assert_eq!(report.erased, 1);

    let record = sys.store.get(&id).await.unwrap();
    assert!(record.is_erased());
    for (_, value) in record.personal_data().iter() {
        assert_eq!(value, ERASURE_SENTINEL);
    }
    assert_eq!(record.retention().scheduled_deletion(), t0() + Duration::days(1));
    assert_eq!(
        history(&sys, &id).await,
        vec![AuditAction::Created, AuditAction::ErasureFinalized]
    );

    // A second sweep at the same instant finds nothing
    let again = sys.scheduler.run_once(sys.clock.now()).await.unwrap();
    assert_eq!(again.scanned, 0);
}

#[tokio::test]
async fn test_rectify_twice_then_export() {
    let sys = system(365).await;
    let id = RecordId::new();
    sys.store
        .create(id, person(), &ConsentClaim::granted(), &ctx())
        .await
        .unwrap();

    sys.store
        .rectify(
            &id,
            &RecordPatch::new().set(PiiField::Email, "c.darden@example.com"),
            &ctx(),
        )
        .await
        .unwrap();
    sys.store
        .rectify(
            &id,
            &RecordPatch::new().set(PiiField::Phone, "+1 555 0199"),
            &ctx(),
        )
        .await
        .unwrap();

    let payload = sys.export.compile_export(&id, &ctx()).await.unwrap();

    assert_eq!(
        history(&sys, &id).await,
        vec![
            AuditAction::Created,
            AuditAction::Rectified,
            AuditAction::Rectified,
            AuditAction::Exported,
        ]
    );
    let exported: Vec<_> = payload.audit_log.iter().map(|e| e.action).collect();
    assert_eq!(exported, history(&sys, &id).await);
    let sequences: Vec<_> = payload.audit_log.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    assert_eq!(
        payload.personal_data.get(PiiField::Email),
        Some("c.darden@example.com")
    );
    assert_eq!(payload.personal_data.get(PiiField::Phone), Some("+1 555 0199"));
    assert_eq!(payload.personal_data.get(PiiField::Name), Some("Christine Darden"));
    assert!(sys.ledger.verify(&id).await.unwrap().is_intact());
}

#[tokio::test]
async fn test_refused_consent_leaves_no_trace() {
    let sys = system(365).await;
    let id = RecordId::new();
    let claim = ConsentClaim {
        marketing_granted: Some(false),
        ..ConsentClaim::default()
    };

    let err = sys.store.create(id, person(), &claim, &ctx()).await.unwrap_err();
    assert_eq!(err, LifecycleError::ConsentMissing);
    assert_eq!(sys.store.get(&id).await, Err(LifecycleError::NotFound(id)));
    assert!(sys.ledger.read_all(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_erasure_is_final_and_idempotent() {
    let sys = system(365).await;
    let id = RecordId::new();
    sys.store
        .create(id, person(), &ConsentClaim::granted(), &ctx())
        .await
        .unwrap();

    sys.erasure
        .erase(&id, &ctx(), ErasureReason::SubjectRequest)
        .await
        .unwrap();
    let erased = sys.store.get(&id).await.unwrap();

    sys.erasure
        .erase(&id, &ctx(), ErasureReason::SubjectRequest)
        .await
        .unwrap();
    assert_eq!(sys.store.get(&id).await.unwrap(), erased);

    let err = sys
        .store
        .rectify(&id, &RecordPatch::new().set(PiiField::Name, "Someone Else"), &ctx())
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::ErasureFinalized(id));
    assert_eq!(sys.store.get(&id).await.unwrap(), erased);

    assert_eq!(
        history(&sys, &id).await,
        vec![
            AuditAction::Created,
            AuditAction::ErasureFinalized,
            AuditAction::ErasureRequested,
        ]
    );
}

#[tokio::test]
async fn test_audit_sequences_interleave_per_record() {
    let sys = system(365).await;
    let a = RecordId::new();
    let b = RecordId::new();
    for id in [a, b] {
        sys.store
            .create(id, person(), &ConsentClaim::granted(), &ctx())
            .await
            .unwrap();
    }

    sys.export.inspect(&a, &ctx(), "support ticket").await.unwrap();
    sys.export.compile_export(&b, &ctx()).await.unwrap();
    sys.export.compile_export(&a, &ctx()).await.unwrap();

    for id in [a, b] {
        let entries = sys.ledger.read_all(&id).await.unwrap();
        let sequences: Vec<_> = entries.iter().filter_map(|e| e.sequence()).collect();
        let expected: Vec<u64> = (1..=entries.len() as u64).collect();
        assert_eq!(sequences, expected);
        assert!(entries.iter().all(|e| e.record_id() == &id));
    }
}
