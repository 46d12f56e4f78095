//! Integration tests for SqliteRecordRepository
//!
//! Each test opens a fresh in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};

use recordkeeper_core::domain::{
    AuditAction, AuditEntry, Consent, PersonalData, PiiField, Record, RecordId, RecordPatch,
    RequestContext, ERASURE_SENTINEL,
};
use recordkeeper_core::ports::{IRecordRepository, RecordFilter, WriteError};
use recordkeeper_store::{DatabasePool, SqliteRecordRepository};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> (DatabasePool, SqliteRecordRepository) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = SqliteRecordRepository::new(pool.pool().clone());
    (pool, repo)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap() + Duration::microseconds(250)
}

fn make_record(created_at: DateTime<Utc>, days: u32) -> Record {
    let data = PersonalData::new()
        .with(PiiField::Name, "Mary Jackson")
        .unwrap()
        .with(PiiField::Email, "mary@example.org")
        .unwrap()
        .with(PiiField::DateOfBirth, "1921-04-09")
        .unwrap();
    let consent = Consent {
        marketing_granted: false,
        analytics_granted: true,
        consent_date: created_at,
        consent_version: "1.0".to_string(),
    };
    Record::new(RecordId::new(), data, consent, created_at, days).unwrap()
}

fn entry_for(record: &Record, action: AuditAction) -> AuditEntry {
    let ctx = RequestContext::new("clerk")
        .with_source_ip("198.51.100.4")
        .with_user_agent("tests/1.0");
    AuditEntry::new(*record.id(), action, t0(), &ctx)
}

async fn insert(repo: &SqliteRecordRepository, record: &Record) {
    let seq = repo
        .put_if_version(record, None, &entry_for(record, AuditAction::Created))
        .await
        .unwrap();
    assert_eq!(seq, 1);
}

// ============================================================================
// Record operations
// ============================================================================

#[tokio::test]
async fn test_insert_and_get_round_trip() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let loaded = repo.get_record(record.id()).await.unwrap().unwrap();
    assert_eq!(loaded, record);
    assert!(repo.get_record(&RecordId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_existing_id_is_rejected() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let err = repo
        .put_if_version(&record, None, &entry_for(&record, AuditAction::Created))
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::AlreadyExists(id) if id == *record.id()));

    // The rejected write left no extra audit entry
    assert_eq!(repo.audit_trail(record.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_with_stale_version_conflicts() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let (updated, changes) = record
        .rectified(&RecordPatch::new().set(PiiField::Name, "Mary W. Jackson"))
        .unwrap();
    let entry = entry_for(&record, AuditAction::Rectified).with_changes(changes);

    let seq = repo.put_if_version(&updated, Some(1), &entry).await.unwrap();
    assert_eq!(seq, 2);

    // A second writer that also read version 1 loses
    let err = repo
        .put_if_version(&updated, Some(1), &entry)
        .await
        .unwrap_err();
    match err {
        WriteError::VersionConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, Some(2));
        }
        other => panic!("expected version conflict, got {other:?}"),
    }

    let stored = repo.get_record(record.id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 2);
    assert_eq!(stored.personal_data().get(PiiField::Name), Some("Mary W. Jackson"));
}

#[tokio::test]
async fn test_update_of_missing_record_conflicts() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    let erased = record.erased(t0()).unwrap();

    let err = repo
        .put_if_version(&erased, Some(1), &entry_for(&record, AuditAction::ErasureFinalized))
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::VersionConflict { actual: None, .. }));
}

#[tokio::test]
async fn test_erased_record_persists_sentinel_and_timestamp() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let erased_at = t0() + Duration::days(31);
    let erased = record.erased(erased_at).unwrap();
    repo.put_if_version(
        &erased,
        Some(1),
        &entry_for(&record, AuditAction::ErasureFinalized),
    )
    .await
    .unwrap();

    let stored = repo.get_record(record.id()).await.unwrap().unwrap();
    assert!(stored.is_erased());
    assert_eq!(stored.retention().erased_at(), Some(erased_at));
    assert_eq!(stored.personal_data().get(PiiField::Email), Some(ERASURE_SENTINEL));
    assert_eq!(stored.consent().consent_version, "1.0");
}

#[tokio::test]
async fn test_scan_due_records() {
    let (_pool, repo) = setup().await;
    let short = make_record(t0(), 1);
    let long = make_record(t0(), 90);
    let gone = make_record(t0(), 1);
    for record in [&short, &long, &gone] {
        insert(&repo, record).await;
    }
    repo.put_if_version(
        &gone.erased(t0()).unwrap(),
        Some(1),
        &entry_for(&gone, AuditAction::ErasureFinalized),
    )
    .await
    .unwrap();

    let now = t0() + Duration::days(2);
    let due = repo
        .scan_records(&RecordFilter::due_for_erasure(now))
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id(), short.id());

    // The boundary instant is inclusive
    let exact = short.retention().scheduled_deletion();
    let due = repo
        .scan_records(&RecordFilter::due_for_erasure(exact))
        .await
        .unwrap();
    assert_eq!(due.len(), 1);

    let all = repo.scan_records(&RecordFilter::new()).await.unwrap();
    assert_eq!(all.len(), 3);
    let erased = repo
        .scan_records(&RecordFilter::new().with_erased(true))
        .await
        .unwrap();
    assert_eq!(erased.len(), 1);
}

// ============================================================================
// Audit operations
// ============================================================================

#[tokio::test]
async fn test_sequences_are_per_record() {
    let (_pool, repo) = setup().await;
    let a = make_record(t0(), 30);
    let b = make_record(t0(), 30);
    insert(&repo, &a).await;
    insert(&repo, &b).await;

    assert_eq!(repo.append_audit(&entry_for(&a, AuditAction::Exported)).await.unwrap(), 2);
    assert_eq!(repo.append_audit(&entry_for(&a, AuditAction::Accessed)).await.unwrap(), 3);
    assert_eq!(repo.append_audit(&entry_for(&b, AuditAction::Exported)).await.unwrap(), 2);

    let trail = repo.audit_trail(a.id()).await.unwrap();
    let sequences: Vec<_> = trail.iter().filter_map(|e| e.sequence()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(trail[0].actor(), "clerk");
    assert_eq!(trail[0].source_ip(), Some("198.51.100.4"));
    assert_eq!(trail[0].timestamp(), t0());
}

#[tokio::test]
async fn test_changeset_round_trips_through_audit_log() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let (updated, changes) = record
        .rectified(&RecordPatch::new().clear(PiiField::DateOfBirth))
        .unwrap();
    let entry = entry_for(&record, AuditAction::Rectified)
        .with_changes(changes.clone())
        .with_purpose("subject correction")
        .with_legal_basis("rectification-right");
    repo.put_if_version(&updated, Some(1), &entry).await.unwrap();

    let trail = repo.audit_trail(record.id()).await.unwrap();
    assert_eq!(trail[1].changes(), Some(&changes));
    assert_eq!(trail[1].purpose(), Some("subject correction"));
    assert_eq!(trail[1].legal_basis(), Some("rectification-right"));
}

#[tokio::test]
async fn test_audit_log_rejects_update_and_delete() {
    let (pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    let update = sqlx::query("UPDATE audit_log SET actor = 'intruder'")
        .execute(pool.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM audit_log").execute(pool.pool()).await;
    assert!(delete.is_err());

    assert_eq!(repo.audit_trail(record.id()).await.unwrap()[0].actor(), "clerk");
}

#[tokio::test]
async fn test_audit_failure_rolls_back_record_write() {
    let (pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    insert(&repo, &record).await;

    // Make every further audit insert fail
    sqlx::raw_sql(
        "CREATE TRIGGER audit_log_offline BEFORE INSERT ON audit_log \
         BEGIN SELECT RAISE(ABORT, 'audit sink offline'); END;",
    )
    .execute(pool.pool())
    .await
    .unwrap();

    let erased = record.erased(t0()).unwrap();
    let err = repo
        .put_if_version(&erased, Some(1), &entry_for(&record, AuditAction::ErasureFinalized))
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::Audit(_)));

    let stored = repo.get_record(record.id()).await.unwrap().unwrap();
    assert!(!stored.is_erased());
    assert_eq!(stored.version(), 1);

    let fresh = make_record(t0(), 30);
    let err = repo
        .put_if_version(&fresh, None, &entry_for(&fresh, AuditAction::Created))
        .await
        .unwrap_err();
    assert!(matches!(err, WriteError::Audit(_)));
    assert!(repo.get_record(fresh.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_append_for_unknown_record_fails() {
    let (_pool, repo) = setup().await;
    let record = make_record(t0(), 30);
    assert!(repo
        .append_audit(&entry_for(&record, AuditAction::Accessed))
        .await
        .is_err());
}
