//! SQLite implementation of the IRecordRepository port
//!
//! ## Type Mapping
//!
//! | Domain Type       | SQL Type | Conversion                              |
//! |-------------------|----------|-----------------------------------------|
//! | RecordId          | TEXT     | `to_string()` / `FromStr`               |
//! | DateTime<Utc>     | TEXT     | RFC 3339, microseconds, `Z` suffix      |
//! | bool              | INTEGER  | 0 / 1                                   |
//! | u32 / u64         | INTEGER  | `as i64`                                |
//! | PersonalData      | TEXT     | serde_json object keyed by field name   |
//! | Changeset         | TEXT     | serde_json, NULL when absent            |
//! | AuditAction       | TEXT     | `as_str()` / `FromStr`                  |
//!
//! Timestamps are written in a fixed-width UTC form so that text
//! comparison in SQL agrees with chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use recordkeeper_core::domain::{
    AuditAction, AuditEntry, Changeset, Consent, PersonalData, Record, RecordId, Retention,
};
use recordkeeper_core::ports::{IRecordRepository, RecordFilter, WriteError};

use crate::StoreError;

/// SQLite-backed record and audit repository
pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn to_unsigned(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| {
        StoreError::SerializationError(format!("Negative value {} in column {}", value, column))
    })
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn record_from_row(row: &SqliteRow) -> Result<Record, StoreError> {
    let id_str: String = row.try_get("id")?;
    let personal_data_str: String = row.try_get("personal_data")?;
    let consent_date_str: String = row.try_get("consent_date")?;
    let created_at_str: String = row.try_get("created_at")?;
    let scheduled_deletion_str: String = row.try_get("scheduled_deletion")?;
    let erased_at_str: Option<String> = row.try_get("erased_at")?;
    let retention_period_days: i64 = row.try_get("retention_period_days")?;
    let version: i64 = row.try_get("version")?;

    let id: RecordId = id_str
        .parse()
        .map_err(|e| StoreError::SerializationError(format!("Invalid record id: {}", e)))?;

    let personal_data: PersonalData = serde_json::from_str(&personal_data_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid personal data for {}: {}", id, e))
    })?;

    let consent = Consent {
        marketing_granted: row.try_get("marketing_granted")?,
        analytics_granted: row.try_get("analytics_granted")?,
        consent_date: parse_datetime(&consent_date_str)?,
        consent_version: row.try_get("consent_version")?,
    };

    let retention_period_days = u32::try_from(retention_period_days).map_err(|_| {
        StoreError::SerializationError(format!(
            "Invalid retention period {} for {}",
            retention_period_days, id
        ))
    })?;

    let retention = Retention::restore(
        parse_datetime(&created_at_str)?,
        retention_period_days,
        parse_datetime(&scheduled_deletion_str)?,
        row.try_get("erased")?,
        parse_optional_datetime(erased_at_str)?,
    );

    Ok(Record::restore(
        id,
        personal_data,
        consent,
        retention,
        to_unsigned("version", version)?,
    ))
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, StoreError> {
    let record_id_str: String = row.try_get("record_id")?;
    let sequence: i64 = row.try_get("sequence")?;
    let action_str: String = row.try_get("action")?;
    let timestamp_str: String = row.try_get("timestamp")?;
    let changes_str: Option<String> = row.try_get("changes")?;

    let record_id: RecordId = record_id_str
        .parse()
        .map_err(|e| StoreError::SerializationError(format!("Invalid record id: {}", e)))?;
    let action: AuditAction = action_str
        .parse()
        .map_err(StoreError::SerializationError)?;
    let changes: Option<Changeset> = changes_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StoreError::SerializationError(format!("Invalid changeset: {}", e)))?;

    Ok(AuditEntry::restore(
        record_id,
        to_unsigned("sequence", sequence)?,
        action,
        parse_datetime(&timestamp_str)?,
        row.try_get("actor")?,
        row.try_get("source_ip")?,
        row.try_get("user_agent")?,
        changes,
        row.try_get("purpose")?,
        row.try_get("legal_basis")?,
    ))
}

// ============================================================================
// Statement helpers
// ============================================================================

/// Appends `entry` with the next free sequence number of its record
///
/// The sequence is computed and the row inserted by a single statement,
/// which SQLite executes atomically.
async fn insert_audit<'e, E>(executor: E, entry: &AuditEntry) -> anyhow::Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let record_id = entry.record_id().to_string();
    let changes = entry
        .changes()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Failed to serialize changeset: {}", e))?;

    let sequence: i64 = sqlx::query_scalar(
        "INSERT INTO audit_log \
         (record_id, sequence, action, timestamp, actor, source_ip, user_agent, \
          changes, purpose, legal_basis) \
         SELECT ?, COALESCE(MAX(sequence), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ? \
         FROM audit_log WHERE record_id = ? \
         RETURNING sequence",
    )
    .bind(&record_id)
    .bind(entry.action().as_str())
    .bind(format_datetime(&entry.timestamp()))
    .bind(entry.actor())
    .bind(entry.source_ip())
    .bind(entry.user_agent())
    .bind(&changes)
    .bind(entry.purpose())
    .bind(entry.legal_basis())
    .bind(&record_id)
    .fetch_one(executor)
    .await?;

    Ok(to_unsigned("sequence", sequence)?)
}

/// Inserts a new record row; returns false if the id is taken
async fn insert_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &Record,
    personal_data: &str,
) -> Result<bool, sqlx::Error> {
    let consent = record.consent();
    let retention = record.retention();

    let result = sqlx::query(
        "INSERT INTO records \
         (id, personal_data, marketing_granted, analytics_granted, consent_date, \
          consent_version, created_at, retention_period_days, scheduled_deletion, \
          erased, erased_at, version) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(record.id().to_string())
    .bind(personal_data)
    .bind(consent.marketing_granted)
    .bind(consent.analytics_granted)
    .bind(format_datetime(&consent.consent_date))
    .bind(&consent.consent_version)
    .bind(format_datetime(&retention.created_at()))
    .bind(i64::from(retention.retention_period_days()))
    .bind(format_datetime(&retention.scheduled_deletion()))
    .bind(retention.is_erased())
    .bind(retention.erased_at().map(|dt| format_datetime(&dt)))
    .bind(record.version() as i64)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replaces the mutable columns of a record if its version still matches
async fn update_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &Record,
    personal_data: &str,
    expected_version: u64,
) -> Result<bool, sqlx::Error> {
    let retention = record.retention();

    let result = sqlx::query(
        "UPDATE records \
         SET personal_data = ?, erased = ?, erased_at = ?, version = ? \
         WHERE id = ? AND version = ?",
    )
    .bind(personal_data)
    .bind(retention.is_erased())
    .bind(retention.erased_at().map(|dt| format_datetime(&dt)))
    .bind(record.version() as i64)
    .bind(record.id().to_string())
    .bind(expected_version as i64)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

// ============================================================================
// IRecordRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IRecordRepository for SqliteRecordRepository {
    // --- Record operations ---

    async fn get_record(&self, id: &RecordId) -> anyhow::Result<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn scan_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        let mut sql = String::from("SELECT * FROM records WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(erased) = filter.erased {
            sql.push_str(if erased {
                " AND erased = 1"
            } else {
                " AND erased = 0"
            });
        }

        if let Some(ref until) = filter.scheduled_deletion_until {
            sql.push_str(" AND scheduled_deletion <= ?");
            binds.push(format_datetime(until));
        }

        sql.push_str(" ORDER BY scheduled_deletion ASC, id ASC");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }

        Ok(records)
    }

    async fn put_if_version(
        &self,
        record: &Record,
        expected_version: Option<u64>,
        entry: &AuditEntry,
    ) -> Result<u64, WriteError> {
        let storage = |e: sqlx::Error| WriteError::Storage(e.into());

        let personal_data = serde_json::to_string(record.personal_data())
            .map_err(|e| WriteError::Storage(e.into()))?;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        // The first statement of the transaction is a write, so the write
        // lock is taken before anything is read.
        let applied = match expected_version {
            None => insert_record(&mut tx, record, &personal_data)
                .await
                .map_err(storage)?,
            Some(expected) => update_record(&mut tx, record, &personal_data, expected)
                .await
                .map_err(storage)?,
        };

        if !applied {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM records WHERE id = ?")
                .bind(record.id().to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
            tx.rollback().await.map_err(storage)?;

            return Err(match expected_version {
                None => WriteError::AlreadyExists(*record.id()),
                Some(expected) => WriteError::VersionConflict {
                    id: *record.id(),
                    expected,
                    actual: actual.map(|v| v.max(0) as u64),
                },
            });
        }

        // Dropping the transaction on error rolls the record write back
        let sequence = insert_audit(&mut *tx, entry)
            .await
            .map_err(WriteError::Audit)?;

        tx.commit().await.map_err(storage)?;

        tracing::trace!(
            record_id = %record.id(),
            version = record.version(),
            action = %entry.action(),
            sequence,
            "Committed record write"
        );
        Ok(sequence)
    }

    // --- Audit operations ---

    async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<u64> {
        let sequence = insert_audit(&self.pool, entry).await?;

        tracing::trace!(
            record_id = %entry.record_id(),
            action = %entry.action(),
            sequence,
            "Appended audit entry"
        );
        Ok(sequence)
    }

    async fn audit_trail(&self, id: &RecordId) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_log WHERE record_id = ? ORDER BY sequence ASC")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }

        Ok(entries)
    }
}
