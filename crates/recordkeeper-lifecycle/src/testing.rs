//! In-memory repository and fixtures shared by the unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use recordkeeper_audit::AuditLedger;
use recordkeeper_core::{
    config::RecordDefaults,
    domain::{AuditEntry, PersonalData, PiiField, Record, RecordId},
    ports::{FixedClock, IRecordRepository, RecordFilter, WriteError},
};

use crate::{ConsentGate, ErasureEngine, ExportCompiler, RecordStore};

/// Repository keeping everything in two maps behind one mutex
///
/// Writes are atomic because the whole write happens under the lock.
#[derive(Default)]
pub struct MemoryRepo {
    state: Mutex<State>,
    fail_audit: AtomicBool,
    /// Writes landed just before the next trail reads, one per read
    interleaved: Mutex<Vec<(Record, AuditEntry)>>,
}

#[derive(Default)]
struct State {
    records: BTreeMap<RecordId, Record>,
    entries: BTreeMap<RecordId, Vec<AuditEntry>>,
}

impl State {
    fn push_entry(&mut self, entry: &AuditEntry) -> u64 {
        let trail = self.entries.entry(*entry.record_id()).or_default();
        let sequence = trail.len() as u64 + 1;
        trail.push(entry.clone().with_sequence(sequence));
        sequence
    }
}

impl MemoryRepo {
    /// Makes every following audit write fail
    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Commits `record` with `entry` right before a following trail read,
    /// as a writer racing the reader would
    pub fn write_before_trail_read(&self, record: Record, entry: AuditEntry) {
        self.interleaved.lock().unwrap().push((record, entry));
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl IRecordRepository for MemoryRepo {
    async fn get_record(&self, id: &RecordId) -> anyhow::Result<Option<Record>> {
        Ok(self.state.lock().unwrap().records.get(id).cloned())
    }

    async fn scan_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Record>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn put_if_version(
        &self,
        record: &Record,
        expected_version: Option<u64>,
        entry: &AuditEntry,
    ) -> Result<u64, WriteError> {
        let mut state = self.state.lock().unwrap();
        let actual = state.records.get(record.id()).map(Record::version);
        match expected_version {
            None if actual.is_some() => return Err(WriteError::AlreadyExists(*record.id())),
            Some(expected) if actual != Some(expected) => {
                return Err(WriteError::VersionConflict {
                    id: *record.id(),
                    expected,
                    actual,
                })
            }
            _ => {}
        }
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(WriteError::Audit(anyhow::anyhow!("audit sink offline")));
        }
        let sequence = state.push_entry(entry);
        state.records.insert(*record.id(), record.clone());
        Ok(sequence)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<u64> {
        if self.fail_audit.load(Ordering::SeqCst) {
            anyhow::bail!("audit sink offline");
        }
        let mut state = self.state.lock().unwrap();
        if !state.records.contains_key(entry.record_id()) {
            anyhow::bail!("no record {}", entry.record_id());
        }
        Ok(state.push_entry(entry))
    }

    async fn audit_trail(&self, id: &RecordId) -> anyhow::Result<Vec<AuditEntry>> {
        let racing = {
            let mut pending = self.interleaved.lock().unwrap();
            (!pending.is_empty()).then(|| pending.remove(0))
        };
        let mut state = self.state.lock().unwrap();
        if let Some((record, entry)) = racing {
            state.push_entry(&entry);
            state.records.insert(*record.id(), record);
        }
        Ok(state
            .entries
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
}

pub fn sample_data() -> PersonalData {
    PersonalData::new()
        .with(PiiField::Name, "Dorothy Vaughan")
        .unwrap()
        .with(PiiField::Email, "dorothy@example.net")
        .unwrap()
        .with(PiiField::Address, "1 Langley Way")
        .unwrap()
}

/// Fully wired components over a [`MemoryRepo`] and a [`FixedClock`] at [`t0`]
pub struct Harness {
    pub repo: Arc<MemoryRepo>,
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<AuditLedger>,
    pub store: Arc<RecordStore>,
    pub erasure: Arc<ErasureEngine>,
    pub export: ExportCompiler,
}

impl Harness {
    pub fn new(retention_period_days: u32) -> Self {
        Self::with_repo(Arc::new(MemoryRepo::default()), retention_period_days)
    }

    pub fn with_repo(repo: Arc<MemoryRepo>, retention_period_days: u32) -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let defaults = RecordDefaults {
            retention_period_days,
            consent_version: "1.0".to_string(),
        };
        let ledger = Arc::new(AuditLedger::new(repo.clone()));
        let gate = ConsentGate::new(defaults.clone(), clock.clone());
        let store = Arc::new(RecordStore::new(
            repo.clone(),
            ledger.clone(),
            gate,
            clock.clone(),
            defaults,
        ));
        let erasure = Arc::new(ErasureEngine::new(store.clone(), ledger.clone(), clock.clone()));
        let export = ExportCompiler::new(store.clone(), ledger.clone(), clock.clone());
        Self {
            repo,
            clock,
            ledger,
            store,
            erasure,
            export,
        }
    }
}
