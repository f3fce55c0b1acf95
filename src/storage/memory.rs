//! Session-only store: lives for the process, moved in and out via CSV.

use super::LogStore;
use crate::errors::StoreError;
use crate::models::{AuditEntry, RecordKey, StoredRow};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Session {
    rows: BTreeMap<RecordKey, StoredRow>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    session: Mutex<Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>, StoreError> {
        self.session.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl LogStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self.lock()?.rows.values().cloned().collect())
    }

    fn upsert_one(&self, row: StoredRow) -> Result<(), StoreError> {
        self.lock()?.rows.insert(row.key(), row);
        Ok(())
    }

    fn delete(&self, user: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.lock()?.rows.remove(&RecordKey::new(user, date)).is_some())
    }

    fn replace_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError> {
        let fresh: BTreeMap<RecordKey, StoredRow> =
            rows.into_iter().map(|row| (row.key(), row)).collect();
        self.lock()?.rows = fresh;
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.lock()?.audit.push(entry);
        Ok(())
    }

    fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.lock()?.audit.clone())
    }
}
