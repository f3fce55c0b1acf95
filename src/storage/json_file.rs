use super::LogStore;
use crate::errors::StoreError;
use crate::models::{AuditEntry, DATE_FORMAT, RecordKey, StoredRow};
use crate::records::{parse_date, parse_timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

#[derive(Debug, Default, Deserialize)]
struct LogFile {
    #[serde(default)]
    records: Vec<StoredRow>,
    #[serde(default)]
    audit: Vec<AuditEntry>,
}

#[derive(Serialize)]
struct LogFileRef<'a> {
    records: Vec<&'a StoredRow>,
    audit: &'a [AuditEntry],
}

#[derive(Debug, Default)]
struct Index {
    rows: BTreeMap<RecordKey, StoredRow>,
    /// Rows whose date could not be read. They are kept so that nothing in
    /// the file is lost, but no key ever matches them.
    orphans: Vec<StoredRow>,
    audit: Vec<AuditEntry>,
}

impl Index {
    /// Files written by older tools may carry timestamp-shaped dates, so every
    /// readable date is rewritten to `YYYY-MM-DD` before it becomes a key. On
    /// a collision the row with the later timestamp is kept.
    fn from_rows(records: Vec<StoredRow>, audit: Vec<AuditEntry>) -> Self {
        let mut rows: BTreeMap<RecordKey, StoredRow> = BTreeMap::new();
        let mut orphans = Vec::new();
        let mut rewritten = 0;

        for mut row in records {
            let Some(date) = parse_date(&row.date) else {
                orphans.push(row);
                continue;
            };
            let canonical = date.format(DATE_FORMAT).to_string();
            if row.date != canonical {
                row.date = canonical;
                rewritten += 1;
            }
            let key = row.key();
            match rows.get(&key) {
                Some(kept) if parse_timestamp(&kept.timestamp) > parse_timestamp(&row.timestamp) => {}
                _ => {
                    rows.insert(key, row);
                }
            }
        }

        if rewritten > 0 || !orphans.is_empty() {
            warn!(rewritten, orphans = orphans.len(), "data file held non-canonical dates");
        }
        Self { rows, orphans, audit }
    }
}

/// Single-writer JSON file store. Every mutation happens under one lock and
/// is followed by an atomic rewrite of the file; if the write fails the
/// in-memory change is undone before the lock is released.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    index: Mutex<Index>,
}

impl JsonFileStore {
    /// A missing file starts an empty log. An unreadable or malformed file is
    /// an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<LogFile>(&bytes).inspect_err(|err| {
                error!("failed to parse data file {}: {err}", path.display());
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => LogFile::default(),
            Err(err) => {
                error!("failed to read data file {}: {err}", path.display());
                return Err(err.into());
            }
        };

        Ok(Self {
            path,
            index: Mutex::new(Index::from_rows(file.records, file.audit)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Index>, StoreError> {
        self.index.lock().map_err(|_| StoreError::Poisoned)
    }

    fn persist(&self, index: &Index) -> Result<(), StoreError> {
        let file = LogFileRef {
            records: index.rows.values().chain(&index.orphans).collect(),
            audit: &index.audit,
        };
        let payload = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)?;
        debug!(rows = index.rows.len(), path = %self.path.display(), "data file written");
        Ok(())
    }
}

impl LogStore for JsonFileStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
        let index = self.lock()?;
        Ok(index.rows.values().chain(&index.orphans).cloned().collect())
    }

    fn upsert_one(&self, row: StoredRow) -> Result<(), StoreError> {
        let mut index = self.lock()?;
        let key = row.key();
        let previous = index.rows.insert(key.clone(), row);

        if let Err(err) = self.persist(&index) {
            match previous {
                Some(prev) => index.rows.insert(key, prev),
                None => index.rows.remove(&key),
            };
            return Err(err);
        }
        Ok(())
    }

    fn delete(&self, user: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let mut index = self.lock()?;
        let key = RecordKey::new(user, date);
        let Some(previous) = index.rows.remove(&key) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&index) {
            index.rows.insert(key, previous);
            return Err(err);
        }
        Ok(true)
    }

    fn replace_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError> {
        let mut index = self.lock()?;
        let fresh = rows.into_iter().map(|row| (row.key(), row)).collect();
        let previous = std::mem::replace(&mut index.rows, fresh);
        let orphans = std::mem::take(&mut index.orphans);

        if let Err(err) = self.persist(&index) {
            index.rows = previous;
            index.orphans = orphans;
            return Err(err);
        }
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let mut index = self.lock()?;
        index.audit.push(entry);

        if let Err(err) = self.persist(&index) {
            index.audit.pop();
            return Err(err);
        }
        Ok(())
    }

    fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.lock()?.audit.clone())
    }
}
