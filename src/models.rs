use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::summary::{AccountingPolicy, DateWindow, UserSummary};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const ACTION_LOG_UPDATED: &str = "Log Updated";
pub const ACTION_DELETED: &str = "Deleted";
pub const DEFAULT_ROLE: &str = "User";

/// One user's task-completion snapshot for one business date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub user: String,
    pub date: NaiveDate,
    pub timestamp: NaiveDateTime,
    pub completed: Vec<bool>,
    pub role: String,
    pub action: String,
}

impl LogRecord {
    pub fn tasks_done(&self) -> u32 {
        self.completed.iter().filter(|done| **done).count() as u32
    }

    /// A day is complete when every defined task is checked.
    pub fn is_complete(&self) -> bool {
        !self.completed.is_empty() && self.completed.iter().all(|done| *done)
    }
}

/// Row shape shared by every backend. Dates and timestamps stay textual so
/// that unusable rows survive storage and are filtered at normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(default)]
    pub timestamp: String,
    pub user: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub completed: Vec<bool>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub action: String,
}

impl StoredRow {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            user: self.user.clone(),
            date: self.date.clone(),
        }
    }
}

impl From<&LogRecord> for StoredRow {
    fn from(record: &LogRecord) -> Self {
        Self {
            timestamp: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            user: record.user.clone(),
            date: record.date.format(DATE_FORMAT).to_string(),
            completed: record.completed.clone(),
            role: record.role.clone(),
            action: record.action.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub user: String,
    pub date: String,
}

impl RecordKey {
    pub fn new(user: &str, date: NaiveDate) -> Self {
        Self {
            user: user.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub user: String,
    pub date: NaiveDate,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveLogRequest {
    pub user: String,
    pub date: Option<NaiveDate>,
    pub completed: Vec<bool>,
    #[serde(default)]
    pub backfill: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub reference: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub reference: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RosterResponse {
    pub users: Vec<String>,
    pub tasks: Vec<String>,
    pub roles: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub window: DateWindow,
    pub reference: NaiveDate,
    pub basis: AccountingPolicy,
    pub task_count: usize,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Rows dropped for a blank user or an unusable date.
    pub rejected: usize,
}
