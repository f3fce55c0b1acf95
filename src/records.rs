//! Turning persisted rows into records the summary engine can trust.

use crate::models::{DATE_FORMAT, LogRecord, RecordKey, StoredRow, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub task_count: usize,
    /// Fill an unusable `date` from the row's timestamp instead of dropping it.
    pub backfill_date_from_timestamp: bool,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<LogRecord>,
    pub backfilled: usize,
    pub dropped: usize,
}

pub fn normalize_rows(rows: &[StoredRow], opts: NormalizeOptions) -> LoadReport {
    let mut report = LoadReport::default();

    for row in rows {
        if row.user.trim().is_empty() {
            report.dropped += 1;
            continue;
        }

        let timestamp = parse_timestamp(&row.timestamp);
        let date = match parse_date(&row.date) {
            Some(date) => date,
            None => match timestamp {
                Some(ts) if opts.backfill_date_from_timestamp => {
                    report.backfilled += 1;
                    ts.date()
                }
                _ => {
                    report.dropped += 1;
                    continue;
                }
            },
        };

        let mut completed = row.completed.clone();
        completed.resize(opts.task_count, false);

        report.records.push(LogRecord {
            user: row.user.clone(),
            date,
            timestamp: timestamp.unwrap_or_else(|| date.and_time(NaiveTime::MIN)),
            completed,
            role: row.role.clone(),
            action: row.action.clone(),
        });
    }

    if report.dropped > 0 || report.backfilled > 0 {
        warn!(
            dropped = report.dropped,
            backfilled = report.backfilled,
            "normalized rows with unusable dates"
        );
    }

    report
}

#[derive(Debug, Default)]
pub struct CanonicalRows {
    pub rows: Vec<StoredRow>,
    pub backfilled: usize,
    pub rejected: usize,
}

/// Rewrites each row's `date` to `YYYY-MM-DD` so that every business date has
/// exactly one store key. Rows with no usable date (after the optional
/// timestamp backfill) or no user are rejected. When a key repeats, the later
/// row wins.
pub fn canonicalize_rows(rows: Vec<StoredRow>, opts: NormalizeOptions) -> CanonicalRows {
    let mut keyed: BTreeMap<RecordKey, StoredRow> = BTreeMap::new();
    let mut backfilled = 0;
    let mut rejected = 0;

    for mut row in rows {
        if row.user.trim().is_empty() {
            rejected += 1;
            continue;
        }
        let date = match parse_date(&row.date) {
            Some(date) => date,
            None => match parse_timestamp(&row.timestamp) {
                Some(ts) if opts.backfill_date_from_timestamp => {
                    backfilled += 1;
                    ts.date()
                }
                _ => {
                    rejected += 1;
                    continue;
                }
            },
        };

        row.user = row.user.trim().to_string();
        row.date = date.format(DATE_FORMAT).to_string();
        keyed.insert(row.key(), row);
    }

    if rejected > 0 || backfilled > 0 {
        warn!(rejected, backfilled, "canonicalized rows with unusable dates");
    }

    CanonicalRows {
        rows: keyed.into_values().collect(),
        backfilled,
        rejected,
    }
}

/// Accepts `YYYY-MM-DD`, or a full timestamp whose date part is taken.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(value).map(|ts| ts.date()))
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Flat-file booleans: `true`, `1` and `yes` in any case.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// One record per date in ascending order. When a date repeats, the latest
/// timestamp wins.
pub fn latest_per_date<'a, I>(records: I) -> Vec<&'a LogRecord>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut by_date: BTreeMap<NaiveDate, &LogRecord> = BTreeMap::new();
    for record in records {
        by_date
            .entry(record.date)
            .and_modify(|kept| {
                if record.timestamp >= kept.timestamp {
                    *kept = record;
                }
            })
            .or_insert(record);
    }
    by_date.into_values().collect()
}
