use crate::alerts::{InactivityAlert, inactive_users};
use crate::config::TrackerConfig;
use crate::errors::{TrackerError, TrackerResult};
use crate::export::{export_csv, read_csv};
use crate::models::{ACTION_DELETED, ACTION_LOG_UPDATED, AuditEntry, ImportReport, LogRecord, StoredRow};
use crate::records::{canonicalize_rows, normalize_rows};
use crate::storage::LogStore;
use crate::summary::{DateWindow, SummaryEngine, UserSummary};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{info, warn};

/// The task log as the rest of the app sees it: roster checks and
/// normalization in front of a [`LogStore`], summaries behind it.
pub struct Tracker {
    config: TrackerConfig,
    store: Arc<dyn LogStore>,
}

impl Tracker {
    pub fn new(config: TrackerConfig, store: Arc<dyn LogStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn engine(&self) -> SummaryEngine {
        SummaryEngine::new(self.config.task_count(), self.config.accounting)
    }

    pub fn upsert(&self, user: &str, date: NaiveDate, completed: Vec<bool>) -> TrackerResult<LogRecord> {
        self.upsert_at(user, date, completed, Local::now().naive_local())
    }

    pub fn upsert_at(
        &self,
        user: &str,
        date: NaiveDate,
        completed: Vec<bool>,
        now: NaiveDateTime,
    ) -> TrackerResult<LogRecord> {
        if !self.config.is_known_user(user) {
            return Err(TrackerError::validation(format!("unknown user {user:?}")));
        }
        if completed.len() != self.config.task_count() {
            return Err(TrackerError::validation(format!(
                "expected {} task flags, got {}",
                self.config.task_count(),
                completed.len()
            )));
        }

        let record = LogRecord {
            user: user.to_string(),
            date,
            timestamp: now,
            completed,
            role: self.config.role_for(user).to_string(),
            action: ACTION_LOG_UPDATED.to_string(),
        };
        self.store.upsert_one(StoredRow::from(&record))?;
        self.audit(AuditEntry {
            timestamp: now,
            user: record.user.clone(),
            date,
            action: ACTION_LOG_UPDATED.to_string(),
        });

        info!(user, %date, done = record.tasks_done(), "log saved");
        Ok(record)
    }

    /// Picks the business date for a save. Anything but `today` needs the
    /// backfill unlock, and future dates are never accepted.
    pub fn resolve_entry_date(
        &self,
        requested: Option<NaiveDate>,
        backfill: bool,
        today: NaiveDate,
    ) -> TrackerResult<NaiveDate> {
        let date = requested.unwrap_or(today);
        if date > today {
            return Err(TrackerError::validation(format!("{date} is in the future")));
        }
        if date != today && !(backfill && self.config.allow_backfill) {
            return Err(TrackerError::validation(
                "backdating locked; enable backfill to log another date",
            ));
        }
        Ok(date)
    }

    pub fn all(&self) -> TrackerResult<Vec<LogRecord>> {
        let rows = self.store.load()?;
        Ok(normalize_rows(&rows, self.config.normalize_options()).records)
    }

    pub fn delete(&self, user: &str, date: NaiveDate) -> TrackerResult<bool> {
        self.delete_at(user, date, Local::now().naive_local())
    }

    pub fn delete_at(&self, user: &str, date: NaiveDate, now: NaiveDateTime) -> TrackerResult<bool> {
        let removed = self.store.delete(user, date)?;
        if removed {
            self.audit(AuditEntry {
                timestamp: now,
                user: user.to_string(),
                date,
                action: ACTION_DELETED.to_string(),
            });
            info!(user, %date, "log deleted");
        }
        Ok(removed)
    }

    /// The row write has already committed by the time this runs, so a
    /// failed append is logged rather than reported as a failed save.
    fn audit(&self, entry: AuditEntry) {
        let (user, date) = (entry.user.clone(), entry.date);
        if let Err(err) = self.store.append_audit(entry) {
            warn!(user = %user, %date, error = %err, "audit append failed");
        }
    }

    /// One summary per roster user, in roster order.
    pub fn summaries(&self, window: DateWindow, reference: NaiveDate) -> TrackerResult<Vec<UserSummary>> {
        let logs = self.all()?;
        let engine = self.engine();
        Ok(self
            .config
            .users
            .iter()
            .map(|user| engine.summarize(&logs, user, window, reference))
            .collect())
    }

    pub fn leaderboard(&self, window: DateWindow, reference: NaiveDate) -> TrackerResult<Vec<UserSummary>> {
        let mut board = self.summaries(window, reference)?;
        board.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then(b.tasks_done.cmp(&a.tasks_done))
                .then_with(|| a.user.cmp(&b.user))
        });
        Ok(board)
    }

    pub fn inactivity_alerts(&self, reference: NaiveDate) -> TrackerResult<Vec<InactivityAlert>> {
        let logs = self.all()?;
        Ok(inactive_users(
            &logs,
            &self.config.users,
            reference,
            self.config.inactivity_days,
        ))
    }

    pub fn export_csv(&self) -> TrackerResult<String> {
        let rows = self.store.load()?;
        export_csv(&self.config.tasks, &rows)
    }

    /// Replaces the whole log with the CSV contents. Dates are rewritten to
    /// `YYYY-MM-DD` before they reach the store, rows without a usable date
    /// are rejected, and later rows win when a `(user, date)` repeats.
    pub fn import_csv(&self, text: &str) -> TrackerResult<ImportReport> {
        let rows = read_csv(text.as_bytes(), &self.config.tasks)?;
        let canonical = canonicalize_rows(rows, self.config.normalize_options());
        let report = ImportReport {
            imported: canonical.rows.len(),
            rejected: canonical.rejected,
        };
        self.store.replace_all(canonical.rows)?;
        info!(
            imported = report.imported,
            rejected = report.rejected,
            backend = self.store.backend(),
            "log imported"
        );
        Ok(report)
    }

    pub fn audit_trail(&self) -> TrackerResult<Vec<AuditEntry>> {
        Ok(self.store.audit_trail()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::storage::MemoryStore;
    use crate::summary::AccountingPolicy;
    use std::collections::BTreeSet;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        d(day).and_hms_opt(hour, 0, 0).unwrap()
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default(), Arc::new(MemoryStore::new()))
    }

    struct FailingStore;

    impl LogStore for FailingStore {
        fn backend(&self) -> &'static str {
            "failing"
        }
        fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("sheet unreachable")))
        }
        fn upsert_one(&self, _row: StoredRow) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("sheet unreachable")))
        }
        fn delete(&self, _user: &str, _date: NaiveDate) -> Result<bool, StoreError> {
            Err(StoreError::Io(std::io::Error::other("sheet unreachable")))
        }
        fn replace_all(&self, _rows: Vec<StoredRow>) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("sheet unreachable")))
        }
        fn append_audit(&self, _entry: AuditEntry) -> Result<(), StoreError> {
            Ok(())
        }
        fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Row writes succeed; only the audit append fails.
    struct AuditlessStore(MemoryStore);

    impl LogStore for AuditlessStore {
        fn backend(&self) -> &'static str {
            "auditless"
        }
        fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
            self.0.load()
        }
        fn upsert_one(&self, row: StoredRow) -> Result<(), StoreError> {
            self.0.upsert_one(row)
        }
        fn delete(&self, user: &str, date: NaiveDate) -> Result<bool, StoreError> {
            self.0.delete(user, date)
        }
        fn replace_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError> {
            self.0.replace_all(rows)
        }
        fn append_audit(&self, _entry: AuditEntry) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("audit sheet unreachable")))
        }
        fn audit_trail(&self) -> Result<Vec<AuditEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn csv_with(config: &TrackerConfig, lines: &[&str]) -> String {
        let mut text = format!("Timestamp,User,Date,{},Role,Action\n", config.tasks.join(","));
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    #[test]
    fn upsert_twice_keeps_second_values() {
        let tracker = tracker();
        tracker.upsert_at("MQ", d(1), vec![true, false], at(1, 9)).unwrap();
        tracker.upsert_at("MQ", d(1), vec![false, true], at(1, 18)).unwrap();

        let records = tracker.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].completed, vec![false, true]);
        assert_eq!(records[0].timestamp, at(1, 18));
        assert_eq!(records[0].action, "Log Updated");
    }

    #[test]
    fn upsert_rejects_wrong_flag_count_and_unknown_user() {
        let tracker = tracker();
        assert!(matches!(
            tracker.upsert_at("MQ", d(1), vec![true], at(1, 9)),
            Err(TrackerError::Validation(_))
        ));
        assert!(matches!(
            tracker.upsert_at("MQ", d(1), vec![true, true, true], at(1, 9)),
            Err(TrackerError::Validation(_))
        ));
        assert!(matches!(
            tracker.upsert_at("Nobody", d(1), vec![true, true], at(1, 9)),
            Err(TrackerError::Validation(_))
        ));
        assert!(tracker.all().unwrap().is_empty());
    }

    #[test]
    fn role_comes_from_config() {
        let mut config = TrackerConfig::default();
        config.roles.insert("MQ".to_string(), "Admin".to_string());
        let tracker = Tracker::new(config, Arc::new(MemoryStore::new()));
        let record = tracker.upsert_at("MQ", d(1), vec![true, true], at(1, 9)).unwrap();
        assert_eq!(record.role, "Admin");
    }

    #[test]
    fn delete_is_noop_on_missing_key_and_audited_otherwise() {
        let tracker = tracker();
        assert!(!tracker.delete_at("MQ", d(1), at(1, 10)).unwrap());
        tracker.upsert_at("MQ", d(1), vec![true, true], at(1, 9)).unwrap();
        assert!(tracker.delete_at("MQ", d(1), at(1, 10)).unwrap());

        let actions: Vec<String> = tracker
            .audit_trail()
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(actions, vec!["Log Updated", "Deleted"]);
    }

    #[test]
    fn store_failure_is_not_an_empty_log() {
        let tracker = Tracker::new(TrackerConfig::default(), Arc::new(FailingStore));
        assert!(matches!(tracker.all(), Err(TrackerError::Storage(_))));
        assert!(matches!(
            tracker.summaries(DateWindow::month(2024, 6).unwrap(), d(10)),
            Err(TrackerError::Storage(_))
        ));
        assert!(matches!(
            tracker.upsert_at("MQ", d(1), vec![true, true], at(1, 9)),
            Err(TrackerError::Storage(_))
        ));
    }

    #[test]
    fn entry_date_respects_backfill_lock() {
        let tracker = tracker();
        assert_eq!(tracker.resolve_entry_date(None, false, d(10)).unwrap(), d(10));
        assert!(tracker.resolve_entry_date(Some(d(9)), false, d(10)).is_err());
        assert_eq!(tracker.resolve_entry_date(Some(d(9)), true, d(10)).unwrap(), d(9));
        assert!(tracker.resolve_entry_date(Some(d(11)), true, d(10)).is_err());

        let mut config = TrackerConfig::default();
        config.allow_backfill = false;
        let locked = Tracker::new(config, Arc::new(MemoryStore::new()));
        assert!(locked.resolve_entry_date(Some(d(9)), true, d(10)).is_err());
    }

    #[test]
    fn summaries_follow_roster_and_leaderboard_sorts() {
        let tracker = tracker();
        for day in 5..=10 {
            tracker.upsert_at("Samo", d(day), vec![true, true], at(day, 20)).unwrap();
        }
        tracker.upsert_at("MQ", d(10), vec![true, false], at(10, 20)).unwrap();

        let window = DateWindow::month(2024, 6).unwrap();
        let summaries = tracker.summaries(window, d(10)).unwrap();
        let users: Vec<&str> = summaries.iter().map(|s| s.user.as_str()).collect();
        assert_eq!(users, vec!["MQ", "Samo", "Bashe"]);
        assert_eq!(summaries[1].tasks_done, 12);
        assert_eq!(summaries[1].rating, 10.0);
        assert_eq!(summaries[0].rating, 5.0);

        let board = tracker.leaderboard(window, d(10)).unwrap();
        let order: Vec<&str> = board.iter().map(|s| s.user.as_str()).collect();
        assert_eq!(order, vec!["Samo", "MQ", "Bashe"]);
    }

    #[test]
    fn calendar_policy_is_configurable() {
        let mut config = TrackerConfig::default();
        config.accounting = AccountingPolicy::CalendarWindow;
        let tracker = Tracker::new(config, Arc::new(MemoryStore::new()));
        tracker.upsert_at("MQ", d(10), vec![true, true], at(10, 20)).unwrap();

        let summaries = tracker
            .summaries(DateWindow::month(2024, 6).unwrap(), d(10))
            .unwrap();
        assert_eq!(summaries[0].max_possible, 20);
        assert_eq!(summaries[0].rating, 1.0);
    }

    #[test]
    fn csv_export_reimports_same_tuples() {
        let tracker = tracker();
        tracker.upsert_at("MQ", d(1), vec![true, true], at(1, 9)).unwrap();
        tracker.upsert_at("Samo", d(2), vec![false, true], at(2, 9)).unwrap();
        tracker.upsert_at("Bashe", d(3), vec![false, false], at(3, 9)).unwrap();

        let tuples = |records: Vec<LogRecord>| -> BTreeSet<(String, NaiveDate, Vec<bool>)> {
            records
                .into_iter()
                .map(|r| (r.user, r.date, r.completed))
                .collect()
        };
        let before = tuples(tracker.all().unwrap());
        let text = tracker.export_csv().unwrap();

        let session = Tracker::new(TrackerConfig::default(), Arc::new(MemoryStore::new()));
        assert_eq!(session.import_csv(&text).unwrap().imported, 3);
        assert_eq!(tuples(session.all().unwrap()), before);
    }

    #[test]
    fn imported_timestamp_dates_share_the_upsert_key() {
        let tracker = tracker();
        let text = csv_with(
            tracker.config(),
            &["2024-06-05 08:00:00,MQ,2024-06-05 00:00:00,true,false,User,Log Updated"],
        );
        let report = tracker.import_csv(&text).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(tracker.export_csv().unwrap().matches("2024-06-05 00:00:00").count(), 0);

        tracker.upsert_at("MQ", d(5), vec![true, true], at(5, 21)).unwrap();
        let records = tracker.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].completed, vec![true, true]);

        assert!(tracker.delete_at("MQ", d(5), at(5, 22)).unwrap());
        assert!(tracker.all().unwrap().is_empty());
    }

    #[test]
    fn undated_imports_get_distinct_keys_when_backfilled() {
        let mut config = TrackerConfig::default();
        config.backfill_date_from_timestamp = true;
        let tracker = Tracker::new(config, Arc::new(MemoryStore::new()));
        let text = csv_with(
            tracker.config(),
            &[
                "2024-06-05 08:00:00,MQ,,true,true,User,Log Updated",
                "2024-06-06 08:00:00,MQ,,true,false,User,Log Updated",
            ],
        );
        let report = tracker.import_csv(&text).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.rejected, 0);

        let records = tracker.all().unwrap();
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(5), d(6)]);
    }

    #[test]
    fn undated_imports_are_rejected_without_backfill() {
        let tracker = tracker();
        let text = csv_with(
            tracker.config(),
            &[
                "2024-06-05 08:00:00,MQ,,true,true,User,Log Updated",
                "2024-06-06 08:00:00,MQ,2024-06-06,true,false,User,Log Updated",
            ],
        );
        let report = tracker.import_csv(&text).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(tracker.all().unwrap().len(), 1);
    }

    #[test]
    fn audit_failure_does_not_fail_a_committed_write() {
        let tracker = Tracker::new(
            TrackerConfig::default(),
            Arc::new(AuditlessStore(MemoryStore::new())),
        );
        let record = tracker.upsert_at("MQ", d(1), vec![true, true], at(1, 9)).unwrap();
        assert_eq!(record.tasks_done(), 2);
        assert_eq!(tracker.all().unwrap().len(), 1);

        assert!(tracker.delete_at("MQ", d(1), at(1, 10)).unwrap());
        assert!(tracker.all().unwrap().is_empty());
    }

    #[test]
    fn inactivity_uses_configured_threshold() {
        let tracker = tracker();
        tracker.upsert_at("MQ", d(9), vec![true, false], at(9, 9)).unwrap();
        tracker.upsert_at("Samo", d(6), vec![true, false], at(6, 9)).unwrap();
        let alerts = tracker.inactivity_alerts(d(10)).unwrap();
        let users: Vec<&str> = alerts.iter().map(|a| a.user.as_str()).collect();
        assert_eq!(users, vec!["Samo", "Bashe"]);
    }
}
