use crate::errors::{TrackerError, TrackerResult};
use crate::models::LogRecord;
use crate::records::latest_per_date;
use chrono::{Days, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Closed calendar range a summary is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> TrackerResult<Self> {
        if end < start {
            return Err(TrackerError::validation(format!(
                "window end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn month(year: i32, month: u32) -> TrackerResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| TrackerError::validation(format!("invalid month {year}-{month}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| TrackerError::validation(format!("invalid month {year}-{month}")))?;
        Ok(Self {
            start,
            end: next - Duration::days(1),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Which calendar days count toward a user's denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum AccountingPolicy {
    /// From the user's own first log (clamped to the window start).
    #[default]
    FirstLog,
    /// From the first log of anyone, with the start pushed back by a grace
    /// period that elapses once and is not repeated in later windows.
    GlobalFirstLog {
        #[serde(default)]
        grace_days: u32,
    },
    /// Every day of the window up to the reference date.
    CalendarWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user: String,
    pub active_days: u32,
    pub max_possible: u32,
    pub tasks_done: u32,
    pub remaining: u32,
    pub progress_pct: f64,
    pub rating: f64,
    pub streak: u32,
    pub current_streak: u32,
}

impl UserSummary {
    fn empty(user: &str) -> Self {
        Self {
            user: user.to_string(),
            active_days: 0,
            max_possible: 0,
            tasks_done: 0,
            remaining: 0,
            progress_pct: 0.0,
            rating: 0.0,
            streak: 0,
            current_streak: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SummaryEngine {
    pub task_count: usize,
    pub policy: AccountingPolicy,
}

impl SummaryEngine {
    pub fn new(task_count: usize, policy: AccountingPolicy) -> Self {
        Self { task_count, policy }
    }

    pub fn summarize(
        &self,
        logs: &[LogRecord],
        user: &str,
        window: DateWindow,
        reference: NaiveDate,
    ) -> UserSummary {
        let in_window: Vec<&LogRecord> = logs
            .iter()
            .filter(|r| r.user == user && window.contains(r.date))
            .collect();
        if in_window.is_empty() {
            return UserSummary::empty(user);
        }

        let active_days = self.active_days(logs, user, window, reference);
        let max_possible = active_days.saturating_mul(self.task_count as u32);
        let tasks_done = in_window
            .iter()
            .map(|r| r.tasks_done())
            .fold(0u32, u32::saturating_add)
            .min(max_possible);
        let remaining = max_possible.saturating_sub(tasks_done);
        let progress_pct = if max_possible > 0 {
            f64::from(tasks_done) / f64::from(max_possible) * 100.0
        } else {
            0.0
        };

        let days = latest_per_date(in_window.iter().copied());
        UserSummary {
            user: user.to_string(),
            active_days,
            max_possible,
            tasks_done,
            remaining,
            progress_pct,
            rating: rating(progress_pct),
            streak: compute_streak(&days),
            current_streak: current_streak(&days, reference),
        }
    }

    /// Days counted as the denominator basis, ending at
    /// `min(reference, window.end)`.
    pub fn active_days(
        &self,
        logs: &[LogRecord],
        user: &str,
        window: DateWindow,
        reference: NaiveDate,
    ) -> u32 {
        let end = reference.min(window.end);
        let first_log = |only: Option<&str>| {
            logs.iter()
                .filter(|r| only.is_none_or(|u| r.user == u) && r.date <= window.end)
                .map(|r| r.date)
                .min()
        };

        match self.policy {
            AccountingPolicy::FirstLog => match first_log(Some(user)) {
                Some(first) => inclusive_days(first.max(window.start), end),
                None => 0,
            },
            AccountingPolicy::GlobalFirstLog { grace_days } => {
                match first_log(None).and_then(|first| first.checked_add_days(Days::new(grace_days.into()))) {
                    Some(start) => inclusive_days(start.max(window.start), end),
                    None => 0,
                }
            }
            AccountingPolicy::CalendarWindow => inclusive_days(window.start, end),
        }
    }
}

fn inclusive_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        0
    } else {
        (end - start).num_days() as u32 + 1
    }
}

/// Linear 0-10 scale of a completion percentage, one decimal.
pub fn rating(progress_pct: f64) -> f64 {
    let scaled = (progress_pct / 10.0).clamp(0.0, 10.0);
    (scaled * 10.0).round() / 10.0
}

/// Longest run of consecutive fully complete days.
///
/// `days` must be sorted by date with one record per date. Consecutiveness is
/// measured against the previous complete day, so an incomplete day between
/// two complete ones breaks the run.
pub fn compute_streak(days: &[&LogRecord]) -> u32 {
    let mut best = 0;
    let mut current = 0;
    let mut prev: Option<NaiveDate> = None;

    for day in days.iter().filter(|r| r.is_complete()) {
        current = match prev {
            Some(p) if day.date - p == Duration::days(1) => current + 1,
            _ => 1,
        };
        prev = Some(day.date);
        best = best.max(current);
    }

    best
}

/// Run of complete days still alive at `reference`: it must end on the
/// reference date or the day before (today may not be logged yet).
pub fn current_streak(days: &[&LogRecord], reference: NaiveDate) -> u32 {
    let mut current = 0;
    let mut prev: Option<NaiveDate> = None;

    for day in days
        .iter()
        .filter(|r| r.date <= reference && r.is_complete())
    {
        current = match prev {
            Some(p) if day.date - p == Duration::days(1) => current + 1,
            _ => 1,
        };
        prev = Some(day.date);
    }

    match prev {
        Some(last) if (reference - last).num_days() <= 1 => current,
        _ => 0,
    }
}
