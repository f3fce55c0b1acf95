use crate::models::LogRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityAlert {
    pub user: String,
    /// Last date with at least one task done, if any.
    pub last_active: Option<NaiveDate>,
    pub idle_days: Option<i64>,
}

/// Roster users with no task done in the `threshold_days` ending at
/// `reference`. Records dated after the reference are ignored.
pub fn inactive_users(
    logs: &[LogRecord],
    roster: &[String],
    reference: NaiveDate,
    threshold_days: u32,
) -> Vec<InactivityAlert> {
    roster
        .iter()
        .filter_map(|user| {
            let last_active = logs
                .iter()
                .filter(|r| &r.user == user && r.date <= reference && r.tasks_done() > 0)
                .map(|r| r.date)
                .max();
            let idle_days = last_active.map(|last| (reference - last).num_days());

            let inactive = idle_days.is_none_or(|idle| idle >= i64::from(threshold_days));
            inactive.then(|| InactivityAlert {
                user: user.clone(),
                last_active,
                idle_days,
            })
        })
        .collect()
}
