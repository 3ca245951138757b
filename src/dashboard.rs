use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::LedgerError;
use crate::ledger::{resolve_student_id, CheckInLedger};
use crate::models::{ActivityItem, DailyCount, DashboardStats, Role};
use crate::store::{CourseRegistry, UserDirectory};

pub const RECENT_ACTIVITY_LIMIT: usize = 3;
pub const MAX_WINDOW_DAYS: i64 = 366;

/// First and last nanosecond of `day` in UTC.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start + (Duration::days(1) - Duration::nanoseconds(1));
    (start, end)
}

/// The `days` calendar days ending at `today`, oldest first.
///
/// `days` must lie in `1..=MAX_WINDOW_DAYS`.
pub fn window_days(today: NaiveDate, days: i64) -> Result<Vec<NaiveDate>, LedgerError> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(LedgerError::Validation(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}, got {days}"
        )));
    }

    (0..days)
        .rev()
        .map(|offset| {
            today
                .checked_sub_signed(Duration::days(offset))
                .ok_or_else(|| {
                    LedgerError::Validation(format!("{days} days before {today} is out of range"))
                })
        })
        .collect()
}

pub async fn daily_check_ins(
    ledger: &CheckInLedger,
    today: NaiveDate,
    days: i64,
) -> Result<Vec<DailyCount>, LedgerError> {
    let mut chart = Vec::new();
    for day in window_days(today, days)? {
        let (start, end) = day_bounds(day);
        chart.push(DailyCount {
            day,
            label: day.format("%a").to_string(),
            count: ledger.count_in_range(start, end).await?,
        });
    }
    Ok(chart)
}

pub struct DashboardSummarizer {
    ledger: CheckInLedger,
    registry: Arc<dyn CourseRegistry>,
    directory: Arc<dyn UserDirectory>,
}

impl DashboardSummarizer {
    pub fn new(
        ledger: CheckInLedger,
        registry: Arc<dyn CourseRegistry>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            ledger,
            registry,
            directory,
        }
    }

    pub async fn stats(&self, today: NaiveDate, days: i64) -> Result<DashboardStats, LedgerError> {
        let students = self.directory.count_by_role(Role::Student).await?;
        let lecturers = self.directory.count_by_role(Role::Lecturer).await?;
        let active_courses = self.registry.count_approved().await?;
        let check_ins = self.ledger.total_count().await?;

        let mut recent_activity = Vec::new();
        for record in self.ledger.recent(RECENT_ACTIVITY_LIMIT).await? {
            let student_id = resolve_student_id(self.directory.as_ref(), &record.student_ref).await?;
            recent_activity.push(ActivityItem {
                title: "New Check-in".to_string(),
                desc: format!(
                    "{} ({}) checked in to {}",
                    record.student_name, student_id, record.course_code
                ),
                time: record.timestamp,
            });
        }

        let chart = daily_check_ins(&self.ledger, today, days).await?;

        Ok(DashboardStats {
            students,
            lecturers,
            active_courses,
            check_ins,
            recent_activity,
            chart,
        })
    }
}
