use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger::CheckInLedger;
use crate::models::{CheckInRecord, CourseOverview, SessionSummary};
use crate::normalize::CourseIndex;
use crate::store::CourseRegistry;

/// Rebuilds lecturer-facing session summaries from the ledger on every
/// call. Nothing is cached.
#[derive(Clone)]
pub struct SessionAggregator {
    ledger: CheckInLedger,
    registry: Arc<dyn CourseRegistry>,
}

impl SessionAggregator {
    pub fn new(ledger: CheckInLedger, registry: Arc<dyn CourseRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Session history across every course the lecturer owns, whatever its
    /// approval status, newest session first.
    pub async fn build_history(
        &self,
        lecturer_ref: &str,
    ) -> Result<Vec<SessionSummary>, LedgerError> {
        let courses = self.registry.all_courses_for(lecturer_ref).await?;
        let index = CourseIndex::build(&courses);
        if index.is_empty() {
            debug!(lecturer = lecturer_ref, "no courses registered, empty history");
            return Ok(Vec::new());
        }

        let records = self.ledger.records_for_courses(&index).await?;
        let history = summarize_sessions(&records, &index);
        info!(
            lecturer = lecturer_ref,
            courses = courses.len(),
            records = records.len(),
            sessions = history.len(),
            "built session history"
        );
        Ok(history)
    }

    /// Approved courses and the number of distinct students seen in them.
    pub async fn course_overview(&self, lecturer_ref: &str) -> Result<CourseOverview, LedgerError> {
        let courses = self.registry.approved_courses_for(lecturer_ref).await?;
        let codes: Vec<String> = courses.iter().map(|c| c.course_code.clone()).collect();
        let students = self.ledger.distinct_students(&codes).await?;

        Ok(CourseOverview {
            courses,
            total_students: students.len(),
        })
    }
}

struct SessionGroup<'a> {
    earliest: &'a CheckInRecord,
    attendees: usize,
}

fn earlier(a: &CheckInRecord, b: &CheckInRecord) -> bool {
    (a.timestamp, &a.course_code, &a.student_ref) < (b.timestamp, &b.course_code, &b.student_ref)
}

/// Groups `records` by session code, keeping only those whose course code
/// is registered in `index`.
///
/// Each summary takes its course code and start time from the earliest
/// record in the group. The result is ordered by start time descending,
/// then by session code.
pub fn summarize_sessions(records: &[CheckInRecord], index: &CourseIndex) -> Vec<SessionSummary> {
    let mut groups: HashMap<&str, SessionGroup<'_>> = HashMap::new();

    for record in records.iter().filter(|r| index.contains(&r.course_code)) {
        groups
            .entry(record.session_code.as_str())
            .and_modify(|group| {
                group.attendees += 1;
                if earlier(record, group.earliest) {
                    group.earliest = record;
                }
            })
            .or_insert(SessionGroup {
                earliest: record,
                attendees: 1,
            });
    }

    let mut summaries: Vec<SessionSummary> = groups
        .into_iter()
        .map(|(session_code, group)| SessionSummary {
            session_code: session_code.to_string(),
            course_code: group.earliest.course_code.clone(),
            course_name: index.display_name(&group.earliest.course_code),
            start_time: group.earliest.timestamp,
            attendee_count: group.attendees,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.session_code.cmp(&b.session_code))
    });
    summaries
}
