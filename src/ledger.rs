use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{LedgerError, StoreError};
use crate::models::{
    AttendeeView, CheckInOutcome, CheckInRecord, NewCheckIn, SessionAttendance, SessionEntry,
};
use crate::normalize::CourseIndex;
use crate::store::{CheckInStore, UserDirectory};

pub const UNKNOWN_STUDENT: &str = "Unknown Student";
pub const MISSING_STUDENT_ID: &str = "N/A";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Check-in ledger over a shared store.
///
/// At-most-once recording per `(student_ref, session_code)` rests on the
/// store's key constraint; the lookup before inserting only saves a write.
#[derive(Clone)]
pub struct CheckInLedger {
    store: Arc<dyn CheckInStore>,
    clock: Clock,
}

impl CheckInLedger {
    pub fn new(store: Arc<dyn CheckInStore>) -> Self {
        Self::with_clock(store, Arc::new(Utc::now))
    }

    pub fn with_clock(store: Arc<dyn CheckInStore>, clock: Clock) -> Self {
        Self { store, clock }
    }

    /// Check-in as submitted by a client, where the display name may be
    /// missing.
    pub async fn check_in(
        &self,
        student_ref: &str,
        student_name: Option<&str>,
        course_code: &str,
        session_code: &str,
    ) -> Result<CheckInOutcome, LedgerError> {
        let student_name = student_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_STUDENT);
        self.record_check_in(student_ref, student_name, course_code, session_code)
            .await
    }

    pub async fn record_check_in(
        &self,
        student_ref: &str,
        student_name: &str,
        course_code: &str,
        session_code: &str,
    ) -> Result<CheckInOutcome, LedgerError> {
        let request = validate(student_ref, student_name, course_code, session_code)?;

        if self
            .store
            .find(&request.student_ref, &request.session_code)
            .await?
            .is_some()
        {
            debug!(
                student = %request.student_ref,
                session = %request.session_code,
                "check-in already present"
            );
            return Ok(CheckInOutcome::AlreadyRecorded);
        }

        let record = request.into_record((self.clock)());
        match self.store.insert(&record).await {
            Ok(()) => {
                info!(
                    student = %record.student_ref,
                    course = %record.course_code,
                    session = %record.session_code,
                    "check-in recorded"
                );
                Ok(CheckInOutcome::Created)
            }
            Err(StoreError::UniquenessConflict) => {
                debug!(
                    student = %record.student_ref,
                    session = %record.session_code,
                    "concurrent check-in won the insert"
                );
                Ok(CheckInOutcome::AlreadyRecorded)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn count_for_session(&self, session_code: &str) -> Result<i64, LedgerError> {
        Ok(self.store.count_for_session(session_code).await?)
    }

    pub async fn list_for_session(
        &self,
        session_code: &str,
    ) -> Result<Vec<SessionEntry>, LedgerError> {
        let records = self.store.list_for_session(session_code).await?;
        Ok(records
            .into_iter()
            .map(|r| SessionEntry {
                student_name: r.student_name,
                student_ref: r.student_ref,
                timestamp: r.timestamp,
            })
            .collect())
    }

    pub async fn count_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        if start > end {
            return Ok(0);
        }
        Ok(self.store.count_in_range(start, end).await?)
    }

    pub async fn distinct_students(
        &self,
        course_codes: &[String],
    ) -> Result<BTreeSet<String>, LedgerError> {
        if course_codes.is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(self.store.distinct_students(course_codes).await?)
    }

    pub async fn records_for_courses(
        &self,
        index: &CourseIndex,
    ) -> Result<Vec<CheckInRecord>, LedgerError> {
        if index.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.records_for_courses(&index.normalized_codes()).await?)
    }

    pub async fn total_count(&self) -> Result<i64, LedgerError> {
        Ok(self.store.total_count().await?)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<CheckInRecord>, LedgerError> {
        Ok(self.store.recent(limit).await?)
    }

    /// Head count for a session, optionally with the attendee list
    /// (newest first) rendered through the user directory.
    pub async fn session_attendance(
        &self,
        session_code: &str,
        include_details: bool,
        directory: &dyn UserDirectory,
    ) -> Result<SessionAttendance, LedgerError> {
        let session_code = session_code.trim();
        if session_code.is_empty() {
            return Err(LedgerError::Validation(
                "session code is required".to_string(),
            ));
        }

        let count = self.count_for_session(session_code).await?;
        if !include_details {
            return Ok(SessionAttendance {
                count,
                students: None,
            });
        }

        let entries = self.list_for_session(session_code).await?;
        let mut external_ids: HashMap<String, String> = HashMap::new();
        let mut students = Vec::with_capacity(entries.len());

        for entry in entries {
            let student_id = match external_ids.get(&entry.student_ref) {
                Some(id) => id.clone(),
                None => {
                    let id = resolve_student_id(directory, &entry.student_ref).await?;
                    external_ids.insert(entry.student_ref.clone(), id.clone());
                    id
                }
            };
            students.push(AttendeeView {
                student_name: entry.student_name,
                student_id,
                timestamp: entry.timestamp,
            });
        }

        Ok(SessionAttendance {
            count,
            students: Some(students),
        })
    }
}

pub(crate) async fn resolve_student_id(
    directory: &dyn UserDirectory,
    student_ref: &str,
) -> Result<String, LedgerError> {
    Ok(directory
        .lookup(student_ref)
        .await?
        .and_then(|profile| profile.external_id)
        .unwrap_or_else(|| MISSING_STUDENT_ID.to_string()))
}

/// Rejects blank fields. Refs and codes are trimmed; course codes keep
/// their case.
pub fn validate(
    student_ref: &str,
    student_name: &str,
    course_code: &str,
    session_code: &str,
) -> Result<NewCheckIn, LedgerError> {
    let fields = [
        ("studentRef", student_ref.trim()),
        ("studentName", student_name.trim()),
        ("courseCode", course_code.trim()),
        ("sessionCode", session_code.trim()),
    ];

    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(LedgerError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok(NewCheckIn {
        student_ref: fields[0].1.to_string(),
        student_name: fields[1].1.to_string(),
        course_code: fields[2].1.to_string(),
        session_code: fields[3].1.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCheckInStore, MemoryUserDirectory};
    use crate::models::Role;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn stepping_clock() -> Clock {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let tick = Arc::new(AtomicI64::new(0));
        Arc::new(move || base + Duration::seconds(tick.fetch_add(1, Ordering::SeqCst)))
    }

    fn ledger_with(store: Arc<MemoryCheckInStore>) -> CheckInLedger {
        CheckInLedger::with_clock(store, stepping_clock())
    }

    /// Store whose lookup never finds anything, so every duplicate reaches
    /// the key constraint.
    struct BlindStore(MemoryCheckInStore);

    #[async_trait]
    impl CheckInStore for BlindStore {
        async fn find(&self, _: &str, _: &str) -> crate::store::StoreResult<Option<CheckInRecord>> {
            Ok(None)
        }
        async fn insert(&self, record: &CheckInRecord) -> crate::store::StoreResult<()> {
            self.0.insert(record).await
        }
        async fn count_for_session(&self, code: &str) -> crate::store::StoreResult<i64> {
            self.0.count_for_session(code).await
        }
        async fn list_for_session(
            &self,
            code: &str,
        ) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            self.0.list_for_session(code).await
        }
        async fn count_in_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> crate::store::StoreResult<i64> {
            self.0.count_in_range(start, end).await
        }
        async fn distinct_students(
            &self,
            codes: &[String],
        ) -> crate::store::StoreResult<BTreeSet<String>> {
            self.0.distinct_students(codes).await
        }
        async fn records_for_courses(
            &self,
            codes: &[String],
        ) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            self.0.records_for_courses(codes).await
        }
        async fn total_count(&self) -> crate::store::StoreResult<i64> {
            self.0.total_count().await
        }
        async fn recent(&self, limit: usize) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            self.0.recent(limit).await
        }
    }

    /// Store that is always down.
    struct DownStore;

    #[async_trait]
    impl CheckInStore for DownStore {
        async fn find(&self, _: &str, _: &str) -> crate::store::StoreResult<Option<CheckInRecord>> {
            Ok(None)
        }
        async fn insert(&self, _: &CheckInRecord) -> crate::store::StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn count_for_session(&self, _: &str) -> crate::store::StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn list_for_session(&self, _: &str) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn count_in_range(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> crate::store::StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn distinct_students(
            &self,
            _: &[String],
        ) -> crate::store::StoreResult<BTreeSet<String>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn records_for_courses(
            &self,
            _: &[String],
        ) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn total_count(&self) -> crate::store::StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn recent(&self, _: usize) -> crate::store::StoreResult<Vec<CheckInRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn second_check_in_is_already_recorded() {
        let store = Arc::new(MemoryCheckInStore::new());
        let ledger = ledger_with(store.clone());

        let first = ledger
            .record_check_in("s1", "Avery Lee", "CS101", "SESSA")
            .await
            .unwrap();
        let second = ledger
            .record_check_in("s1", "Avery Lee", "CS101", "SESSA")
            .await
            .unwrap();

        assert_eq!(first, CheckInOutcome::Created);
        assert_eq!(second, CheckInOutcome::AlreadyRecorded);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn blank_fields_fail_validation_without_writing() {
        let store = Arc::new(MemoryCheckInStore::new());
        let ledger = ledger_with(store.clone());

        let err = ledger
            .record_check_in("s1", "Avery Lee", "  ", "")
            .await
            .unwrap_err();

        match err {
            LedgerError::Validation(message) => {
                assert!(message.contains("courseCode"));
                assert!(message.contains("sessionCode"));
                assert!(!message.contains("studentRef"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn missing_name_defaults_to_unknown_student() {
        let store = Arc::new(MemoryCheckInStore::new());
        let ledger = ledger_with(store.clone());

        ledger.check_in("s1", None, "CS101", "SESSA").await.unwrap();
        ledger.check_in("s2", Some("  "), "CS101", "SESSA").await.unwrap();

        let entries = ledger.list_for_session("SESSA").await.unwrap();
        assert!(entries.iter().all(|e| e.student_name == UNKNOWN_STUDENT));
    }

    #[tokio::test]
    async fn key_conflict_is_translated_to_already_recorded() {
        let store = Arc::new(BlindStore(MemoryCheckInStore::new()));
        let ledger = CheckInLedger::with_clock(store.clone(), stepping_clock());

        let first = ledger.check_in("s1", None, "CS101", "SESSA").await.unwrap();
        let second = ledger
            .check_in("s1", Some("Other Name"), "MA200", "SESSA")
            .await
            .unwrap();

        assert_eq!(first, CheckInOutcome::Created);
        assert_eq!(second, CheckInOutcome::AlreadyRecorded);
        assert_eq!(store.0.len().await, 1);
    }

    #[tokio::test]
    async fn store_failures_are_surfaced() {
        let ledger = CheckInLedger::new(Arc::new(DownStore));

        let err = ledger
            .check_in("s1", None, "CS101", "SESSA")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_record_exactly_once() {
        let store = Arc::new(BlindStore(MemoryCheckInStore::new()));
        let ledger = CheckInLedger::with_clock(store.clone(), stepping_clock());

        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("Name {i}");
                let course = format!("CS10{}", i % 3);
                ledger.check_in("s1", Some(&name), &course, "SESSA").await
            }));
        }

        let mut created = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                CheckInOutcome::Created => created += 1,
                CheckInOutcome::AlreadyRecorded => already += 1,
            }
        }

        assert_eq!(created, 1);
        assert_eq!(already, 15);
        assert_eq!(ledger.count_for_session("SESSA").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_students_all_count() {
        let store = Arc::new(MemoryCheckInStore::new());
        let ledger = ledger_with(store);

        let mut handles = Vec::new();
        for i in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let student = format!("s{}", i % 5);
                ledger.check_in(&student, None, "CS101", "SESSA").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let attendance = ledger
            .session_attendance("SESSA", false, &MemoryUserDirectory::new())
            .await
            .unwrap();
        assert_eq!(attendance.count, 5);
        assert!(attendance.students.is_none());
    }

    #[tokio::test]
    async fn session_details_are_newest_first_with_directory_ids() {
        let store = Arc::new(MemoryCheckInStore::new());
        let ledger = ledger_with(store);
        let directory = MemoryUserDirectory::new()
            .with_user("s1", Role::Student, "Avery Lee", Some("STU-001"))
            .with_user("s2", Role::Student, "Jules Moreno", None);

        ledger.check_in("s1", Some("Avery Lee"), "CS101", "SESSA").await.unwrap();
        ledger.check_in("s2", Some("Jules Moreno"), "CS101", "SESSA").await.unwrap();
        ledger.check_in("s3", Some("Kiara Patel"), "CS101", "SESSA").await.unwrap();
        ledger.check_in("s1", Some("Avery Lee"), "CS101", "SESSB").await.unwrap();

        let attendance = ledger
            .session_attendance("SESSA", true, &directory)
            .await
            .unwrap();
        assert_eq!(attendance.count, 3);

        let students = attendance.students.unwrap();
        let ids: Vec<&str> = students.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec![MISSING_STUDENT_ID, MISSING_STUDENT_ID, "STU-001"]);
        assert_eq!(students[0].student_name, "Kiara Patel");
        assert!(students[0].timestamp > students[2].timestamp);
    }

    #[tokio::test]
    async fn blank_session_code_is_rejected() {
        let ledger = ledger_with(Arc::new(MemoryCheckInStore::new()));
        let err = ledger
            .session_attendance(" ", true, &MemoryUserDirectory::new())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn time_range_bounds_are_inclusive() {
        let ledger = ledger_with(Arc::new(MemoryCheckInStore::new()));
        for student in ["s1", "s2", "s3"] {
            ledger.check_in(student, None, "CS101", "SESSA").await.unwrap();
        }

        let first = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let last = first + Duration::seconds(2);
        assert_eq!(ledger.count_in_range(first, last).await.unwrap(), 3);
        assert_eq!(
            ledger
                .count_in_range(first + Duration::seconds(1), last)
                .await
                .unwrap(),
            2
        );
        assert_eq!(ledger.count_in_range(last, first).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn distinct_students_of_no_courses_is_empty() {
        let ledger = ledger_with(Arc::new(MemoryCheckInStore::new()));
        ledger.check_in("s1", None, "CS101", "SESSA").await.unwrap();
        assert!(ledger.distinct_students(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn validation_trims_but_keeps_course_case() {
        let request = validate(" s1 ", "Avery", " Cs101 ", " SESSA").unwrap();
        assert_eq!(request.student_ref, "s1");
        assert_eq!(request.course_code, "Cs101");
        assert_eq!(request.session_code, "SESSA");
    }
}
