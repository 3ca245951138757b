//! In-memory collaborators, for tests and for embedding without Postgres.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{CheckInRecord, CourseRecord, CourseStatus, Role, StudentProfile};
use crate::normalize::normalize_course_code;
use crate::store::{CheckInStore, CourseRegistry, StoreResult, UserDirectory};

#[derive(Debug, Default)]
pub struct MemoryCheckInStore {
    records: Mutex<HashMap<(String, String), CheckInRecord>>,
}

impl MemoryCheckInStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    async fn select<F>(&self, mut keep: F) -> Vec<CheckInRecord>
    where
        F: FnMut(&CheckInRecord) -> bool + Send,
    {
        let records = self.records.lock().await;
        let mut selected: Vec<CheckInRecord> =
            records.values().filter(|r| keep(r)).cloned().collect();
        sort_newest_first(&mut selected);
        selected
    }
}

fn sort_newest_first(records: &mut [CheckInRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.student_ref.cmp(&b.student_ref))
            .then_with(|| a.session_code.cmp(&b.session_code))
    });
}

#[async_trait]
impl CheckInStore for MemoryCheckInStore {
    async fn find(
        &self,
        student_ref: &str,
        session_code: &str,
    ) -> StoreResult<Option<CheckInRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(student_ref.to_string(), session_code.to_string()))
            .cloned())
    }

    async fn insert(&self, record: &CheckInRecord) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let key = (record.student_ref.clone(), record.session_code.clone());
        if records.contains_key(&key) {
            return Err(StoreError::UniquenessConflict);
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn count_for_session(&self, session_code: &str) -> StoreResult<i64> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.session_code == session_code)
            .count() as i64)
    }

    async fn list_for_session(&self, session_code: &str) -> StoreResult<Vec<CheckInRecord>> {
        Ok(self.select(|r| r.session_code == session_code).await)
    }

    async fn count_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<i64> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .count() as i64)
    }

    async fn distinct_students(&self, course_codes: &[String]) -> StoreResult<BTreeSet<String>> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| course_codes.contains(&r.course_code))
            .map(|r| r.student_ref.clone())
            .collect())
    }

    async fn records_for_courses(
        &self,
        normalized_codes: &[String],
    ) -> StoreResult<Vec<CheckInRecord>> {
        Ok(self
            .select(|r| normalized_codes.contains(&normalize_course_code(&r.course_code)))
            .await)
    }

    async fn total_count(&self) -> StoreResult<i64> {
        Ok(self.records.lock().await.len() as i64)
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<CheckInRecord>> {
        let mut records = self.select(|_| true).await;
        records.truncate(limit);
        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCourseRegistry {
    courses: Vec<CourseRecord>,
}

impl MemoryCourseRegistry {
    pub fn new(courses: Vec<CourseRecord>) -> Self {
        Self { courses }
    }

    fn owned_by(&self, lecturer_ref: &str) -> Vec<CourseRecord> {
        let mut courses: Vec<CourseRecord> = self
            .courses
            .iter()
            .filter(|c| c.lecturer_ref == lecturer_ref)
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        courses
    }
}

#[async_trait]
impl CourseRegistry for MemoryCourseRegistry {
    async fn approved_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>> {
        let mut courses = self.owned_by(lecturer_ref);
        courses.retain(|c| c.status == CourseStatus::Approved);
        Ok(courses)
    }

    async fn all_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>> {
        Ok(self.owned_by(lecturer_ref))
    }

    async fn count_approved(&self) -> StoreResult<i64> {
        Ok(self
            .courses
            .iter()
            .filter(|c| c.status == CourseStatus::Approved)
            .count() as i64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: HashMap<String, (Role, StudentProfile)>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(
        mut self,
        user_ref: &str,
        role: Role,
        display_name: &str,
        external_id: Option<&str>,
    ) -> Self {
        self.users.insert(
            user_ref.to_string(),
            (
                role,
                StudentProfile {
                    display_name: display_name.to_string(),
                    external_id: external_id.map(str::to_string),
                },
            ),
        );
        self
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn lookup(&self, student_ref: &str) -> StoreResult<Option<StudentProfile>> {
        Ok(self.users.get(student_ref).map(|(_, profile)| profile.clone()))
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        Ok(self.users.values().filter(|(r, _)| *r == role).count() as i64)
    }
}
