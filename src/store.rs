//! Storage and lookup seams used by the ledger and the aggregator.
//!
//! The Postgres implementations live in [`crate::db`], the in-memory ones
//! in [`crate::memory`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{CheckInRecord, CourseRecord, Role, StudentProfile};

pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only check-in storage keyed by `(student_ref, session_code)`.
#[async_trait]
pub trait CheckInStore: Send + Sync {
    async fn find(&self, student_ref: &str, session_code: &str)
        -> StoreResult<Option<CheckInRecord>>;

    /// Atomically inserts `record`.
    ///
    /// Must fail with [`StoreError::UniquenessConflict`] when a record for the
    /// same `(student_ref, session_code)` already exists, even when the
    /// competing insert is still in flight.
    async fn insert(&self, record: &CheckInRecord) -> StoreResult<()>;

    async fn count_for_session(&self, session_code: &str) -> StoreResult<i64>;

    /// Records of one session, newest first.
    async fn list_for_session(&self, session_code: &str) -> StoreResult<Vec<CheckInRecord>>;

    /// Inclusive on both ends.
    async fn count_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<i64>;

    /// Exact course-code membership.
    async fn distinct_students(&self, course_codes: &[String]) -> StoreResult<BTreeSet<String>>;

    /// Records whose normalized course code is one of `normalized_codes`.
    async fn records_for_courses(&self, normalized_codes: &[String])
        -> StoreResult<Vec<CheckInRecord>>;

    async fn total_count(&self) -> StoreResult<i64>;

    /// Newest records first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<CheckInRecord>>;
}

/// Read-only view over the course registry.
#[async_trait]
pub trait CourseRegistry: Send + Sync {
    /// Approved courses, newest first.
    async fn approved_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>>;

    /// Every course the lecturer owns, whatever its status.
    async fn all_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>>;

    async fn count_approved(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, student_ref: &str) -> StoreResult<Option<StudentProfile>>;

    async fn count_by_role(&self, role: Role) -> StoreResult<i64>;
}
