use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ledger::CheckInLedger;
use crate::models::{CheckInOutcome, CheckInRecord, CourseRecord, CourseStatus, Role, StudentProfile};
use crate::normalize::normalize_course_code;
use crate::store::{CheckInStore, CourseRegistry, StoreResult, UserDirectory};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Check-ins, courses and users backed by the `attendance` schema.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn check_in_from_row(row: &PgRow) -> StoreResult<CheckInRecord> {
    Ok(CheckInRecord {
        id: row.try_get("id")?,
        student_ref: row.try_get("student_ref")?,
        student_name: row.try_get("student_name")?,
        course_code: row.try_get("course_code")?,
        session_code: row.try_get("session_code")?,
        timestamp: row.try_get("checked_in_at")?,
    })
}

fn parse_status(status: &str) -> StoreResult<CourseStatus> {
    CourseStatus::parse(status)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown course status {status:?}")))
}

fn course_from_row(row: &PgRow) -> StoreResult<CourseRecord> {
    let status: String = row.try_get("status")?;
    Ok(CourseRecord {
        course_code: row.try_get("course_code")?,
        course_name: row.try_get("course_name")?,
        lecturer_ref: row.try_get("lecturer_ref")?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
    })
}

const CHECK_IN_COLUMNS: &str =
    "id, student_ref, student_name, course_code, session_code, checked_in_at";

#[async_trait]
impl CheckInStore for PgStore {
    async fn find(
        &self,
        student_ref: &str,
        session_code: &str,
    ) -> StoreResult<Option<CheckInRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM attendance.check_ins \
             WHERE student_ref = $1 AND session_code = $2"
        ))
        .bind(student_ref)
        .bind(session_code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(check_in_from_row).transpose()
    }

    async fn insert(&self, record: &CheckInRecord) -> StoreResult<()> {
        // A unique_violation on CHECK_IN_KEY maps to
        // StoreError::UniquenessConflict.
        sqlx::query(
            r#"
            INSERT INTO attendance.check_ins
            (id, student_ref, student_name, course_code, course_code_norm, session_code, checked_in_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.student_ref)
        .bind(&record.student_name)
        .bind(&record.course_code)
        .bind(normalize_course_code(&record.course_code))
        .bind(&record.session_code)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_for_session(&self, session_code: &str) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM attendance.check_ins WHERE session_code = $1")
                .bind(session_code)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;
        Ok(count)
    }

    async fn list_for_session(&self, session_code: &str) -> StoreResult<Vec<CheckInRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM attendance.check_ins \
             WHERE session_code = $1 \
             ORDER BY checked_in_at DESC, student_ref"
        ))
        .bind(session_code)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(check_in_from_row).collect()
    }

    async fn count_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<i64> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM attendance.check_ins \
             WHERE checked_in_at >= $1 AND checked_in_at <= $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;
        Ok(count)
    }

    async fn distinct_students(&self, course_codes: &[String]) -> StoreResult<BTreeSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT student_ref FROM attendance.check_ins WHERE course_code = ANY($1)",
        )
        .bind(course_codes)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("student_ref").map_err(StoreError::from))
            .collect()
    }

    async fn records_for_courses(
        &self,
        normalized_codes: &[String],
    ) -> StoreResult<Vec<CheckInRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM attendance.check_ins \
             WHERE course_code_norm = ANY($1)"
        ))
        .bind(normalized_codes)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(check_in_from_row).collect()
    }

    async fn total_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM attendance.check_ins")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count)
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<CheckInRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM attendance.check_ins \
             ORDER BY checked_in_at DESC, student_ref LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(check_in_from_row).collect()
    }
}

const COURSE_COLUMNS: &str = "course_code, course_name, lecturer_ref, status, created_at";

#[async_trait]
impl CourseRegistry for PgStore {
    async fn approved_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM attendance.courses \
             WHERE lecturer_ref = $1 AND status = 'APPROVED' \
             ORDER BY created_at DESC"
        ))
        .bind(lecturer_ref)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(course_from_row).collect()
    }

    async fn all_courses_for(&self, lecturer_ref: &str) -> StoreResult<Vec<CourseRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM attendance.courses \
             WHERE lecturer_ref = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(lecturer_ref)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(course_from_row).collect()
    }

    async fn count_approved(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM attendance.courses WHERE status = 'APPROVED'",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;
        Ok(count)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn lookup(&self, student_ref: &str) -> StoreResult<Option<StudentProfile>> {
        let row = sqlx::query("SELECT full_name, student_id FROM attendance.users WHERE id = $1")
            .bind(student_ref)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(StudentProfile {
                display_name: row.try_get("full_name")?,
                external_id: row.try_get("student_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM attendance.users WHERE role = $1")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;
        Ok(count)
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        ("lect-okafor", "Dr. Ada Okafor", "ada.okafor@campus.edu", Role::Lecturer, None),
        ("lect-brandt", "Dr. Lena Brandt", "lena.brandt@campus.edu", Role::Lecturer, None),
        ("stu-avery", "Avery Lee", "avery.lee@campus.edu", Role::Student, Some("STU-2026-001")),
        ("stu-jules", "Jules Moreno", "jules.moreno@campus.edu", Role::Student, Some("STU-2026-002")),
        ("stu-kiara", "Kiara Patel", "kiara.patel@campus.edu", Role::Student, Some("STU-2026-003")),
    ];

    for (id, name, email, role, student_id) in users {
        sqlx::query(
            r#"
            INSERT INTO attendance.users (id, full_name, email, role, student_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, student_id = EXCLUDED.student_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(student_id)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("CS101", "Introduction to Computing", "lect-okafor", CourseStatus::Approved),
        ("CS201", "Data Structures", "lect-okafor", CourseStatus::Pending),
        ("MA200", "Linear Algebra", "lect-brandt", CourseStatus::Approved),
    ];

    for (code, name, lecturer, status) in courses {
        sqlx::query(
            r#"
            INSERT INTO attendance.courses (id, course_code, course_name, lecturer_ref, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (lecturer_ref, course_code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .bind(lecturer)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    }

    let base = Utc
        .with_ymd_and_hms(2026, 2, 2, 9, 0, 0)
        .single()
        .context("invalid seed timestamp")?;

    let check_ins = vec![
        ("stu-avery", "Avery Lee", "CS101", "CS101-W1", 0),
        ("stu-jules", "Jules Moreno", "cs101", "CS101-W1", 4),
        ("stu-kiara", "Kiara Patel", "CS101", "CS101-W1", 9),
        ("stu-avery", "Avery Lee", "CS101", "CS101-W2", 7 * 24 * 60),
        ("stu-kiara", "Kiara Patel", "Cs101", "CS101-W2", 7 * 24 * 60 + 2),
        ("stu-jules", "Jules Moreno", "MA200", "MA200-W1", 26 * 60),
    ];

    for (student, name, course, session, minutes) in check_ins {
        sqlx::query(
            r#"
            INSERT INTO attendance.check_ins
            (id, student_ref, student_name, course_code, course_code_norm, session_code, checked_in_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT check_ins_student_session_key DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(name)
        .bind(course)
        .bind(normalize_course_code(course))
        .bind(session)
        .bind(base + Duration::minutes(minutes))
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub already_recorded: usize,
}

/// Replays a CSV of check-ins through the ledger so duplicates are
/// reported instead of rejected.
pub async fn import_csv(
    ledger: &CheckInLedger,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_ref: String,
        student_name: Option<String>,
        course_code: String,
        session_code: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", line + 1))?;
        let outcome = ledger
            .check_in(
                &row.student_ref,
                row.student_name.as_deref(),
                &row.course_code,
                &row.session_code,
            )
            .await
            .with_context(|| format!("row {} rejected", line + 1))?;

        match outcome {
            CheckInOutcome::Created => summary.created += 1,
            CheckInOutcome::AlreadyRecorded => summary.already_recorded += 1,
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UNKNOWN_STUDENT;
    use crate::memory::MemoryCheckInStore;
    use std::io::Write;
    use std::sync::Arc;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn memory_ledger() -> (Arc<MemoryCheckInStore>, CheckInLedger) {
        let store = Arc::new(MemoryCheckInStore::new());
        (store.clone(), CheckInLedger::new(store))
    }

    #[tokio::test]
    async fn import_counts_duplicates_and_defaults_names() {
        let file = csv_file(include_str!("../demos/check_ins.csv"));
        let (store, ledger) = memory_ledger();

        let summary = import_csv(&ledger, file.path()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                created: 2,
                already_recorded: 1,
            }
        );
        assert_eq!(store.len().await, 2);

        let entries = ledger.list_for_session("CS101-W3").await.unwrap();
        let jules = entries.iter().find(|e| e.student_ref == "stu-jules").unwrap();
        assert_eq!(jules.student_name, UNKNOWN_STUDENT);
    }

    #[tokio::test]
    async fn import_reports_row_of_invalid_check_in() {
        let file = csv_file(
            "student_ref,student_name,course_code,session_code\n\
             stu-avery,Avery Lee,CS101,CS101-W3\n\
             stu-jules,Jules Moreno,CS101,\n",
        );
        let (store, ledger) = memory_ledger();

        let err = import_csv(&ledger, file.path()).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("row 2"), "{message}");
        assert!(message.contains("sessionCode"), "{message}");
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn unknown_course_status_is_invalid_data() {
        assert_eq!(parse_status("APPROVED").unwrap(), CourseStatus::Approved);
        assert!(matches!(
            parse_status("ARCHIVED"),
            Err(StoreError::InvalidData(_))
        ));
    }
}
