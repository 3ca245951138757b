use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub id: Uuid,
    pub student_ref: String,
    pub student_name: String,
    pub course_code: String,
    pub session_code: String,
    pub timestamp: DateTime<Utc>,
}

/// A validated check-in request, ready to be written to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckIn {
    pub student_ref: String,
    pub student_name: String,
    pub course_code: String,
    pub session_code: String,
}

impl NewCheckIn {
    pub fn into_record(self, timestamp: DateTime<Utc>) -> CheckInRecord {
        CheckInRecord {
            id: Uuid::new_v4(),
            student_ref: self.student_ref,
            student_name: self.student_name,
            course_code: self.course_code,
            session_code: self.session_code,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInOutcome {
    Created,
    AlreadyRecorded,
}

impl CheckInOutcome {
    pub fn message(self) -> &'static str {
        match self {
            CheckInOutcome::Created => "Attendance recorded successfully",
            CheckInOutcome::AlreadyRecorded => "Already checked in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub student_name: String,
    pub student_ref: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeView {
    pub student_name: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionAttendance {
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<Vec<AttendeeView>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_code: String,
    pub course_code: String,
    pub course_name: String,
    pub start_time: DateTime<Utc>,
    pub attendee_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourseStatus {
    Pending,
    Approved,
    Rejected,
}

impl CourseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseStatus::Pending => "PENDING",
            CourseStatus::Approved => "APPROVED",
            CourseStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(CourseStatus::Pending),
            "APPROVED" => Some(CourseStatus::Approved),
            "REJECTED" => Some(CourseStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub course_code: String,
    pub course_name: String,
    pub lecturer_ref: String,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Lecturer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Lecturer => "LECTURER",
            Role::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub display_name: String,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOverview {
    pub courses: Vec<CourseRecord>,
    pub total_students: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityItem {
    pub title: String,
    pub desc: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub students: i64,
    pub lecturers: i64,
    pub active_courses: i64,
    pub check_ins: i64,
    pub recent_activity: Vec<ActivityItem>,
    pub chart: Vec<DailyCount>,
}
