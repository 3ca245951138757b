use sqlx::error::DatabaseError;
use thiserror::Error;

/// Name of the `(student_ref, session_code)` unique constraint on
/// `attendance.check_ins`.
pub const CHECK_IN_KEY: &str = "check_ins_student_session_key";

/// Failures reported by a check-in store or lookup collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(student_ref, session_code)` key already holds a record.
    #[error("check-in already exists for this student and session")]
    UniquenessConflict,

    #[error("store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored row holds a value the crate cannot interpret.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

fn is_check_in_key_violation(db: &(dyn DatabaseError + 'static)) -> bool {
    db.is_unique_violation() && db.constraint() == Some(CHECK_IN_KEY)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let conflict = err
            .as_database_error()
            .map(is_check_in_key_violation)
            .unwrap_or(false);

        if conflict {
            StoreError::UniquenessConflict
        } else {
            StoreError::Unavailable(Box::new(err))
        }
    }
}

/// Errors that cross the ledger boundary.
///
/// Duplicate check-ins and empty lookups are ordinary results, so they
/// never appear here.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    StoreUnavailable(StoreError),

    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidData(message) => LedgerError::InvalidData(message),
            other => LedgerError::StoreUnavailable(other),
        }
    }
}

impl LedgerError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, LedgerError::Validation(_))
    }
}
