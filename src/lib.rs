//! Attendance check-in ledger and lecturer session history.
//!
//! Students check in to class sessions identified by a session code; each
//! `(student, session)` pair is recorded at most once, even under concurrent
//! submissions. Lecturer history is rebuilt from the raw check-ins on every
//! query, matched to the course registry by normalized course code.

pub mod aggregator;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod report;
pub mod store;

pub use aggregator::SessionAggregator;
pub use error::{LedgerError, StoreError};
pub use ledger::CheckInLedger;
pub use models::{CheckInOutcome, SessionAttendance, SessionSummary};
