use std::collections::HashMap;

use crate::models::CourseRecord;

/// Canonical form used whenever course codes from the registry and the
/// ledger are compared.
pub fn normalize_course_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Registry courses keyed by normalized code. The first course seen for a
/// code wins.
#[derive(Debug, Default)]
pub struct CourseIndex {
    by_code: HashMap<String, CourseRecord>,
}

impl CourseIndex {
    pub fn build(courses: &[CourseRecord]) -> Self {
        let mut by_code = HashMap::new();
        for course in courses {
            by_code
                .entry(normalize_course_code(&course.course_code))
                .or_insert_with(|| course.clone());
        }
        Self { by_code }
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(&normalize_course_code(code))
    }

    pub fn lookup(&self, code: &str) -> Option<&CourseRecord> {
        self.by_code.get(&normalize_course_code(code))
    }

    /// Display name for a ledger course code, falling back to the raw code.
    pub fn display_name(&self, code: &str) -> String {
        self.lookup(code)
            .map(|course| course.course_name.clone())
            .unwrap_or_else(|| code.to_string())
    }

    /// Normalized codes, sorted so store queries are stable.
    pub fn normalized_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.by_code.keys().cloned().collect();
        codes.sort();
        codes
    }
}
