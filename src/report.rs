use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{DailyCount, SessionSummary};
use crate::normalize::normalize_course_code;

#[derive(Debug, Clone, PartialEq)]
pub struct CourseMix {
    pub course_name: String,
    pub sessions: usize,
    pub attendees: usize,
    pub avg_attendance: f64,
}

pub fn summarize_by_course(history: &[SessionSummary]) -> Vec<CourseMix> {
    let mut map: HashMap<String, (String, usize, usize)> = HashMap::new();

    for session in history {
        let entry = map
            .entry(normalize_course_code(&session.course_code))
            .or_insert_with(|| (session.course_name.clone(), 0, 0));
        entry.1 += 1;
        entry.2 += session.attendee_count;
    }

    let mut mix: Vec<CourseMix> = map
        .into_values()
        .map(|(course_name, sessions, attendees)| CourseMix {
            course_name,
            sessions,
            attendees,
            avg_attendance: if sessions == 0 {
                0.0
            } else {
                attendees as f64 / sessions as f64
            },
        })
        .collect();

    mix.sort_by(|a, b| {
        b.sessions
            .cmp(&a.sessions)
            .then_with(|| a.course_name.cmp(&b.course_name))
    });
    mix
}

pub fn build_report(lecturer: &str, history: &[SessionSummary], chart: &[DailyCount]) -> String {
    let mix = summarize_by_course(history);
    let mut output = String::new();

    let _ = writeln!(output, "# Lecturer Attendance Report");
    let _ = writeln!(output, "Generated for {lecturer}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Mix");

    if mix.is_empty() {
        let _ = writeln!(output, "No sessions recorded yet.");
    } else {
        for course in mix.iter() {
            let _ = writeln!(
                output,
                "- {}: {} sessions, {} check-ins (avg {:.1} per session)",
                course.course_name, course.sessions, course.attendees, course.avg_attendance
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Sessions");

    if history.is_empty() {
        let _ = writeln!(output, "No sessions recorded yet.");
    } else {
        for session in history.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}) started {}: {} attendees",
                session.session_code,
                session.course_name,
                session.start_time.format("%Y-%m-%d %H:%M UTC"),
                session.attendee_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Check-ins");

    if chart.is_empty() {
        let _ = writeln!(output, "No check-ins in this window.");
    } else {
        for day in chart {
            let _ = writeln!(output, "- {} {}: {}", day.label, day.day, day.count);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn session(code: &str, course: &str, name: &str, hour: u32, attendees: usize) -> SessionSummary {
        SessionSummary {
            session_code: code.to_string(),
            course_code: course.to_string(),
            course_name: name.to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap(),
            attendee_count: attendees,
        }
    }

    #[test]
    fn course_mix_merges_case_variants() {
        let history = vec![
            session("A", "CS101", "Intro", 9, 20),
            session("B", "cs101", "Intro", 11, 10),
            session("C", "MA200", "Calculus", 13, 5),
        ];

        let mix = summarize_by_course(&history);
        assert_eq!(mix.len(), 2);
        assert_eq!(mix[0].course_name, "Intro");
        assert_eq!(mix[0].sessions, 2);
        assert_eq!(mix[0].attendees, 30);
        assert!((mix[0].avg_attendance - 15.0).abs() < 0.001);
    }

    #[test]
    fn report_lists_sessions_and_chart() {
        let history = vec![session("SESSA", "CS101", "Intro", 9, 2)];
        let chart = vec![DailyCount {
            day: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            label: "Mon".to_string(),
            count: 2,
        }];

        let report = build_report("lect-1", &history, &chart);
        assert!(report.starts_with("# Lecturer Attendance Report"));
        assert!(report.contains("- Intro: 1 sessions, 2 check-ins (avg 2.0 per session)"));
        assert!(report.contains("- SESSA (Intro) started 2026-03-02 09:00 UTC: 2 attendees"));
        assert!(report.contains("- Mon 2026-03-02: 2"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report("lect-1", &[], &[]);
        assert!(report.contains("No sessions recorded yet."));
        assert!(report.contains("No check-ins in this window."));
    }
}
