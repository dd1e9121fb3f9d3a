//! Shared types used across modules
//!
//! Students, courses and attendance records are persisted as JSON blobs, so
//! field names keep the camelCase layout existing data files use.

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleError;

/// Who is using the portal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Student,
    Lecturer,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Student => write!(f, "STUDENT"),
            UserRole::Lecturer => write!(f, "LECTURER"),
        }
    }
}

/// A registered student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Institution code, e.g. "S101"
    pub student_id: String,
    /// Reference image: data URL, bare base64 or an http(s) URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub email: String,
}

impl Student {
    /// Reference image used for verification, falling back to a seeded placeholder
    pub fn reference_image(&self) -> String {
        match &self.profile_image {
            Some(image) if !image.trim().is_empty() => image.clone(),
            _ => format!("https://picsum.photos/seed/{}/200", self.id),
        }
    }

    /// Copy without the reference image, for roster listings
    pub fn redacted(&self) -> Self {
        Self {
            profile_image: None,
            ..self.clone()
        }
    }
}

/// A course and its weekly schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub lecturer_id: String,
    /// "HH:mm", 24 hour clock
    pub start_time: String,
    /// English weekday names; empty means every day
    #[serde(default)]
    pub days_of_week: Vec<String>,
    /// Minutes before start when check-in opens
    #[serde(default)]
    pub early_buffer: u32,
    /// Minutes after start before a check-in counts as late
    #[serde(default)]
    pub late_buffer: u32,
}

impl Course {
    /// Start time as minutes since midnight
    pub fn start_minutes(&self) -> Result<u32, ScheduleError> {
        crate::schedule::parse_time_of_day(&self.start_time)
    }

    /// Scheduled weekdays, ignoring names that do not parse
    pub fn weekdays(&self) -> Vec<Weekday> {
        self.days_of_week
            .iter()
            .filter_map(|d| parse_weekday(d))
            .collect()
    }
}

/// Attendance classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "PRESENT"),
            AttendanceStatus::Late => write!(f, "LATE"),
            AttendanceStatus::Absent => write!(f, "ABSENT"),
        }
    }
}

/// One attendance entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    /// Refers to `Student::id`
    pub student_id: String,
    pub course_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub status: AttendanceStatus,
    pub confidence_score: f64,
}

impl AttendanceRecord {
    /// Calendar day of the record in the offset it was stamped with
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// PRESENT or LATE; ABSENT close-out records do not count
    pub fn attended(&self) -> bool {
        self.status != AttendanceStatus::Absent
    }

    /// True when both records describe the same student, course and day
    pub fn same_session(&self, other: &AttendanceRecord) -> bool {
        self.student_id == other.student_id
            && self.course_id == other.course_id
            && self.day() == other.day()
    }
}

/// Outcome of a remote identity comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub confidence: f64,
    pub message: String,
}

/// Parse an English weekday name ("Monday", "mon", ...)
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}

/// English long name of a weekday, as stored in `Course::days_of_week`
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&AttendanceStatus::Late).unwrap(), "\"LATE\"");
        let parsed: AttendanceStatus = serde_json::from_str("\"ABSENT\"").unwrap();
        assert_eq!(parsed, AttendanceStatus::Absent);
    }

    #[test]
    fn test_course_deserializes_camel_case() {
        let json = r#"{
            "id": "c1", "code": "CS101", "name": "Introduction to AI",
            "lecturerId": "l1", "startTime": "09:00",
            "daysOfWeek": ["Monday", "Wednesday"],
            "earlyBuffer": 15, "lateBuffer": 10
        }"#;
        let course: Course = serde_json::from_str(json).unwrap();
        assert_eq!(course.lecturer_id, "l1");
        assert_eq!(course.weekdays(), vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(course.start_minutes().unwrap(), 540);
    }

    #[test]
    fn test_verification_result_uses_match_key() {
        let json = r#"{"match": true, "confidence": 0.91, "message": "ok"}"#;
        let result: VerificationResult = serde_json::from_str(json).unwrap();
        assert!(result.is_match);
        assert!(serde_json::to_string(&result).unwrap().contains("\"match\":true"));
    }

    #[test]
    fn test_reference_image_fallback() {
        let mut student = Student {
            id: "7".into(),
            name: "Jo".into(),
            student_id: "S7".into(),
            profile_image: None,
            email: "jo@uni.edu".into(),
        };
        assert_eq!(student.reference_image(), "https://picsum.photos/seed/7/200");
        student.profile_image = Some("data:image/jpeg;base64,AAAA".into());
        assert_eq!(student.reference_image(), "data:image/jpeg;base64,AAAA");
        assert!(student.redacted().profile_image.is_none());
    }

    #[test]
    fn test_same_session_compares_calendar_day() {
        let a = AttendanceRecord {
            id: "a".into(),
            student_id: "1".into(),
            course_id: "c1".into(),
            timestamp: DateTime::parse_from_rfc3339("2026-03-02T09:01:00+01:00").unwrap(),
            status: AttendanceStatus::Present,
            confidence_score: 0.9,
        };
        let mut b = a.clone();
        b.timestamp = DateTime::parse_from_rfc3339("2026-03-02T23:59:00+01:00").unwrap();
        assert!(a.same_session(&b));
        b.timestamp = DateTime::parse_from_rfc3339("2026-03-03T00:00:00+01:00").unwrap();
        assert!(!a.same_session(&b));
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(parse_weekday("Friday"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("Funday"), None);
        assert_eq!(weekday_name(Weekday::Sun), "Sunday");
    }
}
