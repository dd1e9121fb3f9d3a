//! Lecturer dashboard figures and session close-out

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::schedule::{self, BufferDefaults};
use crate::store::Database;
use crate::types::{weekday_name, AttendanceRecord, AttendanceStatus, Student};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Unknown course: {0}")]
    UnknownCourse(String),

    #[error("{code} is not scheduled on {day}")]
    NotScheduled { code: String, day: String },

    #[error("Cannot close the {0} session before it has happened")]
    FutureDate(NaiveDate),

    #[error("{code} check-in is still open until {closes_at}")]
    SessionOpen { code: String, closes_at: String },

    #[error("Course schedule is invalid: {0}")]
    Schedule(#[from] schedule::ScheduleError),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Attended check-ins recorded per course
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEngagement {
    pub course_id: String,
    pub code: String,
    pub count: usize,
}

/// A student whose attendance rate is below the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskEntry {
    pub student: Student,
    /// Percent
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub database_size: usize,
    pub managed_courses: usize,
    pub todays_traffic: usize,
    pub course_engagement: Vec<CourseEngagement>,
    pub risk_watch: Vec<RiskEntry>,
}

/// A course's record joined with who it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub student_name: Option<String>,
    pub student_code: Option<String>,
}

/// Summary figures for the lecturer dashboard
pub fn dashboard(
    db: &Database,
    now: &DateTime<FixedOffset>,
    risk_threshold: f64,
) -> anyhow::Result<Dashboard> {
    let students = db.get_students()?;
    let courses = db.get_courses()?;
    let attendance: Vec<AttendanceRecord> = db
        .get_attendance()?
        .into_iter()
        .filter(AttendanceRecord::attended)
        .collect();
    let today = now.date_naive();

    let course_engagement = courses
        .iter()
        .map(|c| CourseEngagement {
            course_id: c.id.clone(),
            code: c.code.clone(),
            count: attendance.iter().filter(|a| a.course_id == c.id).count(),
        })
        .collect();

    let mut risk_watch: Vec<RiskEntry> = students
        .iter()
        .map(|s| {
            let records = attendance.iter().filter(|a| a.student_id == s.id).count();
            let rate = if courses.is_empty() {
                0.0
            } else {
                records as f64 / courses.len() as f64 * 100.0
            };
            RiskEntry { student: s.redacted(), rate }
        })
        .filter(|entry| entry.rate < risk_threshold)
        .collect();
    risk_watch.sort_by(|a, b| a.rate.total_cmp(&b.rate));

    Ok(Dashboard {
        database_size: students.len(),
        managed_courses: courses.len(),
        todays_traffic: attendance.iter().filter(|a| a.day() == today).count(),
        course_engagement,
        risk_watch,
    })
}

/// Every record for one course, in insertion order
pub fn attendance_stream(db: &Database, course_id: &str) -> anyhow::Result<Vec<StreamEntry>> {
    let students = db.get_students()?;
    Ok(db
        .get_attendance()?
        .into_iter()
        .filter(|a| a.course_id == course_id)
        .map(|record| {
            let student = students.iter().find(|s| s.id == record.student_id);
            StreamEntry {
                student_name: student.map(|s| s.name.clone()),
                student_code: student.map(|s| s.student_id.clone()),
                record,
            }
        })
        .collect())
}

/// Records that count as a session attended
pub fn sessions_attended(records: &[AttendanceRecord]) -> usize {
    records.iter().filter(|r| r.attended()).count()
}

/// Close a session: every student without a record for the course on `date`
/// gets an ABSENT record stamped at the course start time.
///
/// Only past sessions can be closed. Today's session stays open until its
/// late buffer has run out.
pub fn mark_absentees(
    db: &Database,
    course_id: &str,
    date: NaiveDate,
    now: &DateTime<FixedOffset>,
    defaults: &BufferDefaults,
) -> Result<Vec<AttendanceRecord>, RosterError> {
    let course = db
        .get_course(course_id)?
        .ok_or_else(|| RosterError::UnknownCourse(course_id.to_string()))?;

    let today = now.date_naive();
    if date > today {
        return Err(RosterError::FutureDate(date));
    }

    if !schedule::is_scheduled_on(&course, date.weekday()) {
        return Err(RosterError::NotScheduled {
            code: course.code,
            day: weekday_name(date.weekday()).to_string(),
        });
    }

    let start = course.start_minutes()?;
    if date == today {
        let closes_at = i64::from(start) + i64::from(defaults.late_for(&course));
        if i64::from(schedule::minutes_of_day(now)) <= closes_at {
            return Err(RosterError::SessionOpen {
                code: course.code,
                closes_at: schedule::format_time_of_day(closes_at),
            });
        }
    }

    let offset = *now.offset();
    let timestamp = date
        .and_hms_opt(start / 60, start % 60, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .ok_or_else(|| anyhow::anyhow!("Cannot stamp {} at {}", date, course.start_time))?;

    let mut marked = Vec::new();
    for student in db.get_students()? {
        let record = AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            course_id: course.id.clone(),
            timestamp,
            status: AttendanceStatus::Absent,
            confidence_score: 0.0,
        };
        if db.mark_attendance(record.clone())? {
            marked.push(record);
        }
    }

    info!("Marked {} absentees for {} on {}", marked.len(), course.code, date);
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(ts).unwrap()
    }

    fn record(student: &str, course: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("{}-{}-{}", student, course, ts),
            student_id: student.into(),
            course_id: course.into(),
            timestamp: at(ts),
            status: AttendanceStatus::Present,
            confidence_score: 0.9,
        }
    }

    fn populated() -> Database {
        let db = Database::in_memory();
        db.mark_attendance(record("1", "c1", "2026-03-02T09:00:00+00:00")).unwrap();
        db.mark_attendance(record("1", "c2", "2026-03-03T14:30:00+00:00")).unwrap();
        db.mark_attendance(record("2", "c1", "2026-03-04T09:00:00+00:00")).unwrap();
        db
    }

    #[test]
    fn test_dashboard_counts() {
        let db = populated();
        let board = dashboard(&db, &at("2026-03-04T12:00:00+00:00"), 70.0).unwrap();

        assert_eq!(board.database_size, 3);
        assert_eq!(board.managed_courses, 2);
        assert_eq!(board.todays_traffic, 1);
        assert_eq!(board.course_engagement[0].code, "CS101");
        assert_eq!(board.course_engagement[0].count, 2);
        assert_eq!(board.course_engagement[1].count, 1);
    }

    #[test]
    fn test_risk_watch_sorted_ascending_below_threshold() {
        let db = populated();
        let board = dashboard(&db, &at("2026-03-04T12:00:00+00:00"), 70.0).unwrap();

        // Alex has 2 records over 2 courses (100%) and is not at risk
        let ids: Vec<&str> = board.risk_watch.iter().map(|r| r.student.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(board.risk_watch[0].rate, 0.0);
        assert_eq!(board.risk_watch[1].rate, 50.0);
        assert!(board.risk_watch.iter().all(|r| r.student.profile_image.is_none()));
    }

    #[test]
    fn test_risk_rate_zero_without_courses() {
        let db = Database::in_memory();
        db.delete_course("c1").unwrap();
        db.delete_course("c2").unwrap();
        let board = dashboard(&db, &at("2026-03-04T12:00:00+00:00"), 70.0).unwrap();
        assert_eq!(board.risk_watch.len(), 3);
        assert!(board.risk_watch.iter().all(|r| r.rate == 0.0));
    }

    #[test]
    fn test_attendance_stream_joins_students() {
        let db = populated();
        db.delete_student("2").unwrap();
        db.mark_attendance(record("ghost", "c1", "2026-03-06T09:00:00+00:00")).unwrap();

        let stream = attendance_stream(&db, "c1").unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[0].student_name.as_deref(), Some("Alex Thompson"));
        assert_eq!(stream[0].student_code.as_deref(), Some("S101"));
        assert!(stream[1].student_name.is_none());
    }

    #[test]
    fn test_mark_absentees_fills_gaps_once() {
        let db = populated();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let later = at("2026-03-02T18:00:00+00:00");
        let buffers = BufferDefaults::default();

        let marked = mark_absentees(&db, "c1", date, &later, &buffers).unwrap();
        let ids: Vec<&str> = marked.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(marked.iter().all(|r| r.status == AttendanceStatus::Absent));
        assert_eq!(marked[0].timestamp, at("2026-03-02T09:00:00+00:00"));

        assert!(mark_absentees(&db, "c1", date, &later, &buffers).unwrap().is_empty());
    }

    #[test]
    fn test_mark_absentees_rejects_unscheduled_day_and_unknown_course() {
        let db = Database::in_memory();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let now = at("2026-03-04T12:00:00+00:00");
        let buffers = BufferDefaults::default();

        assert!(matches!(
            mark_absentees(&db, "c1", tuesday, &now, &buffers),
            Err(RosterError::NotScheduled { .. })
        ));
        assert!(matches!(
            mark_absentees(&db, "zz", tuesday, &now, &buffers),
            Err(RosterError::UnknownCourse(_))
        ));
    }

    #[test]
    fn test_mark_absentees_refuses_future_dates() {
        let db = Database::in_memory();
        let wednesday = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let monday = at("2026-03-02T18:00:00+00:00");

        let result = mark_absentees(&db, "c1", wednesday, &monday, &BufferDefaults::default());
        assert!(matches!(result, Err(RosterError::FutureDate(d)) if d == wednesday));
        assert!(db.get_attendance().unwrap().is_empty());
    }

    #[test]
    fn test_todays_session_stays_open_through_late_buffer() {
        let db = Database::in_memory();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let buffers = BufferDefaults::default();

        // CS101 starts 09:00 with a 10 minute late buffer
        for time in ["07:00", "08:50", "09:00", "09:10"] {
            let now = at(&format!("2026-03-02T{}:00+00:00", time));
            match mark_absentees(&db, "c1", date, &now, &buffers) {
                Err(RosterError::SessionOpen { closes_at, .. }) => assert_eq!(closes_at, "09:10"),
                other => panic!("expected an open session at {}, got {:?}", time, other),
            }
        }
        assert!(db.get_attendance().unwrap().is_empty());

        let marked = mark_absentees(&db, "c1", date, &at("2026-03-02T09:11:00+00:00"), &buffers).unwrap();
        assert_eq!(marked.len(), 3);
    }

    #[test]
    fn test_absent_records_do_not_count_as_attendance() {
        let db = Database::in_memory();
        let buffers = BufferDefaults::default();
        let evening = at("2026-03-04T18:00:00+00:00");
        for day in [2, 4] {
            let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
            mark_absentees(&db, "c1", date, &evening, &buffers).unwrap();
        }
        assert_eq!(db.get_attendance().unwrap().len(), 6);

        let board = dashboard(&db, &evening, 70.0).unwrap();
        assert_eq!(board.todays_traffic, 0);
        assert_eq!(board.course_engagement[0].count, 0);
        assert_eq!(board.risk_watch.len(), 3);
        assert!(board.risk_watch.iter().all(|r| r.rate == 0.0));

        let records = db.get_attendance().unwrap();
        assert_eq!(sessions_attended(&records), 0);
    }

    #[test]
    fn test_sessions_attended_counts_present_and_late() {
        let mut late = record("1", "c1", "2026-03-04T09:20:00+00:00");
        late.status = AttendanceStatus::Late;
        let mut absent = record("1", "c1", "2026-03-06T09:00:00+00:00");
        absent.status = AttendanceStatus::Absent;
        let records = vec![record("1", "c1", "2026-03-02T09:00:00+00:00"), late, absent];
        assert_eq!(sessions_attended(&records), 2);
    }
}
