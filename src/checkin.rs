//! Student check-in flow
//!
//! Resolves the student and session, enforces the check-in window, asks the
//! verifier for a verdict and records attendance at most once per day.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::schedule::{self, BufferDefaults, ScheduleError, WindowDecision};
use crate::store::Database;
use crate::types::{AttendanceRecord, AttendanceStatus, Course, Student};
use crate::verify::FaceVerifier;

/// Why a check-in did not produce a record
#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("Unknown student: {0}")]
    UnknownStudent(String),

    #[error("Unknown course: {0}")]
    UnknownCourse(String),

    #[error("No course is scheduled today")]
    NoCourseToday,

    #[error("Too early. Check-in starts {early_buffer} mins before class.")]
    TooEarly { early_buffer: u32, opens_at: String },

    /// The verifier did not confirm the identity; carries its reason
    #[error("{0}")]
    Rejected(String),

    #[error("Biometric link timed out. Please check your connection.")]
    Timeout,

    #[error("Duplicate Entry: You have already checked in for this session today.")]
    Duplicate,

    #[error("Course schedule is invalid: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Verification failed: {0:#}")]
    Verification(anyhow::Error),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// A capture submitted by a student
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// `Student::id`
    pub student_id: String,
    /// Explicit session; the nearest of today's courses when absent
    #[serde(default)]
    pub course_id: Option<String>,
    /// Captured photo as a data URL or bare base64
    pub image: String,
}

/// A stored check-in and the verifier's message
#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub message: String,
}

/// A student's records, newest first
pub fn history(db: &Database, student_id: &str) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut records: Vec<AttendanceRecord> = db
        .get_attendance()?
        .into_iter()
        .filter(|a| a.student_id == student_id)
        .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}

/// Orchestrates verification and attendance marking
pub struct CheckInService {
    db: Arc<Database>,
    verifier: Arc<dyn FaceVerifier>,
    buffers: BufferDefaults,
    timeout: Duration,
}

impl CheckInService {
    pub fn new(
        db: Arc<Database>,
        verifier: Arc<dyn FaceVerifier>,
        buffers: BufferDefaults,
        timeout: Duration,
    ) -> Self {
        Self { db, verifier, buffers, timeout }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Today's course closest to `now`
    pub fn suggest_course(&self, now: &DateTime<FixedOffset>) -> Result<Option<Course>, CheckInError> {
        let courses = self.db.get_courses().map_err(CheckInError::Storage)?;
        Ok(schedule::nearest_course(&courses, now).cloned())
    }

    /// A student's records, newest first
    pub fn history(&self, student_id: &str) -> Result<Vec<AttendanceRecord>, CheckInError> {
        history(&self.db, student_id).map_err(CheckInError::Storage)
    }

    fn resolve(
        &self,
        request: &CheckInRequest,
        now: &DateTime<FixedOffset>,
    ) -> Result<(Student, Course), CheckInError> {
        let student = self
            .db
            .get_student(&request.student_id)
            .map_err(CheckInError::Storage)?
            .ok_or_else(|| CheckInError::UnknownStudent(request.student_id.clone()))?;

        let course = match request.course_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self
                .db
                .get_course(id)
                .map_err(CheckInError::Storage)?
                .ok_or_else(|| CheckInError::UnknownCourse(id.to_string()))?,
            None => self.suggest_course(now)?.ok_or(CheckInError::NoCourseToday)?,
        };

        Ok((student, course))
    }

    fn already_checked_in(
        &self,
        student: &Student,
        course: &Course,
        now: &DateTime<FixedOffset>,
    ) -> Result<bool, CheckInError> {
        let today = now.date_naive();
        Ok(self
            .db
            .get_attendance()
            .map_err(CheckInError::Storage)?
            .iter()
            .any(|a| a.student_id == student.id && a.course_id == course.id && a.day() == today))
    }

    /// Run the full check-in for a capture taken at `now`
    pub async fn check_in(
        &self,
        request: CheckInRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<CheckInOutcome, CheckInError> {
        let (student, course) = self.resolve(&request, &now)?;

        let decision = schedule::evaluate(&course, &now, &self.buffers)?;
        let status = match decision {
            WindowDecision::TooEarly { opens_at_minutes, early_buffer } => {
                return Err(CheckInError::TooEarly {
                    early_buffer,
                    opens_at: schedule::format_time_of_day(opens_at_minutes),
                });
            }
            WindowDecision::OnTime => AttendanceStatus::Present,
            WindowDecision::Late => AttendanceStatus::Late,
        };

        // Skip the remote call when the insert would be refused anyway
        if self.already_checked_in(&student, &course, &now)? {
            return Err(CheckInError::Duplicate);
        }

        let reference = student.reference_image();
        let verdict = tokio::time::timeout(self.timeout, self.verifier.verify(&request.image, &reference))
            .await
            .map_err(|_| {
                warn!("Verification for student {} timed out after {:?}", student.id, self.timeout);
                CheckInError::Timeout
            })?
            .map_err(CheckInError::Verification)?;

        if !verdict.is_match {
            info!("Verification rejected student {}: {}", student.id, verdict.message);
            return Err(CheckInError::Rejected(verdict.message));
        }

        let record = AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            course_id: course.id.clone(),
            timestamp: now,
            status,
            confidence_score: verdict.confidence,
        };

        if !self.db.mark_attendance(record.clone()).map_err(CheckInError::Storage)? {
            return Err(CheckInError::Duplicate);
        }

        info!(
            "Student {} checked in to {} as {} (confidence {:.2})",
            student.student_id, course.code, record.status, record.confidence_score
        );

        Ok(CheckInOutcome {
            record,
            message: verdict.message,
        })
    }
}
