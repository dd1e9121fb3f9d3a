//! Check-in window arithmetic
//!
//! Times are compared as minutes since midnight in the wall clock of the
//! supplied timestamp. A course's check-in window opens `early_buffer`
//! minutes before its start; anything later than `late_buffer` minutes after
//! the start is classified as late. There is no closing time.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::Course;

/// Schedule parsing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time of day '{0}', expected HH:mm")]
    InvalidTime(String),
}

/// Buffers applied when a course leaves its own at zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDefaults {
    pub early: u32,
    pub late: u32,
}

impl Default for BufferDefaults {
    fn default() -> Self {
        Self { early: 15, late: 10 }
    }
}

impl BufferDefaults {
    pub fn early_for(&self, course: &Course) -> u32 {
        if course.early_buffer == 0 { self.early } else { course.early_buffer }
    }

    pub fn late_for(&self, course: &Course) -> u32 {
        if course.late_buffer == 0 { self.late } else { course.late_buffer }
    }
}

/// Where a moment falls relative to a course's check-in window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Check-in has not opened yet
    TooEarly {
        opens_at_minutes: i64,
        early_buffer: u32,
    },
    OnTime,
    Late,
}

/// Parse "HH:mm" into minutes since midnight
pub fn parse_time_of_day(value: &str) -> Result<u32, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(value.to_string());
    let (h, m) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = h.parse().map_err(|_| invalid())?;
    let minutes: u32 = m.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 || m.len() != 2 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Format minutes since midnight as "HH:mm"
pub fn format_time_of_day(minutes: i64) -> String {
    let clamped = minutes.rem_euclid(24 * 60);
    format!("{:02}:{:02}", clamped / 60, clamped % 60)
}

/// Minutes since midnight of `now`
pub fn minutes_of_day(now: &DateTime<FixedOffset>) -> u32 {
    now.hour() * 60 + now.minute()
}

/// Whether a course runs on the given weekday. No days means every day.
pub fn is_scheduled_on(course: &Course, day: Weekday) -> bool {
    course.days_of_week.is_empty() || course.weekdays().contains(&day)
}

/// Courses running on the weekday of `now`
pub fn todays_courses<'a>(courses: &'a [Course], now: &DateTime<FixedOffset>) -> Vec<&'a Course> {
    let today = now.weekday();
    courses.iter().filter(|c| is_scheduled_on(c, today)).collect()
}

/// Today's course whose start is closest to `now`, earlier entries winning ties
pub fn nearest_course<'a>(courses: &'a [Course], now: &DateTime<FixedOffset>) -> Option<&'a Course> {
    let current = i64::from(minutes_of_day(now));
    let mut best: Option<(&Course, i64)> = None;

    for course in todays_courses(courses, now) {
        let start = match course.start_minutes() {
            Ok(start) => i64::from(start),
            Err(e) => {
                warn!("Skipping course {} in session selection: {}", course.code, e);
                continue;
            }
        };
        let distance = (start - current).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((course, distance)),
        }
    }

    best.map(|(course, _)| course)
}

/// Classify `now` against a course's check-in window
pub fn evaluate(
    course: &Course,
    now: &DateTime<FixedOffset>,
    defaults: &BufferDefaults,
) -> Result<WindowDecision, ScheduleError> {
    let start = i64::from(course.start_minutes()?);
    let current = i64::from(minutes_of_day(now));
    let early = defaults.early_for(course);
    let late = defaults.late_for(course);

    let opens_at = start - i64::from(early);
    if current < opens_at {
        return Ok(WindowDecision::TooEarly {
            opens_at_minutes: opens_at,
            early_buffer: early,
        });
    }

    if current > start + i64::from(late) {
        Ok(WindowDecision::Late)
    } else {
        Ok(WindowDecision::OnTime)
    }
}
