//! Persistence for students, courses and attendance
//!
//! Each collection lives under a single key as a JSON array. Collections
//! that were never written fall back to the bundled demo roster.

pub mod backend;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub use backend::{FileStore, InMemoryStore, KeyValueStore};

use crate::types::{AttendanceRecord, Course, Student};

pub const STUDENTS_KEY: &str = "eduface_students";
pub const COURSES_KEY: &str = "eduface_courses";
pub const ATTENDANCE_KEY: &str = "eduface_attendance";

/// Typed collections on top of a key-value backend
pub struct Database {
    backend: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl Database {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Database backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Database backed by JSON files under `dir`
    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::new(Arc::new(FileStore::open(dir)?)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Database write lock poisoned"))
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>> {
        match self.backend.get(key)? {
            Some(blob) => {
                let items = serde_json::from_str(&blob)
                    .with_context(|| format!("Corrupt collection under {}", key))?;
                Ok(Some(items))
            }
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let blob = serde_json::to_string(items)
            .with_context(|| format!("Failed to serialize {}", key))?;
        self.backend.set(key, &blob)
    }

    // ---- students ----

    pub fn get_students(&self) -> Result<Vec<Student>> {
        Ok(self.load(STUDENTS_KEY)?.unwrap_or_else(default_students))
    }

    pub fn get_student(&self, id: &str) -> Result<Option<Student>> {
        Ok(self.get_students()?.into_iter().find(|s| s.id == id))
    }

    /// Insert or replace by `id`
    pub fn save_student(&self, student: Student) -> Result<()> {
        let _guard = self.lock()?;
        let mut students = self.get_students()?;
        match students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => *existing = student,
            None => students.push(student),
        }
        self.save(STUDENTS_KEY, &students)
    }

    /// Remove a student and every attendance record that refers to them
    pub fn delete_student(&self, id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let mut students = self.get_students()?;
        let before = students.len();
        students.retain(|s| s.id != id);
        if students.len() == before {
            return Ok(false);
        }
        self.save(STUDENTS_KEY, &students)?;

        let mut attendance = self.get_attendance()?;
        let records_before = attendance.len();
        attendance.retain(|a| a.student_id != id);
        if attendance.len() != records_before {
            self.save(ATTENDANCE_KEY, &attendance)?;
        }

        info!(
            "Deleted student {} and {} attendance records",
            id,
            records_before - attendance.len()
        );
        Ok(true)
    }

    /// Case-insensitive match on name or student code
    pub fn search_students(&self, term: &str) -> Result<Vec<Student>> {
        let needle = term.trim().to_lowercase();
        Ok(self
            .get_students()?
            .into_iter()
            .filter(|s| {
                needle.is_empty()
                    || s.name.to_lowercase().contains(&needle)
                    || s.student_id.to_lowercase().contains(&needle)
            })
            .collect())
    }

    // ---- courses ----

    pub fn get_courses(&self) -> Result<Vec<Course>> {
        Ok(self.load(COURSES_KEY)?.unwrap_or_else(default_courses))
    }

    pub fn get_course(&self, id: &str) -> Result<Option<Course>> {
        Ok(self.get_courses()?.into_iter().find(|c| c.id == id))
    }

    /// Insert or replace by `id`
    pub fn save_course(&self, course: Course) -> Result<()> {
        let _guard = self.lock()?;
        let mut courses = self.get_courses()?;
        match courses.iter_mut().find(|c| c.id == course.id) {
            Some(existing) => *existing = course,
            None => courses.push(course),
        }
        self.save(COURSES_KEY, &courses)
    }

    /// Remove a course and its attendance history
    pub fn delete_course(&self, id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let mut courses = self.get_courses()?;
        let before = courses.len();
        courses.retain(|c| c.id != id);
        if courses.len() == before {
            return Ok(false);
        }
        self.save(COURSES_KEY, &courses)?;

        let mut attendance = self.get_attendance()?;
        let records_before = attendance.len();
        attendance.retain(|a| a.course_id != id);
        if attendance.len() != records_before {
            self.save(ATTENDANCE_KEY, &attendance)?;
        }
        Ok(true)
    }

    // ---- attendance ----

    pub fn get_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        Ok(self.load(ATTENDANCE_KEY)?.unwrap_or_default())
    }

    /// Append a record unless the student already has one for this course on
    /// the record's calendar day. Returns whether it was stored.
    pub fn mark_attendance(&self, record: AttendanceRecord) -> Result<bool> {
        let _guard = self.lock()?;
        let mut history = self.get_attendance()?;
        if history.iter().any(|h| h.same_session(&record)) {
            debug!(
                "Rejected duplicate attendance for student {} in course {} on {}",
                record.student_id,
                record.course_id,
                record.day()
            );
            return Ok(false);
        }
        history.push(record);
        self.save(ATTENDANCE_KEY, &history)?;
        Ok(true)
    }

    /// Write the demo roster and schedule explicitly
    pub fn seed_defaults(&self) -> Result<()> {
        let _guard = self.lock()?;
        self.save(STUDENTS_KEY, &default_students())?;
        self.save(COURSES_KEY, &default_courses())?;
        info!("Seeded default students and courses");
        Ok(())
    }
}

/// Demo roster used until a roster is saved
pub fn default_students() -> Vec<Student> {
    [
        ("1", "Alex Thompson", "S101", "alex@uni.edu", "alex"),
        ("2", "Sarah Chen", "S102", "sarah@uni.edu", "sarah"),
        ("3", "Marcus Miller", "S103", "marcus@uni.edu", "marcus"),
    ]
    .into_iter()
    .map(|(id, name, code, email, seed)| Student {
        id: id.to_string(),
        name: name.to_string(),
        student_id: code.to_string(),
        profile_image: Some(format!("https://picsum.photos/seed/{}/200", seed)),
        email: email.to_string(),
    })
    .collect()
}

/// Demo schedule used until courses are saved
pub fn default_courses() -> Vec<Course> {
    vec![
        Course {
            id: "c1".to_string(),
            code: "CS101".to_string(),
            name: "Introduction to AI".to_string(),
            lecturer_id: "l1".to_string(),
            start_time: "09:00".to_string(),
            days_of_week: vec!["Monday".into(), "Wednesday".into(), "Friday".into()],
            early_buffer: 15,
            late_buffer: 10,
        },
        Course {
            id: "c2".to_string(),
            code: "CS202".to_string(),
            name: "Database Management".to_string(),
            lecturer_id: "l1".to_string(),
            start_time: "14:30".to_string(),
            days_of_week: vec!["Tuesday".into(), "Thursday".into()],
            early_buffer: 15,
            late_buffer: 10,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceStatus;
    use chrono::DateTime;

    fn record(id: &str, student: &str, course: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: id.into(),
            student_id: student.into(),
            course_id: course.into(),
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap(),
            status: AttendanceStatus::Present,
            confidence_score: 0.9,
        }
    }

    #[test]
    fn test_defaults_until_written() {
        let db = Database::in_memory();
        assert_eq!(db.get_students().unwrap().len(), 3);
        assert_eq!(db.get_courses().unwrap()[1].code, "CS202");
        assert!(db.get_attendance().unwrap().is_empty());
    }

    #[test]
    fn test_save_student_upserts() {
        let db = Database::in_memory();
        let mut alex = db.get_student("1").unwrap().unwrap();
        alex.email = "alex@new.edu".into();
        db.save_student(alex).unwrap();

        let students = db.get_students().unwrap();
        assert_eq!(students.len(), 3);
        assert_eq!(students[0].email, "alex@new.edu");

        db.save_student(Student {
            id: "4".into(),
            name: "Dana Ortiz".into(),
            student_id: "S104".into(),
            profile_image: None,
            email: "dana@uni.edu".into(),
        })
        .unwrap();
        assert_eq!(db.get_students().unwrap().len(), 4);
    }

    #[test]
    fn test_delete_student_cascades_attendance() {
        let db = Database::in_memory();
        db.mark_attendance(record("a", "1", "c1", "2026-03-02T09:00:00+00:00")).unwrap();
        db.mark_attendance(record("b", "2", "c1", "2026-03-02T09:00:00+00:00")).unwrap();

        assert!(db.delete_student("1").unwrap());
        assert!(!db.delete_student("1").unwrap());

        let remaining = db.get_attendance().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].student_id, "2");
        assert!(db.get_student("1").unwrap().is_none());
    }

    #[test]
    fn test_delete_course_cascades_attendance() {
        let db = Database::in_memory();
        db.mark_attendance(record("a", "1", "c1", "2026-03-02T09:00:00+00:00")).unwrap();
        db.mark_attendance(record("b", "1", "c2", "2026-03-03T14:30:00+00:00")).unwrap();

        assert!(db.delete_course("c1").unwrap());
        assert_eq!(db.get_courses().unwrap().len(), 1);
        assert_eq!(db.get_attendance().unwrap().len(), 1);
    }

    #[test]
    fn test_mark_attendance_once_per_day() {
        let db = Database::in_memory();
        assert!(db.mark_attendance(record("a", "1", "c1", "2026-03-02T09:00:00+00:00")).unwrap());
        assert!(!db.mark_attendance(record("b", "1", "c1", "2026-03-02T17:00:00+00:00")).unwrap());
        // different course, different student, different day all pass
        assert!(db.mark_attendance(record("c", "1", "c2", "2026-03-02T17:00:00+00:00")).unwrap());
        assert!(db.mark_attendance(record("d", "2", "c1", "2026-03-02T09:05:00+00:00")).unwrap());
        assert!(db.mark_attendance(record("e", "1", "c1", "2026-03-04T09:00:00+00:00")).unwrap());
        assert_eq!(db.get_attendance().unwrap().len(), 4);
    }

    #[test]
    fn test_deleting_unknown_ids_writes_nothing() {
        let backend = Arc::new(InMemoryStore::new());
        let db = Database::new(backend.clone());

        assert!(!db.delete_student("nobody").unwrap());
        assert!(!db.delete_course("nothing").unwrap());
        assert!(backend.get(STUDENTS_KEY).unwrap().is_none());
        assert!(backend.get(COURSES_KEY).unwrap().is_none());
        assert!(backend.get(ATTENDANCE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_search_students() {
        let db = Database::in_memory();
        assert_eq!(db.search_students("CHEN").unwrap()[0].id, "2");
        assert_eq!(db.search_students("s103").unwrap()[0].name, "Marcus Miller");
        assert_eq!(db.search_students("").unwrap().len(), 3);
        assert!(db.search_students("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.seed_defaults().unwrap();
            db.mark_attendance(record("a", "1", "c1", "2026-03-02T09:00:00+00:00")).unwrap();
        }
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.get_attendance().unwrap().len(), 1);
        assert_eq!(db.get_students().unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let backend = Arc::new(InMemoryStore::new());
        backend.set(COURSES_KEY, "{not json").unwrap();
        let db = Database::new(backend);
        assert!(db.get_courses().is_err());
    }
}
