//! HTTP handlers for the student portal and the lecturer dashboard

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::analytics::{self, Dashboard, StreamEntry};
use crate::checkin::{CheckInOutcome, CheckInRequest};
use crate::schedule::parse_time_of_day;
use crate::server::auth::{Claims, LoginRequest, LoginResponse, LogoutRequest};
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::store::Database;
use crate::types::{parse_weekday, weekday_name, AttendanceRecord, Course, Student, UserRole};

/// Status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub demo_mode: bool,
    pub lecturer_login: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub student: Student,
    pub sessions: usize,
    pub records: Vec<AttendanceRecord>,
}

/// Registration form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub student_id: String,
    pub email: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpdate {
    pub profile_image: String,
}

/// Session configuration form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    pub start_time: String,
    #[serde(default)]
    pub days_of_week: Vec<String>,
    #[serde(default)]
    pub early_buffer: Option<u32>,
    #[serde(default)]
    pub late_buffer: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AbsenteeRequest {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Validate a course form into a course owned by `lecturer_id`
pub fn build_course(form: NewCourse, lecturer_id: &str) -> Result<Course, ApiError> {
    if form.days_of_week.is_empty() {
        return Err(ApiError::BadRequest(
            "Please select at least one day for the schedule.".to_string(),
        ));
    }

    let mut days = Vec::new();
    for name in &form.days_of_week {
        let day = parse_weekday(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown weekday: {}", name)))?;
        let canonical = weekday_name(day).to_string();
        if !days.contains(&canonical) {
            days.push(canonical);
        }
    }

    let start_time = form.start_time.trim().to_string();
    parse_time_of_day(&start_time).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let id = uuid::Uuid::new_v4().simple().to_string();
    Ok(Course {
        id: format!("c{}", &id[..5]),
        code: required("code", &form.code)?,
        name: required("name", &form.name)?,
        lecturer_id: lecturer_id.to_string(),
        start_time,
        days_of_week: days,
        early_buffer: form.early_buffer.unwrap_or(15),
        late_buffer: form.late_buffer.unwrap_or(10),
    })
}

/// Status handler
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        demo_mode: state.config.verification.demo_mode,
        lecturer_login: state.auth.login_enabled(),
    })
}

/// Lecturer login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let access_token = state.auth.login(&req.password)?;
    info!("Lecturer logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.auth.token_lifetime_secs(),
        role: UserRole::Lecturer,
    }))
}

/// Revoke a token
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let jti = state
        .auth
        .extract_jti(&req.token)
        .map_err(|e| ApiError::BadRequest(format!("Invalid token: {:#}", e)))?;
    state.auth.revoke_token(&jti);
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Roster without reference images, optionally filtered
pub async fn list_students_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let students = state.db.search_students(query.search.as_deref().unwrap_or(""))?;
    Ok(Json(students.iter().map(Student::redacted).collect()))
}

pub async fn list_courses_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.db.get_courses()?))
}

/// Today's course nearest to the current time, `null` when none runs today
pub async fn suggested_course_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state.checkin.suggest_course(&state.now())?;
    Ok(Json(json!({ "course": course })))
}

/// Submit a capture
pub async fn checkin_handler(
    State(state): State<AppState>,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<CheckInOutcome>), ApiError> {
    let outcome = state.checkin.check_in(req, state.now()).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// A student's own records, newest first
pub async fn history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let student = state
        .db
        .get_student(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown student: {}", id)))?;
    let records = state.checkin.history(&id)?;
    Ok(Json(HistoryResponse {
        student: student.redacted(),
        sessions: analytics::sessions_attended(&records),
        records,
    }))
}

/// Validate a registration form and store the new student
pub fn enroll_student(db: &Database, form: NewStudent) -> Result<Student, ApiError> {
    let student_code = required("studentId", &form.student_id)?;
    if db
        .get_students()?
        .iter()
        .any(|s| s.student_id.eq_ignore_ascii_case(&student_code))
    {
        return Err(ApiError::Conflict(format!("Student {} is already enrolled", student_code)));
    }

    let student = Student {
        id: uuid::Uuid::new_v4().simple().to_string()[..9].to_string(),
        name: required("name", &form.name)?,
        student_id: student_code,
        profile_image: form.profile_image.filter(|img| !img.trim().is_empty()),
        email: required("email", &form.email)?,
    };
    db.save_student(student.clone())?;
    info!("Enrolled student {} ({})", student.name, student.student_id);
    Ok(student)
}

/// Enroll a new student
pub async fn register_student_handler(
    State(state): State<AppState>,
    Json(form): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let student = enroll_student(&state.db, form)?;
    Ok((StatusCode::CREATED, Json(student.redacted())))
}

/// Retake a student's reference photo
pub async fn update_photo_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<PhotoUpdate>,
) -> Result<Json<Student>, ApiError> {
    let mut student = state
        .db
        .get_student(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown student: {}", id)))?;
    student.profile_image = Some(required("profileImage", &update.profile_image)?);
    state.db.save_student(student.clone())?;
    Ok(Json(student.redacted()))
}

/// Remove a student and their records
pub async fn delete_student_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.db.delete_student(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Unknown student: {}", id)))
    }
}

/// Create a course owned by the authenticated lecturer
pub async fn create_course_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(form): Json<NewCourse>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let course = build_course(form, &claims.sub)?;
    state.db.save_course(course.clone())?;
    info!("Created course {} at {}", course.code, course.start_time);
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn delete_course_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.db.delete_course(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Unknown course: {}", id)))
    }
}

/// Attendance stream for one course, or every record
pub async fn attendance_handler(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    match query.course_id {
        Some(course_id) => {
            let stream: Vec<StreamEntry> = analytics::attendance_stream(&state.db, &course_id)?;
            Ok(Json(json!(stream)))
        }
        None => Ok(Json(json!(state.db.get_attendance()?))),
    }
}

pub async fn dashboard_handler(State(state): State<AppState>) -> Result<Json<Dashboard>, ApiError> {
    let board = analytics::dashboard(&state.db, &state.now(), state.config.schedule.risk_threshold)?;
    Ok(Json(board))
}

/// Close a session by recording everyone missing as absent
pub async fn absentees_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(req): Query<AbsenteeRequest>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let now = state.now();
    let date = req.date.unwrap_or_else(|| now.date_naive());
    let marked = analytics::mark_absentees(&state.db, &id, date, &now, &state.config.schedule.buffers())?;
    Ok(Json(marked))
}
