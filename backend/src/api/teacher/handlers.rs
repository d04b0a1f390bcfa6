use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::helpers::AuthUser;
use crate::api::common::{ApiError, ApiResult, ErrorResponse};
use crate::db::grades::gpa;
use crate::db::{
    AttendanceEntry, AttendanceRecord, AttendanceSummary, Grade, GradeEntry, HealthRecord,
    HealthRecordInput, HomeVisit, HomeVisitInput, RoomAttendanceRow, StudentGrade, StudentProfile,
    Subject,
};
use crate::sheets::{grade_export_rows, parse_grade_rows, SheetsClient, SkippedRow};
use crate::AppState;

#[derive(Deserialize, ToSchema)]
pub struct RecordAttendanceRequest {
    date: NaiveDate,
    entries: Vec<AttendanceEntry>,
}

#[derive(Deserialize)]
pub struct DateQuery {
    date: NaiveDate,
}

#[derive(Deserialize)]
pub struct DateRangeQuery {
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct UpsertGradesRequest {
    entries: Vec<GradeEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct CountResponse {
    count: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct SheetRangeRequest {
    spreadsheet_id: String,
    /// A1 notation, e.g. `Grades!A1:D60`
    range: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImportGradesResponse {
    imported: usize,
    unknown_students: Vec<String>,
    skipped_rows: Vec<SkippedRow>,
}

#[derive(Serialize, ToSchema)]
pub struct ExportGradesResponse {
    rows: usize,
    updated_cells: u64,
}

#[derive(Serialize, ToSchema)]
pub struct StudentReport {
    profile: StudentProfile,
    grades: Vec<StudentGrade>,
    gpa: Option<f64>,
    attendance: AttendanceSummary,
    latest_health_record: Option<HealthRecord>,
    home_visits: Vec<HomeVisit>,
}

/// Load a subject the caller may manage: its teacher, or any admin.
async fn managed_subject(state: &AppState, user: &AuthUser, subject_id: &Uuid) -> Result<Subject, ApiError> {
    let subject = state
        .db
        .get_subject(subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))?;
    if !user.is_admin() && subject.teacher_id != Some(user.id) {
        return Err(ApiError::forbidden("You do not teach this subject"));
    }
    Ok(subject)
}

async fn ensure_student_access(state: &AppState, user: &AuthUser, student_id: &Uuid) -> Result<(), ApiError> {
    if user.is_admin() {
        return Ok(());
    }
    if !state.db.teacher_can_access_student(&user.id, student_id).await? {
        return Err(ApiError::forbidden("You do not teach this student"));
    }
    Ok(())
}

fn sheets_client(state: &AppState) -> Result<&SheetsClient, ApiError> {
    state.sheets.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SHEETS_NOT_CONFIGURED",
            "Google Sheets access is not configured",
        )
    })
}

fn sheets_error(e: anyhow::Error) -> ApiError {
    tracing::error!("Google Sheets request failed: {:#}", e);
    ApiError::new(StatusCode::BAD_GATEWAY, "SHEETS_ERROR", "Google Sheets request failed")
}

/// Subjects taught by the caller (all subjects for admins)
#[utoipa::path(
    get,
    path = "/api/teacher/subjects",
    tag = "Teacher",
    responses((status = 200, description = "Subjects", body = Vec<Subject>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_subjects(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Vec<Subject>> {
    let subjects = if user.is_admin() {
        state.db.list_subjects(None, None).await?
    } else {
        state.db.list_teacher_subjects(&user.id).await?
    };
    Ok(Json(subjects))
}

/// Students enrolled in the subject's room
#[utoipa::path(
    get,
    path = "/api/teacher/subjects/{subject_id}/students",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    responses(
        (status = 200, description = "Roster", body = Vec<StudentProfile>),
        (status = 403, description = "Not the subject's teacher", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn subject_roster(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
) -> ApiResult<Vec<StudentProfile>> {
    let subject = managed_subject(&state, &user, &subject_id).await?;
    Ok(Json(state.db.list_room_students(&subject.room_id).await?))
}

/// Record one class session's attendance
#[utoipa::path(
    post,
    path = "/api/teacher/subjects/{subject_id}/attendance",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    request_body = RecordAttendanceRequest,
    responses(
        (status = 200, description = "Entries recorded", body = CountResponse),
        (status = 400, description = "Unknown student", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn record_attendance(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<RecordAttendanceRequest>,
) -> ApiResult<CountResponse> {
    managed_subject(&state, &user, &subject_id).await?;
    if body.entries.is_empty() {
        return Err(ApiError::bad_request("entries must not be empty"));
    }
    let count = state
        .db
        .record_attendance(&subject_id, body.date, &user.id, &body.entries)
        .await?;
    tracing::info!(subject_id = %subject_id, date = %body.date, count, "Attendance recorded");
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    get,
    path = "/api/teacher/subjects/{subject_id}/attendance",
    tag = "Teacher",
    params(
        ("subject_id" = Uuid, Path, description = "Subject ID"),
        ("date" = NaiveDate, Query, description = "Session date")
    ),
    responses((status = 200, description = "Attendance for the session", body = Vec<AttendanceRecord>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_attendance(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Vec<AttendanceRecord>> {
    managed_subject(&state, &user, &subject_id).await?;
    Ok(Json(state.db.list_attendance(&subject_id, query.date).await?))
}

/// Per-student attendance counts for a room over a date range
#[utoipa::path(
    get,
    path = "/api/teacher/rooms/{room_id}/attendance",
    tag = "Teacher",
    params(
        ("room_id" = Uuid, Path, description = "Room ID"),
        ("from" = NaiveDate, Query, description = "First day, inclusive"),
        ("to" = NaiveDate, Query, description = "Last day, inclusive")
    ),
    responses(
        (status = 200, description = "Attendance report", body = Vec<RoomAttendanceRow>),
        (status = 403, description = "Caller does not teach in this room", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn room_attendance_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(room_id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<RoomAttendanceRow>> {
    if range.from > range.to {
        return Err(ApiError::bad_request("from must not be after to"));
    }
    let room = state
        .db
        .get_room(&room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room"))?;
    if !user.is_admin() && room.homeroom_teacher_id != Some(user.id) {
        let teaches_here = !state.db.list_subjects(Some(room_id), Some(user.id)).await?.is_empty();
        if !teaches_here {
            return Err(ApiError::forbidden("You do not teach in this room"));
        }
    }
    Ok(Json(
        state
            .db
            .room_attendance_summary(&room_id, range.from, range.to)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/teacher/subjects/{subject_id}/grades",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    responses((status = 200, description = "Grades", body = Vec<Grade>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_grades(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
) -> ApiResult<Vec<Grade>> {
    managed_subject(&state, &user, &subject_id).await?;
    Ok(Json(state.db.list_subject_grades(&subject_id).await?))
}

/// Upsert scores for a subject; all entries commit together
#[utoipa::path(
    put,
    path = "/api/teacher/subjects/{subject_id}/grades",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    request_body = UpsertGradesRequest,
    responses(
        (status = 200, description = "Grades saved", body = CountResponse),
        (status = 400, description = "Score out of range or unknown student", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn upsert_grades(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<UpsertGradesRequest>,
) -> ApiResult<CountResponse> {
    managed_subject(&state, &user, &subject_id).await?;
    let count = state
        .db
        .upsert_grades(&subject_id, &user.id, &body.entries)
        .await?;
    Ok(Json(CountResponse { count }))
}

/// Import scores from a Google Sheet range
#[utoipa::path(
    post,
    path = "/api/teacher/subjects/{subject_id}/grades/import",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    request_body = SheetRangeRequest,
    responses(
        (status = 200, description = "Import result", body = ImportGradesResponse),
        (status = 502, description = "Google Sheets failed", body = ErrorResponse),
        (status = 503, description = "Sheets not configured", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn import_grades(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<SheetRangeRequest>,
) -> ApiResult<ImportGradesResponse> {
    managed_subject(&state, &user, &subject_id).await?;
    let client = sheets_client(&state)?;

    let rows = client
        .read_range(&body.spreadsheet_id, &body.range)
        .await
        .map_err(sheets_error)?;
    let (grades, skipped_rows) = parse_grade_rows(&rows);

    let outcome = state.db.import_grades(&subject_id, &user.id, grades).await?;
    tracing::info!(
        subject_id = %subject_id,
        imported = outcome.imported,
        unknown = outcome.unknown_students.len(),
        skipped = skipped_rows.len(),
        "Grades imported from sheet"
    );

    Ok(Json(ImportGradesResponse {
        imported: outcome.imported,
        unknown_students: outcome.unknown_students,
        skipped_rows,
    }))
}

/// Export a subject's grades to a Google Sheet range
#[utoipa::path(
    post,
    path = "/api/teacher/subjects/{subject_id}/grades/export",
    tag = "Teacher",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    request_body = SheetRangeRequest,
    responses(
        (status = 200, description = "Export result", body = ExportGradesResponse),
        (status = 502, description = "Google Sheets failed", body = ErrorResponse),
        (status = 503, description = "Sheets not configured", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn export_grades(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<SheetRangeRequest>,
) -> ApiResult<ExportGradesResponse> {
    managed_subject(&state, &user, &subject_id).await?;
    let client = sheets_client(&state)?;

    let grades = state.db.list_subject_grades(&subject_id).await?;
    let rows = grade_export_rows(&grades);
    let updated_cells = client
        .write_range(&body.spreadsheet_id, &body.range, &rows)
        .await
        .map_err(sheets_error)?;

    Ok(Json(ExportGradesResponse {
        rows: rows.len(),
        updated_cells,
    }))
}

#[utoipa::path(
    get,
    path = "/api/teacher/students/{student_id}/health",
    tag = "Teacher",
    params(("student_id" = Uuid, Path, description = "Student user ID")),
    responses((status = 200, description = "Health records", body = Vec<HealthRecord>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_health_records(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Vec<HealthRecord>> {
    ensure_student_access(&state, &user, &student_id).await?;
    Ok(Json(state.db.list_health_records(&student_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/teacher/students/{student_id}/health",
    tag = "Teacher",
    params(("student_id" = Uuid, Path, description = "Student user ID")),
    request_body = HealthRecordInput,
    responses(
        (status = 201, description = "Health record created", body = HealthRecord),
        (status = 400, description = "Invalid measurements", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn create_health_record(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(student_id): Path<Uuid>,
    Json(body): Json<HealthRecordInput>,
) -> Result<(StatusCode, Json<HealthRecord>), ApiError> {
    ensure_student_access(&state, &user, &student_id).await?;
    if body.weight_kg.is_some_and(|w| w <= 0.0) || body.height_cm.is_some_and(|h| h <= 0.0) {
        return Err(ApiError::bad_request("weight and height must be positive"));
    }
    let record = state
        .db
        .create_health_record(&student_id, &user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/api/teacher/students/{student_id}/visits",
    tag = "Teacher",
    params(("student_id" = Uuid, Path, description = "Student user ID")),
    responses((status = 200, description = "Home visits", body = Vec<HomeVisit>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_student_visits(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Vec<HomeVisit>> {
    ensure_student_access(&state, &user, &student_id).await?;
    Ok(Json(state.db.list_home_visits_by_student(&student_id).await?))
}

/// Home visits made by the caller
#[utoipa::path(
    get,
    path = "/api/teacher/visits",
    tag = "Teacher",
    responses((status = 200, description = "Home visits", body = Vec<HomeVisit>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_visits(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Vec<HomeVisit>> {
    Ok(Json(state.db.list_home_visits_by_teacher(&user.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/teacher/visits",
    tag = "Teacher",
    request_body = HomeVisitInput,
    responses(
        (status = 201, description = "Home visit recorded", body = HomeVisit),
        (status = 403, description = "Caller does not teach this student", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn create_visit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<HomeVisitInput>,
) -> Result<(StatusCode, Json<HomeVisit>), ApiError> {
    ensure_student_access(&state, &user, &body.student_id).await?;
    if body.summary.trim().is_empty() {
        return Err(ApiError::bad_request("summary is required"));
    }
    let visit = state.db.create_home_visit(&user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

/// Profile, grades, attendance and health in one view
#[utoipa::path(
    get,
    path = "/api/teacher/students/{student_id}/report",
    tag = "Teacher",
    params(("student_id" = Uuid, Path, description = "Student user ID")),
    responses(
        (status = 200, description = "Student report", body = StudentReport),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn student_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(student_id): Path<Uuid>,
) -> ApiResult<StudentReport> {
    ensure_student_access(&state, &user, &student_id).await?;
    let profile = state
        .db
        .get_student_profile(&student_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student"))?;

    let (grades, attendance, health, home_visits) = tokio::try_join!(
        state.db.list_student_grades(&student_id),
        state.db.student_attendance_summary(&student_id, None),
        state.db.list_health_records(&student_id),
        state.db.list_home_visits_by_student(&student_id),
    )?;

    Ok(Json(StudentReport {
        gpa: gpa(&grades),
        profile,
        grades,
        attendance,
        latest_health_record: health.into_iter().next(),
        home_visits,
    }))
}
