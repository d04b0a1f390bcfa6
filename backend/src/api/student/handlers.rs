use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::helpers::AuthUser;
use crate::api::common::{ApiError, ApiResult, ErrorResponse};
use crate::db::grades::gpa;
use crate::db::{AttendanceSummary, HealthRecord, StudentGrade, StudentProfile, Subject};
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct MyGradesResponse {
    grades: Vec<StudentGrade>,
    /// Credit-weighted, absent when nothing is graded yet
    gpa: Option<f64>,
}

#[derive(Deserialize)]
pub struct AttendanceFilter {
    subject_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/student/profile",
    tag = "Student",
    responses(
        (status = 200, description = "Own profile", body = StudentProfile),
        (status = 404, description = "Profile not set up yet", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_profile(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<StudentProfile> {
    let profile = state
        .db
        .get_student_profile(&user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student profile"))?;
    Ok(Json(profile))
}

/// Subjects of the caller's room
#[utoipa::path(
    get,
    path = "/api/student/subjects",
    tag = "Student",
    responses((status = 200, description = "Subjects", body = Vec<Subject>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_subjects(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Vec<Subject>> {
    let profile = state.db.get_student_profile(&user.id).await?;
    match profile.and_then(|p| p.room_id) {
        Some(room_id) => Ok(Json(state.db.list_subjects(Some(room_id), None).await?)),
        None => Ok(Json(Vec::new())),
    }
}

#[utoipa::path(
    get,
    path = "/api/student/grades",
    tag = "Student",
    responses((status = 200, description = "Own grades with GPA", body = MyGradesResponse)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_grades(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<MyGradesResponse> {
    let grades = state.db.list_student_grades(&user.id).await?;
    Ok(Json(MyGradesResponse {
        gpa: gpa(&grades),
        grades,
    }))
}

#[utoipa::path(
    get,
    path = "/api/student/attendance",
    tag = "Student",
    params(("subject_id" = Option<Uuid>, Query, description = "Only this subject")),
    responses((status = 200, description = "Own attendance counts", body = AttendanceSummary)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_attendance(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<AttendanceFilter>,
) -> ApiResult<AttendanceSummary> {
    Ok(Json(
        state
            .db
            .student_attendance_summary(&user.id, filter.subject_id)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/student/health",
    tag = "Student",
    responses((status = 200, description = "Own health records", body = Vec<HealthRecord>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn my_health_records(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Vec<HealthRecord>> {
    Ok(Json(state.db.list_health_records(&user.id).await?))
}
