use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::helpers::{hash_password, validate_password, AuthUser};
use crate::api::common::{ApiError, ApiResult, ErrorResponse};
use crate::db::core::PoolSnapshot;
use crate::db::{Role, Room, RoomInput, StudentProfile, StudentProfileInput, Subject, SubjectInput, User};
use crate::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: Role,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    role: Role,
}

#[derive(Deserialize)]
pub struct UserFilter {
    role: Option<Role>,
}

#[derive(Deserialize)]
pub struct SubjectFilter {
    room_id: Option<Uuid>,
    teacher_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignRoomRequest {
    room_id: Option<Uuid>,
}

fn require_name(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    Ok(())
}

async fn ensure_role(state: &AppState, user_id: &Uuid, role: Role, label: &str) -> Result<(), ApiError> {
    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if user.role != role {
        return Err(ApiError::bad_request(format!("User {} is not a {}", user_id, label)));
    }
    Ok(())
}

/// List users, optionally filtered by role
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "Admin",
    params(("role" = Option<Role>, Query, description = "Only users with this role")),
    responses(
        (status = 200, description = "Users", body = Vec<User>),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Vec<User>> {
    Ok(Json(state.db.list_users(filter.role).await?))
}

/// Create a user account with any role
#[utoipa::path(
    post,
    path = "/api/admin/users",
    tag = "Admin",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    require_name(&body.email, "email")?;
    require_name(&body.first_name, "first_name")?;
    require_name(&body.last_name, "last_name")?;
    validate_password(&body.password)?;

    let password_hash = hash_password(&body.password)?;
    let user = state
        .db
        .create_user(
            &body.email,
            Some(&password_hash),
            body.first_name.trim(),
            body.last_name.trim(),
            body.phone.as_deref(),
            body.role,
        )
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{user_id}",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    let user = state
        .db
        .get_user_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{user_id}/role",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateRoleRequest>,
) -> ApiResult<User> {
    if admin.id == user_id && body.role != Role::Admin {
        return Err(ApiError::bad_request("Admins cannot demote themselves"));
    }
    let user = state
        .db
        .update_user_role(&user_id, body.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{user_id}",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.id == user_id {
        return Err(ApiError::bad_request("Admins cannot delete themselves"));
    }
    if !state.db.delete_user(&user_id).await? {
        return Err(ApiError::not_found("User"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/rooms",
    tag = "Admin",
    responses((status = 200, description = "Rooms", body = Vec<Room>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Room>> {
    Ok(Json(state.db.list_rooms().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/rooms",
    tag = "Admin",
    request_body = RoomInput,
    responses(
        (status = 201, description = "Room created", body = Room),
        (status = 400, description = "Unknown homeroom teacher", body = ErrorResponse),
        (status = 409, description = "Room already exists for that year", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RoomInput>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    require_name(&body.name, "name")?;
    require_name(&body.academic_year, "academic_year")?;
    if let Some(teacher_id) = &body.homeroom_teacher_id {
        ensure_role(&state, teacher_id, Role::Teacher, "teacher").await?;
    }
    let room = state.db.create_room(&body).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[utoipa::path(
    get,
    path = "/api/admin/rooms/{room_id}",
    tag = "Admin",
    params(("room_id" = Uuid, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room", body = Room),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Room> {
    let room = state
        .db
        .get_room(&room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room"))?;
    Ok(Json(room))
}

#[utoipa::path(
    put,
    path = "/api/admin/rooms/{room_id}",
    tag = "Admin",
    params(("room_id" = Uuid, Path, description = "Room ID")),
    request_body = RoomInput,
    responses(
        (status = 200, description = "Updated room", body = Room),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
    Json(body): Json<RoomInput>,
) -> ApiResult<Room> {
    require_name(&body.name, "name")?;
    if let Some(teacher_id) = &body.homeroom_teacher_id {
        ensure_role(&state, teacher_id, Role::Teacher, "teacher").await?;
    }
    let room = state
        .db
        .update_room(&room_id, &body)
        .await?
        .ok_or_else(|| ApiError::not_found("Room"))?;
    Ok(Json(room))
}

#[utoipa::path(
    delete,
    path = "/api/admin/rooms/{room_id}",
    tag = "Admin",
    params(("room_id" = Uuid, Path, description = "Room ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_room(&room_id).await? {
        return Err(ApiError::not_found("Room"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/rooms/{room_id}/students",
    tag = "Admin",
    params(("room_id" = Uuid, Path, description = "Room ID")),
    responses((status = 200, description = "Students in the room", body = Vec<StudentProfile>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_room_students(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Vec<StudentProfile>> {
    Ok(Json(state.db.list_room_students(&room_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/subjects",
    tag = "Admin",
    params(
        ("room_id" = Option<Uuid>, Query, description = "Only subjects of this room"),
        ("teacher_id" = Option<Uuid>, Query, description = "Only subjects of this teacher")
    ),
    responses((status = 200, description = "Subjects", body = Vec<Subject>)),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SubjectFilter>,
) -> ApiResult<Vec<Subject>> {
    Ok(Json(state.db.list_subjects(filter.room_id, filter.teacher_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/subjects",
    tag = "Admin",
    request_body = SubjectInput,
    responses(
        (status = 201, description = "Subject created", body = Subject),
        (status = 400, description = "Unknown room or teacher", body = ErrorResponse),
        (status = 409, description = "Subject code already used in that room and semester", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn create_subject(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubjectInput>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    require_name(&body.code, "code")?;
    require_name(&body.name, "name")?;
    if body.credits.is_some_and(|c| c < 0.0) {
        return Err(ApiError::bad_request("credits must not be negative"));
    }
    if let Some(teacher_id) = &body.teacher_id {
        ensure_role(&state, teacher_id, Role::Teacher, "teacher").await?;
    }
    let subject = state.db.create_subject(&body).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

#[utoipa::path(
    put,
    path = "/api/admin/subjects/{subject_id}",
    tag = "Admin",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    request_body = SubjectInput,
    responses(
        (status = 200, description = "Updated subject", body = Subject),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn update_subject(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<SubjectInput>,
) -> ApiResult<Subject> {
    require_name(&body.code, "code")?;
    require_name(&body.name, "name")?;
    if let Some(teacher_id) = &body.teacher_id {
        ensure_role(&state, teacher_id, Role::Teacher, "teacher").await?;
    }
    let subject = state
        .db
        .update_subject(&subject_id, &body)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))?;
    Ok(Json(subject))
}

#[utoipa::path(
    delete,
    path = "/api/admin/subjects/{subject_id}",
    tag = "Admin",
    params(("subject_id" = Uuid, Path, description = "Subject ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn delete_subject(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_subject(&subject_id).await? {
        return Err(ApiError::not_found("Subject"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/students/{user_id}",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Student user ID")),
    responses(
        (status = 200, description = "Student profile", body = StudentProfile),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StudentProfile> {
    let profile = state
        .db
        .get_student_profile(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student"))?;
    Ok(Json(profile))
}

/// Create or replace a student's profile
#[utoipa::path(
    put,
    path = "/api/admin/students/{user_id}",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Student user ID")),
    request_body = StudentProfileInput,
    responses(
        (status = 200, description = "Student profile", body = StudentProfile),
        (status = 400, description = "User is not a student", body = ErrorResponse),
        (status = 409, description = "Student code already in use", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn upsert_student(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<StudentProfileInput>,
) -> ApiResult<StudentProfile> {
    require_name(&body.student_code, "student_code")?;
    ensure_role(&state, &user_id, Role::Student, "student").await?;
    Ok(Json(state.db.upsert_student_profile(&user_id, &body).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/students/{user_id}/room",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Student user ID")),
    request_body = AssignRoomRequest,
    responses(
        (status = 204, description = "Room assigned"),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn assign_room(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AssignRoomRequest>,
) -> Result<StatusCode, ApiError> {
    if !state.db.assign_student_room(&user_id, body.room_id).await? {
        return Err(ApiError::not_found("Student"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Current pool counters and query metrics
#[utoipa::path(
    get,
    path = "/api/admin/pool",
    tag = "Admin",
    responses((status = 200, description = "Pool snapshot")),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn pool_stats(State(state): State<Arc<AppState>>) -> Json<PoolSnapshot> {
    Json(state.db.core().pool_snapshot())
}
