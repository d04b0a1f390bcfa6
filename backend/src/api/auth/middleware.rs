use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use super::helpers::{request_token, user_from_token, AuthUser};
use crate::api::common::ApiError;
use crate::db::Role;
use crate::AppState;

// Resolves the caller for every /api route and attaches `AuthUser`
pub async fn authenticate_middleware(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  cookie_jar: CookieJar,
  mut request: Request,
  next: Next,
) -> Result<Response, ApiError> {
  if should_skip_auth(request.uri().path()) {
    return Ok(next.run(request).await);
  }

  let auth = &state.config.auth;
  let token = request_token(&cookie_jar, &headers, &auth.cookie.name).ok_or_else(ApiError::unauthorized)?;
  let user = user_from_token(auth, &token).ok_or_else(ApiError::unauthorized)?;

  request.extensions_mut().insert(user);
  Ok(next.run(request).await)
}

fn should_skip_auth(path: &str) -> bool {
  matches!(
    path,
    "/health"
      | "/api/auth/otp"
      | "/api/auth/register"
      | "/api/auth/login"
      | "/api/auth/logout"
  )
}

fn ensure_role(request: &Request, allowed: &[Role]) -> Result<(), ApiError> {
  let user = request
    .extensions()
    .get::<AuthUser>()
    .ok_or_else(ApiError::unauthorized)?;

  if allowed.contains(&user.role) {
    Ok(())
  } else {
    tracing::warn!(
      user_id = %user.id,
      role = %user.role,
      path = %request.uri().path(),
      "Role not permitted"
    );
    Err(ApiError::forbidden("Insufficient permissions"))
  }
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
  ensure_role(&request, &[Role::Admin])?;
  Ok(next.run(request).await)
}

pub async fn require_teacher(request: Request, next: Next) -> Result<Response, ApiError> {
  ensure_role(&request, &[Role::Teacher, Role::Admin])?;
  Ok(next.run(request).await)
}

pub async fn require_student(request: Request, next: Next) -> Result<Response, ApiError> {
  ensure_role(&request, &[Role::Student])?;
  Ok(next.run(request).await)
}
