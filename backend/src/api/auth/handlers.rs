use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::helpers::{
  create_access_token, delete_auth_cookie, hash_password, set_auth_cookie, validate_password,
  verify_password, AuthUser,
};
use super::otp::{OtpError, VerifyOutcome};
use crate::api::common::{ApiError, ApiResult, ErrorResponse};
use crate::db::{Role, User};
use crate::AppState;

// Request/Response types
#[derive(Deserialize, ToSchema)]
pub struct OtpRequest {
  email: String,
}

#[derive(Serialize, ToSchema)]
pub struct OtpResponse {
  message: String,
  expires_in_secs: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
  email: String,
  code: String,
  password: String,
  first_name: String,
  last_name: String,
  phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
  email: String,
  password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
  message: String,
  token: String,
  user: User,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
  message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
  first_name: Option<String>,
  last_name: Option<String>,
  phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
  current_password: String,
  new_password: String,
}

fn valid_email(email: &str) -> bool {
  let email = email.trim();
  match email.split_once('@') {
    Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
    None => false,
  }
}

/// Send a registration code to an email address
#[utoipa::path(
  post,
  path = "/api/auth/otp",
  tag = "Auth",
  request_body = OtpRequest,
  responses(
    (status = 200, description = "Code sent", body = OtpResponse),
    (status = 400, description = "Invalid email", body = ErrorResponse),
    (status = 409, description = "Email already registered", body = ErrorResponse),
    (status = 429, description = "Code requested too recently", body = ErrorResponse)
  )
)]
pub async fn request_otp(
  State(state): State<Arc<AppState>>,
  Json(body): Json<OtpRequest>,
) -> ApiResult<OtpResponse> {
  if !valid_email(&body.email) {
    return Err(ApiError::bad_request("Invalid email address"));
  }

  if state.db.get_user_by_email(&body.email).await?.is_some() {
    return Err(ApiError::conflict("Email already registered"));
  }

  let code = state.otp.issue(&body.email).map_err(|e| match e {
    OtpError::Cooldown(secs) => ApiError::new(
      StatusCode::TOO_MANY_REQUESTS,
      "OTP_COOLDOWN",
      format!("Please wait {} seconds before requesting another code", secs),
    ),
    OtpError::Crypto(e) => {
      tracing::error!("Failed to issue OTP: {}", e);
      ApiError::internal("Failed to issue code")
    }
  })?;

  state
    .otp_sender
    .send(body.email.trim(), &code)
    .await
    .map_err(|e| {
      tracing::error!("Failed to deliver OTP to {}: {}", body.email, e);
      ApiError::internal("Failed to deliver code")
    })?;

  Ok(Json(OtpResponse {
    message: "Verification code sent".to_string(),
    expires_in_secs: state.otp.ttl().as_secs(),
  }))
}

/// Complete student registration with a verification code
#[utoipa::path(
  post,
  path = "/api/auth/register",
  tag = "Auth",
  request_body = RegisterRequest,
  responses(
    (status = 200, description = "Student account created", body = AuthResponse),
    (status = 400, description = "Invalid or expired code", body = ErrorResponse),
    (status = 409, description = "Email already registered", body = ErrorResponse),
    (status = 429, description = "Too many attempts", body = ErrorResponse)
  )
)]
pub async fn register(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
  validate_password(&body.password)?;
  if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
    return Err(ApiError::bad_request("First and last name are required"));
  }

  match state.otp.verify(&body.email, &body.code) {
    VerifyOutcome::Verified => {}
    VerifyOutcome::Invalid => {
      return Err(ApiError::new(StatusCode::BAD_REQUEST, "INVALID_OTP", "Invalid verification code"))
    }
    VerifyOutcome::Expired => {
      return Err(ApiError::new(StatusCode::BAD_REQUEST, "OTP_EXPIRED", "Verification code expired"))
    }
    VerifyOutcome::NotFound => {
      return Err(ApiError::new(
        StatusCode::BAD_REQUEST,
        "OTP_NOT_FOUND",
        "No verification code was requested for this email",
      ))
    }
    VerifyOutcome::TooManyAttempts => {
      return Err(ApiError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "OTP_TOO_MANY_ATTEMPTS",
        "Too many attempts; request a new code",
      ))
    }
  }

  let password_hash = hash_password(&body.password)?;
  let user = state
    .db
    .create_user(
      &body.email,
      Some(&password_hash),
      body.first_name.trim(),
      body.last_name.trim(),
      body.phone.as_deref(),
      Role::Student,
    )
    .await
    .map_err(|e| {
      if e.is_unique_violation() {
        ApiError::conflict("Email already registered")
      } else {
        ApiError::from(e)
      }
    })?;

  tracing::info!(user_id = %user.id, "Student registered");

  let auth = &state.config.auth;
  let token = create_access_token(auth, &user.id, user.role)?;
  let jar = set_auth_cookie(jar, &auth.cookie, &token, auth.jwt_expiry_hours);

  Ok((
    jar,
    Json(AuthResponse {
      message: "Registered".to_string(),
      token,
      user,
    }),
  ))
}

/// Sign in with email and password
#[utoipa::path(
  post,
  path = "/api/auth/login",
  tag = "Auth",
  request_body = LoginRequest,
  responses(
    (status = 200, description = "Signed in", body = AuthResponse),
    (status = 401, description = "Invalid credentials", body = ErrorResponse)
  )
)]
pub async fn login(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
  let invalid = || ApiError::new(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Invalid email or password");

  let user = state.db.get_user_by_email(&body.email).await?.ok_or_else(invalid)?;

  let password_hash = user.password_hash.as_ref().ok_or_else(invalid)?;
  if !verify_password(&body.password, password_hash) {
    return Err(invalid());
  }

  let auth = &state.config.auth;
  let token = create_access_token(auth, &user.id, user.role)?;
  let jar = set_auth_cookie(jar, &auth.cookie, &token, auth.jwt_expiry_hours);

  Ok((
    jar,
    Json(AuthResponse {
      message: "Signed in".to_string(),
      token,
      user,
    }),
  ))
}

/// Clear the auth cookie
#[utoipa::path(
  post,
  path = "/api/auth/logout",
  tag = "Auth",
  responses((status = 200, description = "Signed out", body = MessageResponse))
)]
pub async fn logout(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
  let jar = delete_auth_cookie(jar, &state.config.auth.cookie);
  (
    jar,
    Json(MessageResponse {
      message: "Signed out".to_string(),
    }),
  )
}

/// Current user
#[utoipa::path(
  get,
  path = "/api/auth/me",
  tag = "Auth",
  responses(
    (status = 200, description = "Current user", body = User),
    (status = 401, description = "Not authenticated", body = ErrorResponse)
  ),
  security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn me(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> ApiResult<User> {
  let user = state
    .db
    .get_user_by_id(&auth_user.id)
    .await?
    .ok_or_else(ApiError::unauthorized)?;
  Ok(Json(user))
}

/// Update the current user's name or phone
#[utoipa::path(
  put,
  path = "/api/auth/me",
  tag = "Auth",
  request_body = UpdateProfileRequest,
  responses(
    (status = 200, description = "Updated user", body = User),
    (status = 401, description = "Not authenticated", body = ErrorResponse)
  ),
  security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn update_me(
  State(state): State<Arc<AppState>>,
  auth_user: AuthUser,
  Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
  let user = state
    .db
    .update_user_profile(
      &auth_user.id,
      req.first_name.as_deref().map(str::trim),
      req.last_name.as_deref().map(str::trim),
      req.phone.as_deref(),
    )
    .await?
    .ok_or_else(ApiError::unauthorized)?;
  Ok(Json(user))
}

/// Change the current user's password
#[utoipa::path(
  put,
  path = "/api/auth/password",
  tag = "Auth",
  request_body = ChangePasswordRequest,
  responses(
    (status = 200, description = "Password changed", body = MessageResponse),
    (status = 400, description = "Invalid new password", body = ErrorResponse),
    (status = 401, description = "Current password is wrong", body = ErrorResponse)
  ),
  security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn change_password(
  State(state): State<Arc<AppState>>,
  auth_user: AuthUser,
  Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<MessageResponse> {
  validate_password(&req.new_password)?;

  let user = state
    .db
    .get_user_by_id(&auth_user.id)
    .await?
    .ok_or_else(ApiError::unauthorized)?;

  let current_ok = user
    .password_hash
    .as_deref()
    .map(|hash| verify_password(&req.current_password, hash))
    .unwrap_or(false);
  if !current_ok {
    return Err(ApiError::new(
      StatusCode::UNAUTHORIZED,
      "INVALID_CREDENTIALS",
      "Current password is incorrect",
    ));
  }

  let password_hash = hash_password(&req.new_password)?;
  state.db.update_user_password(&user.id, &password_hash).await?;

  Ok(Json(MessageResponse {
    message: "Password changed".to_string(),
  }))
}
