use axum::{
  async_trait,
  extract::FromRequestParts,
  http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::Duration as TimeDuration;
use uuid::Uuid;

use crate::api::common::ApiError;
use crate::config::{AuthConfig, CookieConfig};
use crate::db::Role;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
  pub sub: String, // user id
  pub role: Role,
  pub exp: i64,
}

/// Identity resolved from the access token, attached to each authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
  pub id: Uuid,
  pub role: Role,
}

impl AuthUser {
  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<AuthUser>()
      .copied()
      .ok_or_else(ApiError::unauthorized)
  }
}

fn get_jwt_algorithm() -> Algorithm {
  Algorithm::HS256
}

pub(crate) fn create_access_token(
  auth: &AuthConfig,
  user_id: &Uuid,
  role: Role,
) -> Result<String, ApiError> {
  let exp = (Utc::now() + ChronoDuration::hours(auth.jwt_expiry_hours)).timestamp();

  let claims = Claims {
    sub: user_id.to_string(),
    role,
    exp,
  };

  encode(
    &Header::new(get_jwt_algorithm()),
    &claims,
    &EncodingKey::from_secret(auth.jwt_secret.as_ref()),
  )
  .map_err(|e| {
    tracing::error!("Failed to encode access token: {}", e);
    ApiError::internal("Failed to create access token")
  })
}

pub(crate) fn decode_token(auth: &AuthConfig, token: &str) -> Option<Claims> {
  let mut validation = Validation::new(get_jwt_algorithm());
  validation.validate_exp = true;

  decode::<Claims>(
    token,
    &DecodingKey::from_secret(auth.jwt_secret.as_ref()),
    &validation,
  )
  .ok()
  .map(|data| data.claims)
}

/// Resolve an `AuthUser` from a raw token.
pub(crate) fn user_from_token(auth: &AuthConfig, token: &str) -> Option<AuthUser> {
  let claims = decode_token(auth, token)?;
  let id = Uuid::parse_str(&claims.sub).ok()?;
  Some(AuthUser {
    id,
    role: claims.role,
  })
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
  hash(password, DEFAULT_COST).map_err(|e| {
    tracing::error!("Failed to hash password: {}", e);
    ApiError::internal("Failed to hash password")
  })
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
  verify(password, hash).unwrap_or(false)
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
  if password.chars().count() < 8 {
    return Err(ApiError::bad_request("Password must be at least 8 characters"));
  }
  Ok(())
}

pub(crate) fn set_auth_cookie(
  jar: CookieJar,
  cookie_config: &CookieConfig,
  token: &str,
  max_age_hours: i64,
) -> CookieJar {
  let mut cookie = Cookie::new(cookie_config.name.clone(), token.to_string());
  cookie.set_path("/");
  cookie.set_http_only(true);
  cookie.set_max_age(Some(TimeDuration::hours(max_age_hours)));

  if let Some(domain) = &cookie_config.domain {
    cookie.set_domain(domain.clone());
  }

  if cookie_config.secure {
    cookie.set_secure(true);
  }

  let same_site = match cookie_config.same_site.to_lowercase().as_str() {
    "none" => SameSite::None,
    "strict" => SameSite::Strict,
    _ => SameSite::Lax,
  };
  cookie.set_same_site(same_site);

  jar.add(cookie)
}

pub(crate) fn delete_auth_cookie(jar: CookieJar, cookie_config: &CookieConfig) -> CookieJar {
  let mut cookie = Cookie::new(cookie_config.name.clone(), "");
  cookie.set_path("/");
  cookie.set_max_age(Some(TimeDuration::ZERO));

  if let Some(domain) = &cookie_config.domain {
    cookie.set_domain(domain.clone());
  }

  jar.add(cookie)
}

/// Token from the auth cookie, falling back to `Authorization: Bearer`.
pub(crate) fn request_token(jar: &CookieJar, headers: &HeaderMap, cookie_name: &str) -> Option<String> {
  jar
    .get(cookie_name)
    .map(|c| c.value().to_string())
    .filter(|v| !v.is_empty())
    .or_else(|| {
      headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|stripped| stripped.trim().to_string())
    })
}
