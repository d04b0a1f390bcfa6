use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::db::core::{PgTarget, PoolConfig};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, AppEnv::Production)
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub cookie: CookieConfig,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub secret: String,
    pub ttl: Duration,
    pub max_attempts: u32,
    pub resend_cooldown: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl: Duration::from_secs(300),
            max_attempts: 5,
            resend_cooldown: Duration::from_secs(60),
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: AppEnv,
    pub bind_address: String,
    pub database: PgTarget,
    pub pool: PoolConfig,
    pub auth: AuthConfig,
    pub otp: OtpConfig,
    pub cors_origin: Option<String>,
    pub sheets_access_token: Option<String>,
}

const DEV_JWT_SECRET: &str = "dev-jwt-secret-change-me";
const DEV_OTP_SECRET: &str = "dev-otp-secret-change-me";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = match get("APP_ENV").as_deref().map(str::to_lowercase).as_deref() {
            Some("production") | Some("prod") => AppEnv::Production,
            _ => AppEnv::Development,
        };

        let database = match get("DATABASE_URL") {
            Some(url) => PgTarget::Url(url),
            None => PgTarget::Discrete {
                host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(&get, "DB_PORT", 5432)?,
                database: get("DB_NAME").unwrap_or_else(|| "school".to_string()),
                user: get("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                password: get("DB_PASSWORD"),
                ssl: parse_bool(&get, "DB_SSL", false)?,
            },
        };

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            max: parse_or(&get, "DB_POOL_MAX", defaults.max)?,
            min: parse_or(&get, "DB_POOL_MIN", defaults.min)?,
            idle_timeout: millis_or(&get, "DB_IDLE_TIMEOUT_MS", defaults.idle_timeout)?,
            connection_timeout: millis_or(&get, "DB_CONNECTION_TIMEOUT_MS", defaults.connection_timeout)?,
            max_uses: parse_or(&get, "DB_MAX_USES", defaults.max_uses)?,
            statement_timeout: millis_or(&get, "DB_STATEMENT_TIMEOUT_MS", defaults.statement_timeout)?,
            query_timeout: millis_or(&get, "DB_QUERY_TIMEOUT_MS", defaults.query_timeout)?,
            max_retries: parse_or(&get, "DB_QUERY_RETRIES", defaults.max_retries)?,
            monitor_interval: Duration::from_secs(parse_or(
                &get,
                "DB_MONITOR_INTERVAL_SECS",
                defaults.monitor_interval.as_secs(),
            )?),
            ..defaults
        };
        if pool.max == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_POOL_MAX",
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        let jwt_secret = secret(&get, "JWT_SECRET", DEV_JWT_SECRET, env)?;
        let otp_secret = secret(&get, "OTP_SECRET", DEV_OTP_SECRET, env)?;

        let auth = AuthConfig {
            jwt_secret,
            jwt_expiry_hours: parse_or(&get, "JWT_EXPIRY_HOURS", 24)?,
            cookie: CookieConfig {
                name: get("COOKIE_NAME").unwrap_or_else(|| "auth_token".to_string()),
                domain: get("COOKIE_DOMAIN"),
                secure: parse_bool(&get, "COOKIE_SECURE", env.is_production())?,
                same_site: get("COOKIE_SAMESITE").unwrap_or_else(|| "Lax".to_string()),
            },
        };

        let otp = OtpConfig {
            secret: otp_secret,
            ttl: Duration::from_secs(parse_or(&get, "OTP_TTL_SECS", 300)?),
            ..OtpConfig::default()
        };

        Ok(Self {
            env,
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database,
            pool,
            auth,
            otp,
            cors_origin: get("CORS_ORIGIN"),
            sheets_access_token: get("GOOGLE_SHEETS_ACCESS_TOKEN"),
        })
    }
}

fn parse_or<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(Duration::from_millis(parse_or(get, var, default.as_millis() as u64)?))
}

fn parse_bool<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(value) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true/false".to_string(),
        }),
    }
}

fn secret<G>(get: &G, var: &'static str, dev_default: &str, env: AppEnv) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => Ok(value),
        None if env.is_production() => Err(ConfigError::Missing(var)),
        None => {
            tracing::warn!("{} not set; using an insecure development default", var);
            Ok(dev_default.to_string())
        }
    }
}
