use std::time::Duration;

use thiserror::Error;

/// SQLSTATE classes that no amount of retrying can fix: data exceptions (22),
/// integrity constraint violations (23), syntax errors and access rule
/// violations (42). Everything else, including connection exceptions (08),
/// resource exhaustion (53) and operator intervention (57), is transient.
const NON_RETRYABLE_CLASSES: &[&str] = &["22", "23", "42"];

fn is_non_retryable_code(code: &str) -> bool {
    NON_RETRYABLE_CLASSES.iter().any(|class| code.starts_with(class))
}

pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Errors surfaced by the pooled access layer.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// Deterministic rejection caused by the statement or its data. Never retried.
    #[error("application error [{code}]: {message}")]
    Application { code: String, message: String },

    /// Network or server failure that survived every retry.
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement did not complete within its bound.
    #[error("query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// No pooled connection became available in time.
    #[error("timed out after {}ms waiting for a pooled connection", .0.as_millis())]
    PoolTimeout(Duration),

    #[error("transaction timed out after {}ms", .0.as_millis())]
    TransactionTimeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    /// Raw failure reported by a backend, not yet classified.
    #[error("database error{}: {message}", .code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Driver {
        code: Option<String>,
        message: String,
    },

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl DbError {
    pub fn driver(code: Option<&str>, message: impl Into<String>) -> Self {
        DbError::Driver {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// SQLSTATE attached to this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            DbError::Application { code, .. } => Some(code),
            DbError::Driver { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_non_retryable(&self) -> bool {
        match self {
            DbError::Application { .. } | DbError::Decode(_) => true,
            DbError::Driver { code: Some(code), .. } => is_non_retryable_code(code),
            _ => false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.code() == Some(FOREIGN_KEY_VIOLATION)
    }

    /// Map a raw driver failure onto the public taxonomy.
    ///
    /// Non-retryable SQLSTATEs become `Application`; any other driver failure is a
    /// `Connection` error. Already-classified errors pass through untouched.
    pub fn classify(self) -> Self {
        match self {
            DbError::Driver {
                code: Some(code),
                message,
            } if is_non_retryable_code(&code) => {
                DbError::Application { code, message }
            }
            DbError::Driver { message, .. } => DbError::Connection(message),
            other => other,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::Driver {
                code: db_err.code().map(|c| c.into_owned()),
                message: db_err.message().to_string(),
            },
            sqlx::Error::PoolTimedOut => DbError::PoolTimeout(Duration::ZERO),
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => DbError::Decode(err.to_string()),
            other => DbError::Driver {
                code: None,
                message: other.to_string(),
            },
        }
    }
}
