use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgRow, PgSslMode};
use sqlx::{ConnectOptions, Connection as _, Executor};

use super::{DbError, SqlParam};

/// A single live database session.
#[async_trait]
pub trait Connection: Send + 'static {
    type Row: Send + 'static;

    /// Run one parameterized statement and collect every returned row.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Self::Row>, DbError>;

    /// Close the session. Errors are swallowed; the connection is gone either way.
    async fn close(self);
}

/// Opens new connections for the pool.
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self) -> Result<Self::Connection, DbError>;
}

/// Where and how to reach Postgres.
#[derive(Debug, Clone)]
pub enum PgTarget {
    Url(String),
    Discrete {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: Option<String>,
        ssl: bool,
    },
}

/// Opens `sqlx::PgConnection`s with a per-session statement timeout.
#[derive(Debug, Clone)]
pub struct PgManager {
    options: PgConnectOptions,
    statement_timeout_ms: u64,
}

impl PgManager {
    pub fn new(target: &PgTarget, statement_timeout_ms: u64) -> Result<Self, DbError> {
        let options = match target {
            PgTarget::Url(url) => url
                .parse::<PgConnectOptions>()
                .map_err(|e| DbError::Connection(format!("invalid database url: {}", e)))?,
            PgTarget::Discrete {
                host,
                port,
                database,
                user,
                password,
                ssl,
            } => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .database(database)
                    .username(user)
                    .ssl_mode(if *ssl {
                        PgSslMode::Require
                    } else {
                        PgSslMode::Prefer
                    });
                if let Some(password) = password {
                    options = options.password(password);
                }
                options
            }
        };

        Ok(Self {
            // Statement logging is handled by the query layer.
            options: options.disable_statement_logging(),
            statement_timeout_ms,
        })
    }

    /// Open a session outside the pool, e.g. to run migrations.
    pub async fn connect_raw(&self) -> Result<sqlx::PgConnection, DbError> {
        Ok(sqlx::PgConnection::connect_with(&self.options).await?)
    }
}

#[async_trait]
impl ConnectionManager for PgManager {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<PgConnection, DbError> {
        let mut conn = sqlx::PgConnection::connect_with(&self.options).await?;
        if self.statement_timeout_ms > 0 {
            conn.execute(format!("SET statement_timeout = {}", self.statement_timeout_ms).as_str())
                .await?;
        }
        Ok(PgConnection { inner: conn })
    }
}

pub struct PgConnection {
    inner: sqlx::PgConnection,
}

#[async_trait]
impl Connection for PgConnection {
    type Row = PgRow;

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<PgRow>, DbError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = param.bind_to(query);
        }
        let rows = query.fetch_all(&mut self.inner).await?;
        Ok(rows)
    }

    async fn close(self) {
        if let Err(e) = self.inner.close().await {
            tracing::debug!(error = %e, "Error while closing database connection");
        }
    }
}
