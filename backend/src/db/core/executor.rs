use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{Connection, ConnectionManager, ConnectionPool, DbError, MetricsState, SqlParam};

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(1);

/// How many times a transient failure is retried, and how long to back off.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Delay after the failed attempt `attempt` (zero-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Rows produced by the connections of manager `M`.
pub type Rows<M> = Vec<<<M as ConnectionManager>::Connection as Connection>::Row>;

/// Run one statement on a pooled connection, retrying transient failures.
///
/// Application errors surface on the first attempt. Pool exhaustion and a closed
/// pool are not retried here either; that policy belongs to the caller.
pub(crate) async fn execute<M: ConnectionManager>(
    pool: &Arc<ConnectionPool<M>>,
    metrics: &MetricsState,
    sql: &str,
    params: &[SqlParam],
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<Rows<M>, DbError> {
    let mut last_error = DbError::Connection("query was never attempted".to_string());

    for attempt in 0..=policy.max_retries {
        let started = Instant::now();
        let result = match pool.acquire().await {
            Ok(mut pooled) => {
                let result = match pooled.connection() {
                    Ok(conn) => bounded(conn, sql, params, timeout).await,
                    Err(e) => Err(e),
                };
                // A connection that failed below the SQL layer may be unusable.
                let discard = matches!(&result, Err(e) if !e.is_non_retryable());
                pooled.release(discard);
                result
            }
            Err(e @ (DbError::PoolTimeout(_) | DbError::PoolClosed)) => return Err(e),
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed();
        metrics.record(result.is_ok(), elapsed);

        let err = match result {
            Ok(rows) => {
                if elapsed > SLOW_QUERY_THRESHOLD {
                    tracing::warn!(
                        duration_ms = elapsed.as_millis() as u64,
                        sql = %abbreviate(sql),
                        "Slow query"
                    );
                }
                return Ok(rows);
            }
            Err(e) => e.classify(),
        };

        metrics.record_error(err.to_string());
        if matches!(err, DbError::Application { .. } | DbError::Decode(_)) {
            tracing::warn!(error = %err, sql = %abbreviate(sql), "Query rejected; not retrying");
            return Err(err);
        }

        tracing::warn!(
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            error = %err,
            "Query attempt failed"
        );
        last_error = err;

        if attempt < policy.max_retries {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }

    tracing::error!(error = %last_error, sql = %abbreviate(sql), "Query failed after retries");
    Err(last_error)
}

/// Run one statement on a connection the caller already holds.
///
/// Used for statements inside a transaction: bounded by `timeout`, classified,
/// recorded in the metrics, never retried.
pub(crate) async fn client_query<C: Connection>(
    conn: &mut C,
    metrics: &MetricsState,
    sql: &str,
    params: &[SqlParam],
    timeout: Duration,
) -> Result<Vec<C::Row>, DbError> {
    let started = Instant::now();
    let result = bounded(conn, sql, params, timeout).await;
    metrics.record(result.is_ok(), started.elapsed());
    result.map_err(|e| {
        let e = e.classify();
        metrics.record_error(e.to_string());
        e
    })
}

/// Race a statement against `timeout`. A late response is dropped with the future.
pub(crate) async fn bounded<C: Connection>(
    conn: &mut C,
    sql: &str,
    params: &[SqlParam],
    timeout: Duration,
) -> Result<Vec<C::Row>, DbError> {
    match tokio::time::timeout(timeout, conn.execute(sql, params)).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Timeout(timeout)),
    }
}

fn abbreviate(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 120 {
        let head: String = flat.chars().take(117).collect();
        format!("{}...", head)
    } else {
        flat
    }
}
