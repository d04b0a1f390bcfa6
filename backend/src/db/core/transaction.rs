use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

use super::executor::{bounded, client_query};
use super::{Connection, ConnectionManager, ConnectionPool, DbError, MetricsState, PooledConnection, SqlParam};

/// Bound on the `ROLLBACK` sent after the deadline passed. The connection may
/// still be draining the abandoned statement; it is discarded either way, which
/// aborts the transaction server-side.
const ABANDONED_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// A borrowed connection with an open `BEGIN`.
///
/// Statements run strictly in the order they are awaited.
pub struct Tx<M: ConnectionManager> {
    conn: PooledConnection<M>,
    metrics: Arc<MetricsState>,
    statement_timeout: Duration,
}

impl<M: ConnectionManager> Tx<M> {
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Vec<<M::Connection as Connection>::Row>, DbError> {
        let conn = self.conn.connection()?;
        client_query(conn, &self.metrics, sql, params, self.statement_timeout).await
    }

    async fn control(&mut self, sql: &str) -> Result<(), DbError> {
        let bound = self.statement_timeout;
        self.control_within(sql, bound).await
    }

    async fn control_within(&mut self, sql: &str, bound: Duration) -> Result<(), DbError> {
        let conn = self.conn.connection()?;
        bounded(conn, sql, &[], bound)
            .await
            .map(|_| ())
            .map_err(DbError::classify)
    }

    async fn rollback_within(&mut self, bound: Duration) {
        if let Err(e) = self.control_within("ROLLBACK", bound).await {
            tracing::error!(error = %e, "Rollback failed");
        }
    }
}

/// Run `body` inside `BEGIN` .. `COMMIT` on one dedicated connection.
///
/// The deadline is armed as soon as the connection is acquired. If it passes
/// before `body` finishes, the body is abandoned, `ROLLBACK` is forced and the
/// connection is discarded. That forced `ROLLBACK` gets at most
/// `ABANDONED_ROLLBACK_TIMEOUT`, so a timeout surfaces shortly after the deadline.
/// `COMMIT` runs after the body and is bounded by `statement_timeout`. A failing
/// body is rolled back and its error is returned unchanged. Whatever happens,
/// the connection is released exactly once.
pub(crate) async fn run<M, T, E, F>(
    pool: &Arc<ConnectionPool<M>>,
    metrics: &Arc<MetricsState>,
    statement_timeout: Duration,
    timeout: Duration,
    body: F,
) -> Result<T, E>
where
    M: ConnectionManager,
    T: Send,
    E: From<DbError> + std::fmt::Display + Send,
    F: for<'c> FnOnce(&'c mut Tx<M>) -> BoxFuture<'c, Result<T, E>> + Send,
{
    let conn = pool.acquire().await.map_err(E::from)?;
    let deadline = Instant::now() + timeout;
    let mut tx = Tx {
        conn,
        metrics: metrics.clone(),
        statement_timeout,
    };

    let outcome = tokio::time::timeout_at(deadline, async {
        tx.control("BEGIN").await.map_err(E::from)?;
        body(&mut tx).await
    })
    .await;

    match outcome {
        Ok(Ok(value)) => match tx.control("COMMIT").await {
            Ok(()) => {
                tx.conn.release(false);
                Ok(value)
            }
            Err(e) => {
                tracing::error!(error = %e, "Commit failed");
                tx.conn.release(true);
                Err(E::from(e))
            }
        },
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "Transaction failed; rolling back");
            tx.rollback_within(statement_timeout).await;
            tx.conn.release(true);
            Err(err)
        }
        Err(_) => {
            tracing::error!(
                timeout_ms = timeout.as_millis() as u64,
                "Transaction timed out; forcing rollback"
            );
            metrics.record_error(DbError::TransactionTimeout(timeout).to_string());
            tx.rollback_within(ABANDONED_ROLLBACK_TIMEOUT.min(statement_timeout)).await;
            tx.conn.release(true);
            Err(E::from(DbError::TransactionTimeout(timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::core::testing::{MockManager, Step};
    use crate::db::core::PoolSettings;

    const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);
    const TX_TIMEOUT: Duration = Duration::from_secs(30);

    fn setup(manager: &MockManager) -> (Arc<ConnectionPool<MockManager>>, Arc<MetricsState>) {
        let pool = Arc::new(ConnectionPool::new(
            manager.clone(),
            PoolSettings {
                max: 2,
                min: 0,
                ..PoolSettings::default()
            },
        ));
        (pool, Arc::new(MetricsState::new()))
    }

    #[derive(Debug)]
    enum TestError {
        Db(DbError),
        Body(&'static str),
    }

    impl From<DbError> for TestError {
        fn from(e: DbError) -> Self {
            TestError::Db(e)
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Db(e) => write!(f, "{}", e),
                TestError::Body(msg) => write!(f, "{}", msg),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn commits_once_and_releases_once() {
        let manager = MockManager::new();
        let (pool, metrics) = setup(&manager);

        let value = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO grades VALUES ($1)", &[]).await?;
                tx.execute("UPDATE students SET x = 1", &[]).await?;
                Ok::<_, TestError>(42)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            manager.statements(),
            vec!["BEGIN", "INSERT INTO grades VALUES ($1)", "UPDATE students SET x = 1", "COMMIT"]
        );
        assert_eq!(pool.stats().idle, 1);

        // The deadline must not fire after commit.
        tokio::time::advance(TX_TIMEOUT * 2).await;
        assert_eq!(manager.count("ROLLBACK"), 0);
        assert_eq!(manager.count("COMMIT"), 1);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_body_rolls_back_before_release() {
        let manager = MockManager::new();
        let (pool, metrics) = setup(&manager);

        let err = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO attendance VALUES ($1)", &[]).await?;
                Err::<(), _>(TestError::Body("validation failed"))
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Body("validation failed")));
        assert_eq!(
            manager.statements(),
            vec!["BEGIN", "INSERT INTO attendance VALUES ($1)", "ROLLBACK"]
        );
        // The successful statement's effects are not visible.
        assert!(manager.committed().is_empty());
        // Released once, as errored.
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn statement_errors_propagate_unchanged() {
        let manager = MockManager::new();
        manager.script([Step::fail(Some("23503"), "violates foreign key constraint")]);
        let (pool, metrics) = setup(&manager);

        let err = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO grades VALUES ($1)", &[]).await?;
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Db(DbError::Application { ref code, .. }) if code == "23503"));
        assert_eq!(manager.count("ROLLBACK"), 1);
        assert_eq!(metrics.snapshot().failed_queries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_failure_does_not_mask_the_body_error() {
        let manager = MockManager::new();
        manager.fail_control("ROLLBACK");
        let (pool, metrics) = setup(&manager);

        let err = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |_tx| {
            Box::pin(async move { Err::<(), _>(TestError::Body("boom")) })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Body("boom")));
        assert_eq!(manager.count("ROLLBACK"), 1);
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_forces_rollback_and_discards_late_result() {
        let manager = MockManager::new();
        manager.script([Step::ok(&["late"]).after(Duration::from_secs(45))]);
        let (pool, metrics) = setup(&manager);
        let started = Instant::now();

        let err = run(&pool, &metrics, Duration::from_secs(60), TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO home_visits VALUES ($1)", &[]).await?;
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Db(DbError::TransactionTimeout(d)) if d == TX_TIMEOUT));
        assert_eq!(started.elapsed(), TX_TIMEOUT);
        assert_eq!(
            manager.statements(),
            vec!["BEGIN", "INSERT INTO home_visits VALUES ($1)", "ROLLBACK"]
        );
        assert_eq!(pool.stats().total, 0);

        // Even once the abandoned statement would have finished, nothing lands.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(manager.committed().is_empty());
        assert_eq!(manager.count("COMMIT"), 0);
        assert_eq!(manager.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_after_timeout_does_not_wait_for_the_abandoned_statement() {
        let manager = MockManager::new();
        manager.script([Step::ok(&["late"]).after(Duration::from_secs(45))]);
        // The server only answers ROLLBACK once the abandoned statement finishes.
        manager.stall_control("ROLLBACK", Duration::from_secs(30));
        let (pool, metrics) = setup(&manager);
        let started = Instant::now();

        let err = run(&pool, &metrics, Duration::from_secs(60), TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO grades VALUES ($1)", &[]).await?;
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Db(DbError::TransactionTimeout(d)) if d == TX_TIMEOUT));
        assert_eq!(started.elapsed(), TX_TIMEOUT + ABANDONED_ROLLBACK_TIMEOUT);
        assert_eq!(manager.count("ROLLBACK"), 1);
        assert_eq!(pool.stats().total, 0);
        assert!(manager.committed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_begin_releases_connection() {
        let manager = MockManager::new();
        manager.fail_control("BEGIN");
        let (pool, metrics) = setup(&manager);

        let err = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |_tx| {
            Box::pin(async move { Ok::<_, TestError>(()) })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Db(DbError::Connection(_))));
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_is_reported() {
        let manager = MockManager::new();
        manager.fail_control("COMMIT");
        let (pool, metrics) = setup(&manager);

        let err = run(&pool, &metrics, STATEMENT_TIMEOUT, TX_TIMEOUT, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO rooms VALUES ($1)", &[]).await?;
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TestError::Db(DbError::Connection(_))));
        assert!(manager.committed().is_empty());
        assert_eq!(pool.stats().total, 0);
    }
}
