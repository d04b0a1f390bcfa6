//! Pooled database access layer.
//!
//! Every statement goes through [`DatabaseCore`]: single statements with a bounded
//! timeout and classified retry, multi-statement units inside
//! `BEGIN`/`COMMIT`/`ROLLBACK` on one dedicated connection. Query metrics, the
//! periodic pool monitor and the health check are derived from the same state.

mod connection;
mod error;
mod executor;
mod health;
mod metrics;
mod param;
mod pool;
mod shutdown;
#[cfg(test)]
pub(crate) mod testing;
mod transaction;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

pub use connection::{Connection, ConnectionManager, PgConnection, PgManager, PgTarget};
pub use error::{DbError, FOREIGN_KEY_VIOLATION, UNIQUE_VIOLATION};
pub use executor::{RetryPolicy, Rows};
pub use health::{HealthReport, HealthStatus, PoolSnapshot};
pub use metrics::{evaluate, MetricsSnapshot, MetricsState, MonitorAlert, MonitorThresholds};
pub use param::SqlParam;
pub use pool::{ConnectionPool, EventHook, PoolEvent, PoolSettings, PoolStats, PooledConnection, RemoveReason};
pub use shutdown::ShutdownCoordinator;
pub use transaction::Tx;

/// Tunables for the access layer. Defaults match a 20-connection production pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max: usize,
    pub min: usize,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
    pub max_uses: u32,
    /// Applied server-side on every new connection.
    pub statement_timeout: Duration,
    /// Client-side bound on each query attempt.
    pub query_timeout: Duration,
    pub transaction_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub monitor_interval: Duration,
    /// How long `shutdown` waits for borrowed connections to come back.
    pub close_timeout: Duration,
    pub thresholds: MonitorThresholds,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let settings = PoolSettings::default();
        let retry = RetryPolicy::default();
        Self {
            max: settings.max,
            min: settings.min,
            idle_timeout: settings.idle_timeout,
            connection_timeout: settings.connection_timeout,
            max_uses: settings.max_uses,
            statement_timeout: Duration::from_millis(30_000),
            query_timeout: Duration::from_millis(30_000),
            transaction_timeout: Duration::from_millis(30_000),
            max_retries: retry.max_retries,
            retry_base_delay: retry.base_delay,
            monitor_interval: Duration::from_secs(60),
            close_timeout: Duration::from_secs(10),
            thresholds: MonitorThresholds::default(),
        }
    }
}

impl PoolConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max: self.max,
            min: self.min.min(self.max),
            idle_timeout: self.idle_timeout,
            connection_timeout: self.connection_timeout,
            max_uses: self.max_uses,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }
}

/// Pool, metrics and background tasks of one database.
pub struct DatabaseCore<M: ConnectionManager> {
    pool: Arc<ConnectionPool<M>>,
    metrics: Arc<MetricsState>,
    config: PoolConfig,
    shutdown: ShutdownCoordinator,
}

impl<M: ConnectionManager> DatabaseCore<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let metrics = Arc::new(MetricsState::new());
        let hook_metrics = metrics.clone();
        let hook: EventHook = Arc::new(move |event: &PoolEvent| {
            if let PoolEvent::Error { message } = event {
                hook_metrics.record_error(message.clone());
            }
        });
        let pool = ConnectionPool::new(manager, config.pool_settings()).with_event_hook(hook);

        Self {
            pool: Arc::new(pool),
            metrics,
            config,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<M>> {
        &self.pool
    }

    pub fn metrics(&self) -> &MetricsState {
        &self.metrics
    }

    /// Pre-open `min` connections. Failures are logged, not fatal.
    pub async fn warm_up(&self) -> usize {
        let opened = self.pool.warm_up().await;
        tracing::info!(opened, min = self.config.min, "Connection pool warmed up");
        opened
    }

    /// Run one statement with the configured retry budget.
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Rows<M>, DbError> {
        self.query_with_retries(sql, params, self.config.max_retries).await
    }

    pub async fn query_with_retries(
        &self,
        sql: &str,
        params: &[SqlParam],
        retries: u32,
    ) -> Result<Rows<M>, DbError> {
        executor::execute(
            &self.pool,
            &self.metrics,
            sql,
            params,
            self.config.query_timeout,
            self.config.retry_policy().with_retries(retries),
        )
        .await
    }

    /// Borrow a connection for manual use with [`DatabaseCore::client_query`].
    /// The caller must `release` it.
    pub async fn acquire(&self) -> Result<PooledConnection<M>, DbError> {
        self.pool.acquire().await
    }

    /// Run one statement on a connection the caller already holds. Never retried.
    pub async fn client_query(
        &self,
        conn: &mut PooledConnection<M>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Rows<M>, DbError> {
        let conn = conn.connection()?;
        executor::client_query(conn, &self.metrics, sql, params, self.config.query_timeout).await
    }

    pub async fn transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + std::fmt::Display + Send,
        F: for<'c> FnOnce(&'c mut Tx<M>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        self.transaction_with_timeout(self.config.transaction_timeout, body)
            .await
    }

    pub async fn transaction_with_timeout<T, E, F>(&self, timeout: Duration, body: F) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + std::fmt::Display + Send,
        F: for<'c> FnOnce(&'c mut Tx<M>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        transaction::run(&self.pool, &self.metrics, self.config.query_timeout, timeout, body).await
    }

    pub async fn health_check(&self) -> HealthReport {
        health::check(
            &self.pool,
            &self.metrics,
            self.config.query_timeout,
            self.config.retry_policy(),
        )
        .await
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool: self.pool.stats(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Log a snapshot and any threshold alerts every `monitor_interval`.
    pub fn spawn_monitor(&self) {
        let pool = self.pool.clone();
        let metrics = self.metrics.clone();
        let thresholds = self.config.thresholds;
        let token = self.shutdown.token();
        let period = self.config.monitor_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor_tick(&pool.stats(), &metrics.snapshot(), &thresholds);
                    }
                }
            }
            tracing::debug!("Pool monitor stopped");
        });
        self.shutdown.track(handle);
    }

    /// Periodically retire idle connections past `idle_timeout`, keeping `min`.
    pub fn spawn_reaper(&self) {
        let pool = self.pool.clone();
        let token = self.shutdown.token();
        let period = (self.config.idle_timeout / 2).max(Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = pool.reap_idle();
                        if reaped > 0 {
                            tracing::debug!(reaped, "Reaped idle connections");
                        }
                    }
                }
            }
        });
        self.shutdown.track(handle);
    }

    /// Coordinator shared with application tasks that must stop before the pool closes.
    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn background_tasks(&self) -> usize {
        self.shutdown.active_tasks()
    }

    /// Stop background tasks, then close the pool. Safe to call repeatedly.
    pub async fn shutdown(&self) -> bool {
        self.shutdown
            .shutdown(&self.pool, self.config.close_timeout)
            .await
    }
}

fn monitor_tick(stats: &PoolStats, snapshot: &MetricsSnapshot, thresholds: &MonitorThresholds) -> Vec<MonitorAlert> {
    tracing::info!(
        total = stats.total,
        idle = stats.idle,
        waiting = stats.waiting,
        total_queries = snapshot.total_queries,
        failed_queries = snapshot.failed_queries,
        success_rate = %format!("{:.2}", snapshot.success_rate),
        avg_query_time_ms = %format!("{:.2}", snapshot.avg_query_time_ms),
        "Database pool status"
    );
    let alerts = evaluate(stats, snapshot, thresholds);
    for alert in &alerts {
        metrics::log_alert(alert);
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::{MockManager, Step};

    fn core(manager: &MockManager, max: usize) -> DatabaseCore<MockManager> {
        DatabaseCore::new(
            manager.clone(),
            PoolConfig {
                max,
                min: 1,
                ..PoolConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unique_violation_is_attempted_once() {
        let manager = MockManager::new();
        manager.script([
            Step::fail(Some("23505"), "duplicate key value violates unique constraint"),
            Step::fail(Some("23505"), "duplicate key value violates unique constraint"),
            Step::fail(Some("23505"), "duplicate key value violates unique constraint"),
        ]);
        let db = core(&manager, 2);

        let err = db
            .query_with_retries("INSERT INTO users (email) VALUES ($1)", &crate::params!["a@b.c"], 2)
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
        assert_eq!(manager.statements().len(), 1);
        assert_eq!(db.metrics().snapshot().failed_queries, 1);
    }

    #[tokio::test]
    async fn third_caller_waits_for_a_free_connection() {
        let manager = MockManager::new();
        manager.script((0..3).map(|_| Step::ok(&["row"]).after(Duration::from_millis(30))));
        let db = Arc::new(core(&manager, 2));

        let calls = (0..3).map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.query("SELECT 1", &[]).await })
        });
        for call in futures::future::join_all(calls).await {
            assert_eq!(call.unwrap().unwrap(), vec!["row".to_string()]);
        }

        assert!(manager.peak_live() <= 2);
        assert_eq!(db.pool_snapshot().pool.total, 2);
    }

    #[tokio::test]
    async fn client_query_runs_on_the_borrowed_connection() {
        let manager = MockManager::new();
        let db = core(&manager, 2);

        let mut conn = db.acquire().await.unwrap();
        db.client_query(&mut conn, "SELECT 1", &[]).await.unwrap();
        db.client_query(&mut conn, "SELECT 2", &[]).await.unwrap();
        conn.release(false);

        assert_eq!(manager.connects(), 1);
        assert_eq!(db.metrics().snapshot().total_queries, 2);
    }

    #[tokio::test]
    async fn transaction_commits_through_the_core() {
        let manager = MockManager::new();
        let db = core(&manager, 2);

        let inserted = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.execute("INSERT INTO rooms (name) VALUES ($1)", &crate::params!["M.1/1"]).await?;
                    Ok::<_, DbError>(1)
                })
            })
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(manager.committed(), vec!["INSERT INTO rooms (name) VALUES ($1)"]);
    }

    #[tokio::test]
    async fn connect_errors_reach_the_metrics() {
        let manager = MockManager::new();
        manager.fail_connects(1);
        let db = core(&manager, 2);

        assert_eq!(db.warm_up().await, 0);
        let snapshot = db.metrics().snapshot();
        assert_eq!(snapshot.last_error.as_deref(), Some("connection error: connection refused"));
    }

    #[tokio::test]
    async fn health_check_reports_pool_and_metrics() {
        let manager = MockManager::new();
        let db = core(&manager, 2);

        let report = db.health_check().await;
        assert!(report.is_healthy());
        assert_eq!(report.pool.max, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_and_reaper_stop_on_shutdown() {
        let manager = MockManager::new();
        let db = core(&manager, 2);
        db.spawn_monitor();
        db.spawn_reaper();
        assert_eq!(db.background_tasks(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(db.shutdown().await);
        assert!(!db.shutdown().await);
        assert_eq!(db.background_tasks(), 0);
        assert!(matches!(db.query("SELECT 1", &[]).await, Err(DbError::PoolClosed)));

        let report = db.health_check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn monitor_tick_raises_alerts() {
        let stats = PoolStats {
            total: 20,
            idle: 0,
            waiting: 8,
            max: 20,
        };
        let snapshot = MetricsState::new().snapshot();
        let alerts = monitor_tick(&stats, &snapshot, &MonitorThresholds::default());
        assert_eq!(
            alerts,
            vec![
                MonitorAlert::HighLoad { waiting: 8 },
                MonitorAlert::PoolExhausted { total: 20, max: 20 },
            ]
        );
    }

    #[test]
    fn min_never_exceeds_max() {
        let config = PoolConfig {
            max: 1,
            min: 4,
            ..PoolConfig::default()
        };
        assert_eq!(config.pool_settings().min, 1);
    }
}
