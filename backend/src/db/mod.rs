pub mod attendance;
pub mod common;
pub mod core;
pub mod grades;
pub mod health_records;
pub mod home_visits;
pub mod models;
pub mod rooms;
pub mod students;
pub mod subjects;
pub mod users;

pub use models::*;

use std::sync::Arc;

use self::core::{DatabaseCore, DbError, HealthReport, PgManager, PgTarget, PoolConfig, Tx};

/// Transaction handle over a Postgres connection.
pub type PgTx = Tx<PgManager>;

#[derive(Clone)]
pub struct Database {
    core: Arc<DatabaseCore<PgManager>>,
}

impl Database {
    pub fn new(core: DatabaseCore<PgManager>) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// Build the pool lazily; no connection is opened until `warm_up` or the
    /// first query.
    pub fn connect(target: &PgTarget, config: PoolConfig) -> Result<Self, DbError> {
        let manager = PgManager::new(target, config.statement_timeout.as_millis() as u64)?;
        Ok(Self::new(DatabaseCore::new(manager, config)))
    }

    pub fn core(&self) -> &DatabaseCore<PgManager> {
        &self.core
    }

    pub async fn health_check(&self) -> HealthReport {
        self.core.health_check().await
    }

    /// Log current pool metrics
    pub fn log_pool_metrics(&self) {
        let snapshot = self.core.pool_snapshot();
        tracing::info!(
            pool_size = snapshot.pool.total,
            idle_connections = snapshot.pool.idle,
            active_connections = snapshot.pool.in_use(),
            waiting = snapshot.pool.waiting,
            total_queries = snapshot.metrics.total_queries,
            failed_queries = snapshot.metrics.failed_queries,
            "Connection pool metrics"
        );
    }

    pub async fn shutdown(&self) -> bool {
        self.core.shutdown().await
    }
}
