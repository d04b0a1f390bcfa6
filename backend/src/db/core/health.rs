use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::executor::{self, RetryPolicy};
use super::{ConnectionManager, ConnectionPool, MetricsSnapshot, MetricsState, PoolStats};

const LIVENESS_QUERY: &str = "SELECT now()";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Liveness payload: status plus the pool counters, and the query metrics when
/// the database answered.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub pool: PoolStats,
    #[serde(flatten)]
    pub metrics: Option<MetricsSnapshot>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Pool and query counters together, as reported by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    #[serde(flatten)]
    pub pool: PoolStats,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

/// Never fails: any error is folded into an `unhealthy` report.
pub(crate) async fn check<M: ConnectionManager>(
    pool: &Arc<ConnectionPool<M>>,
    metrics: &MetricsState,
    timeout: Duration,
    policy: RetryPolicy,
) -> HealthReport {
    let result = executor::execute(pool, metrics, LIVENESS_QUERY, &[], timeout, policy.with_retries(0)).await;
    match result {
        Ok(_) => HealthReport {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            error: None,
            pool: pool.stats(),
            metrics: Some(metrics.snapshot()),
        },
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            HealthReport {
                status: HealthStatus::Unhealthy,
                timestamp: Utc::now(),
                error: Some(e.to_string()),
                pool: pool.stats(),
                metrics: None,
            }
        }
    }
}
