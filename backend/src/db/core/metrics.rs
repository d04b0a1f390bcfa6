use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PoolStats;

#[derive(Debug, Default)]
struct Counters {
    total_queries: u64,
    failed_queries: u64,
    avg_query_time_ms: f64,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
}

/// Process-wide query counters, owned by the database wrapper.
#[derive(Debug, Default)]
pub struct MetricsState {
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub failed_queries: u64,
    /// Percentage of attempts that succeeded; 100 when nothing has run yet.
    pub success_rate: f64,
    pub avg_query_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed attempt. Failed attempts still feed the running mean.
    pub fn record(&self, success: bool, duration: Duration) {
        let mut c = self.lock();
        c.total_queries += 1;
        if !success {
            c.failed_queries += 1;
        }
        let n = c.total_queries as f64;
        let ms = duration.as_secs_f64() * 1000.0;
        c.avg_query_time_ms = (c.avg_query_time_ms * (n - 1.0) + ms) / n;
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let mut c = self.lock();
        c.last_error = Some(message.into());
        c.last_error_time = Some(Utc::now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.lock();
        let success_rate = if c.total_queries == 0 {
            100.0
        } else {
            (c.total_queries - c.failed_queries) as f64 / c.total_queries as f64 * 100.0
        };
        MetricsSnapshot {
            total_queries: c.total_queries,
            failed_queries: c.failed_queries,
            success_rate,
            avg_query_time_ms: c.avg_query_time_ms,
            last_error: c.last_error.clone(),
            last_error_time: c.last_error_time,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Alerting knobs for the periodic pool monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorThresholds {
    pub waiting_warn: usize,
    pub failed_alert: u64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            waiting_warn: 5,
            failed_alert: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorAlert {
    HighLoad { waiting: usize },
    PoolExhausted { total: usize, max: usize },
    HighFailureCount { failed: u64 },
}

pub fn evaluate(
    pool: &PoolStats,
    metrics: &MetricsSnapshot,
    thresholds: &MonitorThresholds,
) -> Vec<MonitorAlert> {
    let mut alerts = Vec::new();
    if pool.waiting > thresholds.waiting_warn {
        alerts.push(MonitorAlert::HighLoad {
            waiting: pool.waiting,
        });
    }
    if pool.idle == 0 && pool.total >= pool.max {
        alerts.push(MonitorAlert::PoolExhausted {
            total: pool.total,
            max: pool.max,
        });
    }
    if metrics.failed_queries > thresholds.failed_alert {
        alerts.push(MonitorAlert::HighFailureCount {
            failed: metrics.failed_queries,
        });
    }
    alerts
}

pub(crate) fn log_alert(alert: &MonitorAlert) {
    match alert {
        MonitorAlert::HighLoad { waiting } => {
            tracing::warn!(waiting = *waiting, "High database load: clients waiting for connections")
        }
        MonitorAlert::PoolExhausted { total, max } => {
            tracing::warn!(total = *total, max = *max, "Connection pool exhausted")
        }
        MonitorAlert::HighFailureCount { failed } => {
            tracing::error!(failed_queries = *failed, "High number of failed database queries")
        }
    }
}
