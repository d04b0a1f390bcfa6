//! Scripted in-memory backend used by the unit tests of the access layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Connection, ConnectionManager, DbError, SqlParam};

#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<Vec<String>, DbError>,
}

impl Step {
    pub fn ok(rows: &[&str]) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(rows.iter().map(|r| r.to_string()).collect()),
        }
    }

    pub fn fail(code: Option<&str>, message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(DbError::driver(code, message)),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<Step>>,
    statements: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
    failing_control: Mutex<Vec<String>>,
    stalled_control: Mutex<Vec<(String, Duration)>>,
    connects: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    connect_failures: AtomicUsize,
}

/// Every clone shares the same script and counters.
#[derive(Clone, Default)]
pub struct MockManager {
    shared: Arc<Shared>,
}

impl MockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for data statements, consumed in order across connections.
    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.shared.script.lock().unwrap().extend(steps);
    }

    pub fn fail_connects(&self, count: usize) {
        self.shared.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Make a transaction-control statement (`BEGIN`, `COMMIT`, `ROLLBACK`) fail.
    pub fn fail_control(&self, sql: &str) {
        self.shared.failing_control.lock().unwrap().push(sql.to_string());
    }

    /// Make a transaction-control statement take `delay` before answering, like
    /// a server still draining an abandoned statement.
    pub fn stall_control(&self, sql: &str, delay: Duration) {
        self.shared.stalled_control.lock().unwrap().push((sql.to_string(), delay));
    }

    pub fn statements(&self) -> Vec<String> {
        self.shared.statements.lock().unwrap().clone()
    }

    pub fn count(&self, sql: &str) -> usize {
        self.statements().iter().filter(|s| s.as_str() == sql).count()
    }

    /// Data statements whose effects became visible (autocommit or committed).
    pub fn committed(&self) -> Vec<String> {
        self.shared.committed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.shared.peak_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionManager for MockManager {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, DbError> {
        let remaining = self.shared.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::driver(None, "connection refused"));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(MockConnection {
            shared: self.shared.clone(),
            in_transaction: false,
            pending: Vec::new(),
        })
    }
}

pub struct MockConnection {
    shared: Arc<Shared>,
    in_transaction: bool,
    pending: Vec<String>,
}

#[async_trait]
impl Connection for MockConnection {
    type Row = String;

    async fn execute(&mut self, sql: &str, _params: &[SqlParam]) -> Result<Vec<String>, DbError> {
        self.shared.statements.lock().unwrap().push(sql.to_string());

        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            let stall = self
                .shared
                .stalled_control
                .lock()
                .unwrap()
                .iter()
                .find(|(s, _)| s == sql)
                .map(|(_, delay)| *delay);
            if let Some(delay) = stall {
                tokio::time::sleep(delay).await;
            }
            if self.shared.failing_control.lock().unwrap().iter().any(|s| s == sql) {
                return Err(DbError::driver(None, "server closed the connection unexpectedly"));
            }
            match sql {
                "BEGIN" => self.in_transaction = true,
                "COMMIT" => {
                    self.in_transaction = false;
                    let done = std::mem::take(&mut self.pending);
                    self.shared.committed.lock().unwrap().extend(done);
                }
                _ => {
                    self.in_transaction = false;
                    self.pending.clear();
                }
            }
            return Ok(Vec::new());
        }

        let step = self.shared.script.lock().unwrap().pop_front();
        let step = step.unwrap_or_else(|| Step::ok(&[]));
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        if step.result.is_ok() {
            if self.in_transaction {
                self.pending.push(sql.to_string());
            } else {
                self.shared.committed.lock().unwrap().push(sql.to_string());
            }
        }
        step.result
    }

    async fn close(self) {}
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}
