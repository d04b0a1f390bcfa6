use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::{Connection, ConnectionManager, DbError};

/// Sizing and lifetime limits for a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max: usize,
    pub min: usize,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
    /// Connections are retired after this many checkouts. Zero disables the limit.
    pub max_uses: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max: 20,
            min: 2,
            idle_timeout: Duration::from_millis(30_000),
            connection_timeout: Duration::from_millis(10_000),
            max_uses: 7_500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveReason {
    Errored,
    MaxUses,
    IdleTimeout,
    Closed,
}

/// Lifecycle notifications emitted by the pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Connect,
    Acquire,
    Remove { reason: RemoveReason },
    Error { message: String },
}

pub type EventHook = Arc<dyn Fn(&PoolEvent) + Send + Sync>;

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub waiting: usize,
    pub max: usize,
}

impl PoolStats {
    pub fn in_use(&self) -> usize {
        self.total.saturating_sub(self.idle)
    }
}

struct Slot<C> {
    conn: C,
    idle_since: Instant,
    uses: u32,
}

/// Bounded set of reusable connections.
///
/// Every checkout holds a semaphore permit, so at most `max` connections are ever
/// in use or being opened. Idle connections are kept on a LIFO stack; the oldest
/// sit at the bottom where the reaper finds them.
pub struct ConnectionPool<M: ConnectionManager> {
    manager: M,
    settings: PoolSettings,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Slot<M::Connection>>>,
    total: AtomicUsize,
    waiting: AtomicUsize,
    closed: AtomicBool,
    drained: Notify,
    hook: Option<EventHook>,
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, settings: PoolSettings) -> Self {
        Self {
            manager,
            permits: Arc::new(Semaphore::new(settings.max)),
            settings,
            idle: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            drained: Notify::new(),
            hook: None,
        }
    }

    pub fn with_event_hook(mut self, hook: EventHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.total.load(Ordering::SeqCst),
            idle: self.idle_stack().len(),
            waiting: self.waiting.load(Ordering::SeqCst),
            max: self.settings.max,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Borrow a connection, waiting up to `connection_timeout` for capacity.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<M>, DbError> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }

        let deadline = Instant::now() + self.settings.connection_timeout;
        let permit = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            match tokio::time::timeout_at(deadline, self.permits.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(DbError::PoolClosed),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.settings.connection_timeout.as_millis() as u64,
                        "Timed out waiting for a pooled connection"
                    );
                    return Err(DbError::PoolTimeout(self.settings.connection_timeout));
                }
            }
        };

        loop {
            let candidate = self.idle_stack().pop();
            let Some(slot) = candidate else {
                break;
            };
            if slot.idle_since.elapsed() >= self.settings.idle_timeout {
                self.retire(slot.conn, RemoveReason::IdleTimeout);
                continue;
            }
            self.emit(PoolEvent::Acquire);
            return Ok(PooledConnection::new(self.clone(), slot, permit));
        }

        self.total.fetch_add(1, Ordering::SeqCst);
        match tokio::time::timeout_at(deadline, self.manager.connect()).await {
            Ok(Ok(conn)) => {
                self.emit(PoolEvent::Connect);
                self.emit(PoolEvent::Acquire);
                let slot = Slot {
                    conn,
                    idle_since: Instant::now(),
                    uses: 0,
                };
                Ok(PooledConnection::new(self.clone(), slot, permit))
            }
            Ok(Err(e)) => {
                self.forget_one();
                let e = e.classify();
                self.emit(PoolEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
            Err(_) => {
                self.forget_one();
                Err(DbError::PoolTimeout(self.settings.connection_timeout))
            }
        }
    }

    /// Open connections until `min` are live. Stops at the first failure.
    pub async fn warm_up(&self) -> usize {
        let mut opened = 0;
        while self.total.load(Ordering::SeqCst) < self.settings.min && !self.is_closed() {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            self.total.fetch_add(1, Ordering::SeqCst);
            match self.manager.connect().await {
                Ok(conn) => {
                    self.emit(PoolEvent::Connect);
                    self.idle_stack().push(Slot {
                        conn,
                        idle_since: Instant::now(),
                        uses: 0,
                    });
                    opened += 1;
                }
                Err(e) => {
                    self.forget_one();
                    self.emit(PoolEvent::Error {
                        message: e.classify().to_string(),
                    });
                    break;
                }
            }
            drop(permit);
        }
        opened
    }

    /// Retire idle connections past `idle_timeout`, keeping at least `min` live.
    pub fn reap_idle(&self) -> usize {
        let expired: Vec<Slot<M::Connection>> = {
            let mut idle = self.idle_stack();
            let total = self.total.load(Ordering::SeqCst);
            let removable = total.saturating_sub(self.settings.min);
            let count = idle
                .iter()
                .take(removable)
                .take_while(|slot| slot.idle_since.elapsed() >= self.settings.idle_timeout)
                .count();
            idle.drain(..count).collect()
        };

        let reaped = expired.len();
        for slot in expired {
            self.retire(slot.conn, RemoveReason::IdleTimeout);
        }
        reaped
    }

    /// Stop handing out connections, close idle ones, then wait for borrowed
    /// connections to come back (up to `grace`). Calling it again is a no-op.
    pub async fn close(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();

        let idle: Vec<Slot<M::Connection>> = self.idle_stack().drain(..).collect();
        for slot in idle {
            self.total.fetch_sub(1, Ordering::SeqCst);
            self.emit(PoolEvent::Remove {
                reason: RemoveReason::Closed,
            });
            slot.conn.close().await;
        }

        let drained = async {
            loop {
                let notified = self.drained.notified();
                if self.total.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(grace, drained).await.is_err() {
            tracing::warn!(
                in_use = self.total.load(Ordering::SeqCst),
                "Pool closed with connections still borrowed"
            );
        }
    }

    fn give_back(&self, mut slot: Slot<M::Connection>, had_error: bool) {
        slot.uses += 1;
        let reason = if had_error {
            Some(RemoveReason::Errored)
        } else if self.settings.max_uses > 0 && slot.uses >= self.settings.max_uses {
            Some(RemoveReason::MaxUses)
        } else if self.is_closed() {
            Some(RemoveReason::Closed)
        } else {
            None
        };

        match reason {
            Some(reason) => self.retire(slot.conn, reason),
            None => {
                slot.idle_since = Instant::now();
                self.idle_stack().push(slot);
            }
        }
    }

    fn retire(&self, conn: M::Connection, reason: RemoveReason) {
        self.forget_one();
        self.emit(PoolEvent::Remove { reason });
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(conn.close());
            }
            Err(_) => tracing::debug!("No runtime available; dropping connection without close"),
        }
    }

    fn forget_one(&self) {
        self.total.fetch_sub(1, Ordering::SeqCst);
        self.drained.notify_waiters();
    }

    fn emit(&self, event: PoolEvent) {
        match &event {
            PoolEvent::Connect => tracing::debug!("Pool opened a new connection"),
            PoolEvent::Acquire => tracing::trace!("Pool connection acquired"),
            PoolEvent::Remove { reason } => tracing::debug!(?reason, "Pool connection removed"),
            PoolEvent::Error { message } => {
                tracing::error!(error = %message, "Unexpected connection pool error")
            }
        }
        if let Some(hook) = &self.hook {
            hook(&event);
        }
    }

    fn idle_stack(&self) -> MutexGuard<'_, Vec<Slot<M::Connection>>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection borrowed from the pool.
///
/// The release side effect runs at most once, guarded by `released`. Dropping a
/// handle that was never released explicitly discards the connection: it may be
/// in the middle of a statement.
pub struct PooledConnection<M: ConnectionManager> {
    pool: Arc<ConnectionPool<M>>,
    slot: Option<Slot<M::Connection>>,
    permit: Option<OwnedSemaphorePermit>,
    released: AtomicBool,
}

impl<M: ConnectionManager> PooledConnection<M> {
    fn new(pool: Arc<ConnectionPool<M>>, slot: Slot<M::Connection>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            pool,
            slot: Some(slot),
            permit: Some(permit),
            released: AtomicBool::new(false),
        }
    }

    pub fn connection(&mut self) -> Result<&mut M::Connection, DbError> {
        self.slot
            .as_mut()
            .map(|slot| &mut slot.conn)
            .ok_or_else(|| DbError::Connection("connection already released".to_string()))
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Return the connection to the pool, or discard it when `had_error` is set.
    /// Returns `false` if the connection had already been released.
    pub fn release(&mut self, had_error: bool) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if let Some(slot) = self.slot.take() {
            self.pool.give_back(slot, had_error);
        }
        // Only free capacity once the connection is back on the idle stack.
        self.permit.take();
        true
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if self.release(true) {
            tracing::debug!("Pooled connection dropped without release; discarded");
        }
    }
}
