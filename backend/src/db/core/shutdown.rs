use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ConnectionManager, ConnectionPool};

/// Owns the background tasks of the access layer and tears everything down once.
///
/// Tasks are stopped before the pool is closed so nothing samples a pool that is
/// going away.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    done: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token a background task should watch to know when to stop.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        if self.is_shut_down() {
            handle.abort();
            return;
        }
        self.lock_tasks().push(handle);
    }

    pub fn is_shut_down(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.lock_tasks().iter().filter(|h| !h.is_finished()).count()
    }

    /// Returns `false` when shutdown had already happened.
    pub async fn shutdown<M: ConnectionManager>(&self, pool: &ConnectionPool<M>, grace: Duration) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            tracing::debug!("Database shutdown already performed");
            return false;
        }

        tracing::info!("Stopping database background tasks");
        self.token.cancel();
        let tasks: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Database background task failed");
                }
            }
        }

        tracing::info!("Closing database connection pool");
        pool.close(grace).await;
        tracing::info!("Database connection pool closed");
        true
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
