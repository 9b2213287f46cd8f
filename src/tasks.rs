//! Supervised background tasks.
//!
//! Every task the control peer starts (accept loop, connection handlers,
//! exit watchers, address announcements) runs inside one [`TaskSupervisor`].
//! Shutdown cancels the shared token, gives tasks a grace period to notice,
//! aborts the rest and joins everything.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Owner of all background tasks
#[derive(Debug, Default)]
pub struct TaskSupervisor {
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a supervised task. Returns `false` once shutdown has begun.
    pub fn spawn<F>(&self, name: &str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            tracing::debug!("Not spawning '{}': shutting down", name);
            return false;
        }

        let Ok(mut tasks) = self.tasks.lock() else {
            return false;
        };
        // Reap finished tasks so the set does not grow without bound
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
        tasks.spawn(task);
        tracing::trace!("Spawned task '{}' ({} running)", name, tasks.len());
        true
    }

    /// The token cancelled on shutdown
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled on shutdown or when cancelled itself
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of tasks not yet reaped
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Cancel all tasks, wait up to `grace` for them to finish, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.token.cancel();

        let mut tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        if tasks.is_empty() {
            return;
        }
        tracing::debug!("Waiting for {} background tasks", tasks.len());

        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!("Aborting {} background tasks after {:?}", tasks.len(), grace);
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        }
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!("Background task panicked: {}", e),
    }
}
