//! Named background tasks sharing one cancellation root.

use std::{collections::HashMap, future::Future, time::Duration};

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns named tasks and stops them together.
///
/// Every task receives a child of the global token; cancelling the global
/// token (on shutdown or from a signal) stops them all.
pub struct TaskManager {
    tasks: HashMap<&'static str, JoinHandle<Result<()>>>,
    global_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Token cancelled when the manager shuts down.
    pub fn token(&self) -> CancellationToken {
        self.global_token.clone()
    }

    pub fn spawn_task<F, Fut>(&mut self, name: &'static str, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let task = task_fn(self.global_token.child_token());
        let handle = tokio::spawn(async move {
            let result = task.await;
            match &result {
                Ok(()) => info!("Task '{name}' finished"),
                Err(e) => error!("Task '{name}' failed: {e:#}"),
            }
            result
        });

        if self.tasks.insert(name, handle).is_some() {
            warn!("Task '{name}' replaced a task with the same name");
        }
        info!("Task '{name}' spawned");
    }

    /// Cancels every task and waits for them, returning the first failure.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping {} task(s)", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.tasks.drain() {
            let outcome = match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(anyhow!("task '{name}' panicked: {join_error}")),
                Err(_) => Err(anyhow!("task '{name}' did not stop in time")),
            };
            if let Err(e) = outcome {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    #[tokio::test]
    async fn cancelled_tasks_stop_cleanly() {
        let mut manager = TaskManager::new();
        manager.spawn_task("waiter", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        sleep(Duration::from_millis(5)).await;
        assert!(manager.is_running("waiter"));
        assert_eq!(manager.active_count(), 1);

        manager.shutdown_all().await.unwrap();
        assert_eq!(manager.active_count(), 0);
        assert!(manager.token().is_cancelled());
    }

    #[tokio::test]
    async fn finished_task_is_not_running() {
        let mut manager = TaskManager::new();
        manager.spawn_task("oneshot", |_| async { Ok(()) });

        sleep(Duration::from_millis(5)).await;
        assert!(!manager.is_running("oneshot"));
        assert!(!manager.is_running("unknown"));
        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn task_error_surfaces_at_shutdown() {
        let mut manager = TaskManager::new();
        manager.spawn_task("broken", |_| async { Err(anyhow!("device vanished")) });
        manager.spawn_task("fine", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        let err = manager.shutdown_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("device vanished"));
    }

    #[tokio::test]
    async fn stuck_task_times_out() {
        let mut manager = TaskManager::new().with_shutdown_timeout(Duration::from_millis(10));
        manager.spawn_task("stuck", |_| async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let err = manager.shutdown_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("did not stop in time"));
    }
}
