//! Effects that outlive the response they belong to.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use crate::error::WorkerError;

/// Tracks spawned background effects (cache writes, invalidation checks).
///
/// Failures are logged and never reach the request that caused them.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an effect on the current runtime.
    pub fn spawn<F>(&self, name: &'static str, effect: F)
    where
        F: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let task = async move {
            if let Err(e) = effect.await {
                tracing::warn!(task = name, error = %e, "background task failed");
            }
        };

        match self.tasks.lock() {
            Ok(mut tasks) => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }

    /// Number of effects not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Wait until every effect spawned so far (and any they spawn) finished.
    /// Returns the number of effects collected.
    pub async fn settle(&self) -> usize {
        let mut collected = 0;
        loop {
            let mut batch = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => return collected,
            };
            if batch.is_empty() {
                return collected;
            }
            while let Some(result) = batch.join_next().await {
                collected += 1;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_settle_waits_for_effects() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [5, 1, 10] {
            let done = done.clone();
            tasks.spawn("sleep", async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(tasks.settle().await, 3);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fails", async {
            Err(WorkerError::Lifecycle {
                action: "test",
                phase: edge_core::WorkerPhase::Parsed,
            })
        });
        assert_eq!(tasks.settle().await, 1);
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        tasks.spawn("panics", async { panic!("boom") });
        let after = done.clone();
        tasks.spawn("after", async move {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(tasks.settle().await, 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_spawns_are_settled() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.spawn("outer", async move {
            inner_tasks.spawn("inner", async move {
                inner_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        assert_eq!(tasks.settle().await, 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_settle_on_empty() {
        assert_eq!(BackgroundTasks::new().settle().await, 0);
    }
}
