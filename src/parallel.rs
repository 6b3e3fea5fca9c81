use std::future::Future;
use std::sync::Arc;
use log::error;
use tokio::sync::Semaphore;

use crate::error::Result;

/// Why a spawned task produced no value of its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLost(pub String);

/// Runs tasks as spawned tokio tasks, at most `max_concurrent` at a time
///
/// Results come back in submission order regardless of completion order.
#[derive(Debug, Clone)]
pub struct BoundedPool {
    semaphore: Arc<Semaphore>,
}

impl BoundedPool {
    /// Creates a pool with the given concurrency limit (at least one)
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawns every task and waits for all of them
    ///
    /// A task never cancels its siblings. A task that panicked or was
    /// aborted is reported as `Err(TaskLost)` in its slot.
    pub async fn run<F, T>(&self, tasks: Vec<F>) -> Vec<std::result::Result<Result<T>, TaskLost>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let semaphore = self.semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                task.await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.map_err(|e| {
                error!("Pooled task did not complete: {}", e);
                TaskLost(e.to_string())
            }));
        }
        results
    }
}
