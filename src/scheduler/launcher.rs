//! Scheduler Launcher (C6): bounded-concurrency start/stop of scheduler instances
//! bound to a view (spec.md §4.6).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::SchedulerError;
use crate::scheduler::default_scheduler;
use crate::scheduler::interface::PodSchedulingAlgorithm;
use crate::view::View;

/// A running scheduler instance. Dropping it without calling [`SchedulerHandle::stop`]
/// leaves the task running — callers should always `stop()` explicitly.
pub struct SchedulerHandle {
    pub name: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), SchedulerError>>,
    _permit: OwnedSemaphorePermit,
}

impl SchedulerHandle {
    /// Cancels the scheduler's poll loop and releases its launcher permit
    /// (spec.md §4.6 "Stop cancels the child context and releases the semaphore").
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Holds the semaphore of capacity `maxConcurrent` (spec.md §6 `simulation.maxConcurrent`)
/// and the algorithm every launched scheduler runs.
pub struct SchedulerLauncher {
    semaphore: Arc<Semaphore>,
    algorithm: Arc<dyn PodSchedulingAlgorithm>,
    poll_interval: Duration,
}

impl SchedulerLauncher {
    pub fn new(max_concurrent: usize, algorithm: Arc<dyn PodSchedulingAlgorithm>, poll_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            algorithm,
            poll_interval,
        }
    }

    /// Acquires a permit, starts the scheduler in a background task bound to `view`,
    /// and returns a handle. Fails with `SchedulerError::Launch` if the launcher has
    /// been closed.
    pub async fn launch(&self, name: impl Into<String>, view: Arc<dyn View>) -> Result<SchedulerHandle, SchedulerError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedulerError::Launch(e.to_string()))?;
        let name = name.into();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let algorithm = self.algorithm.clone();
        let poll_interval = self.poll_interval;
        let task = tokio::spawn(async move { default_scheduler::run(view, algorithm, poll_interval, task_cancel).await });
        Ok(SchedulerHandle {
            name,
            cancel,
            task,
            _permit: permit,
        })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::base::BaseView;

    #[tokio::test]
    async fn launch_acquires_and_stop_releases_permit() {
        let launcher = SchedulerLauncher::new(1, Arc::new(crate::scheduler::DefaultScheduler::default()), Duration::from_millis(5));
        let view: Arc<dyn View> = Arc::new(BaseView::new(16));
        assert_eq!(launcher.available_permits(), 1);
        let handle = launcher.launch("sim-1", view).await.unwrap();
        assert_eq!(launcher.available_permits(), 0);
        handle.stop().await;
        assert_eq!(launcher.available_permits(), 1);
    }
}
