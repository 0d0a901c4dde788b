use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::model::{Summary, Task, TaskStatus};

/// Registry entry for one task. Each entry has its own lock so unrelated
/// tasks never contend.
pub struct TaskSlot {
    task: RwLock<Task>,
    cancel: CancellationToken,
    finished: watch::Sender<bool>,
}

impl TaskSlot {
    pub fn new(task: Task) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            task: RwLock::new(task),
            cancel: CancellationToken::new(),
            finished,
        }
    }

    pub fn snapshot(&self) -> Task {
        self.task.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.task.read().unwrap_or_else(|e| e.into_inner()).status
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Moves a pending task to running unless cancellation was requested first.
    pub fn try_start(&self) -> bool {
        let mut task = self.task.write().unwrap_or_else(|e| e.into_inner());
        if self.cancel.is_cancelled() || task.status != TaskStatus::Pending {
            return false;
        }
        task.transition(TaskStatus::Running).is_ok()
    }

    /// Sets the cancellation flag and returns the status observed under the
    /// same lock `try_start` uses, so a `Pending` answer means the task will never run.
    pub fn request_cancel(&self) -> TaskStatus {
        let task = self.task.write().unwrap_or_else(|e| e.into_inner());
        self.cancel.cancel();
        task.status
    }

    /// Stores the final summary. Terminal tasks are never changed again.
    pub fn finish(&self, summary: Summary) -> Task {
        let mut task = self.task.write().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = task.finish(summary) {
            warn!(target: "autoprobe.registry", task_id = %task.task_id, error = %e, "ignoring late status change");
        }
        task.clone()
    }

    /// Acknowledges that the owning worker is done with this task.
    pub fn mark_finished(&self) {
        self.finished.send_replace(true);
    }

    /// Waits for the worker acknowledgement, up to `grace` when given.
    pub async fn wait_finished(&self, grace: Option<Duration>) -> bool {
        let mut rx = self.finished.subscribe();
        let done = rx.wait_for(|done| *done);
        match grace {
            Some(grace) => matches!(tokio::time::timeout(grace, done).await, Ok(Ok(_))),
            None => done.await.is_ok(),
        }
    }
}
