use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::engine::{run_task, RunInput, RunOutcome, StepObserver};
use crate::error::RunError;
use crate::model::TaskStatus;

use super::events::TaskEvent;
use super::slot::TaskSlot;
use super::Shared;

/// Pulls task ids in FIFO order and hands each to a worker once a pool slot
/// is free. Exits when every queue sender is dropped.
pub(crate) async fn dispatch(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<String>,
    max_workers: usize,
) {
    let sem = Arc::new(Semaphore::new(max_workers.max(1)));
    loop {
        let permit = match sem.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let Some(task_id) = rx.recv().await else {
            break;
        };
        let Some(slot) = shared.slots.get(&task_id).map(|s| s.value().clone()) else {
            debug!(target: "autoprobe.registry", task_id = %task_id, "skipping task removed while queued");
            continue;
        };
        tokio::spawn(run_worker(shared.clone(), task_id, slot, permit));
    }
    debug!(target: "autoprobe.registry", "dispatcher stopped");
}

async fn run_worker(
    shared: Arc<Shared>,
    task_id: String,
    slot: Arc<TaskSlot>,
    _permit: OwnedSemaphorePermit,
) {
    if !slot.try_start() {
        debug!(target: "autoprobe.registry", task_id = %task_id, "task cancelled before start");
        slot.mark_finished();
        return;
    }

    let task = slot.snapshot();
    if let Err(e) = shared.store.save_task(&task).await {
        warn!(target: "autoprobe.registry", task_id = %task_id, error = %e, "failed to persist running task");
    }
    shared.emit(TaskEvent::Started {
        task_id: task_id.clone(),
    });
    info!(target: "autoprobe.registry", task_id = %task_id, task_name = %task.task_name, "task started");

    let events = shared.events.clone();
    let observed_id = task_id.clone();
    let on_step: StepObserver = Arc::new(move |step| {
        let _ = events.send(TaskEvent::StepRecorded {
            task_id: observed_id.clone(),
            index: step.index,
            action: step.action.kind().as_str().to_string(),
            success: step.outcome.success,
            message: step.outcome.message.clone(),
        });
    });

    let input = RunInput {
        task_id: task_id.clone(),
        task_name: task.task_name.clone(),
        definition: task.definition.clone(),
        cancel: slot.cancel_token(),
        on_step: Some(on_step),
    };

    // The run happens on its own task so a panic inside it still ends the task.
    let engine = shared.engine.clone();
    let outcome = match tokio::spawn(async move { run_task(&engine, input).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(target: "autoprobe.registry", task_id = %task_id, error = %e, "worker aborted");
            RunOutcome {
                status: TaskStatus::Error,
                steps: Vec::new(),
                error: Some(RunError::Setup(format!("worker aborted: {e}"))),
                reports_path: None,
            }
        }
    };

    let summary = outcome.summary(&task_id, &task.task_name);
    let finished = shared.finish(&slot, summary).await;
    info!(
        target: "autoprobe.registry",
        task_id = %task_id,
        status = %finished.status,
        cancelled = outcome.is_cancelled(),
        "task finished"
    );
}
