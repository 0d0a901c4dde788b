//! Job registry: accepts task definitions, queues one task per repeat and
//! runs them on a bounded worker pool.

mod dispatch;
mod events;
mod slot;
mod store;

pub use events::TaskEvent;
pub use slot::TaskSlot;
pub use store::{MemoryTaskStore, StoredDefinition, TaskStore};

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::engine::{EngineContext, RunOutcome};
use crate::error::RegistryError;
use crate::model::{Summary, Task, TaskDefinition, TaskStatus};

const EVENT_CAPACITY: usize = 1024;

pub(crate) struct Shared {
    pub(crate) slots: DashMap<String, Arc<TaskSlot>>,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) engine: EngineContext,
    pub(crate) events: broadcast::Sender<TaskEvent>,
}

impl Shared {
    pub(crate) fn emit(&self, event: TaskEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn slot(&self, task_id: &str) -> Option<Arc<TaskSlot>> {
        self.slots.get(task_id).map(|s| s.value().clone())
    }

    /// Stores the final summary, announces it and releases the slot. The slot
    /// leaves memory only once the store holds the terminal task.
    pub(crate) async fn finish(&self, slot: &TaskSlot, summary: Summary) -> Task {
        let finished = slot.finish(summary);
        let task_id = finished.task_id.clone();
        let persisted = match self.store.save_task(&finished).await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "autoprobe.registry", task_id = %task_id, error = %e, "failed to persist finished task");
                false
            }
        };
        self.emit(TaskEvent::Finished {
            task_id: task_id.clone(),
            status: finished.status,
        });
        slot.mark_finished();
        if persisted {
            self.slots.remove(&task_id);
        }
        finished
    }
}

/// Tasks of one owner grouped by status, newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskGroups {
    pub pending: Vec<Task>,
    pub running: Vec<Task>,
    pub completed: Vec<Task>,
    pub error: Vec<Task>,
}

impl TaskGroups {
    pub fn len(&self) -> usize {
        self.pending.len() + self.running.len() + self.completed.len() + self.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct JobRegistry {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<String>,
    config: RegistryConfig,
}

impl JobRegistry {
    /// Creates the registry and spawns its dispatcher. Must be called inside a
    /// tokio runtime.
    pub fn start(engine: EngineContext, store: Arc<dyn TaskStore>, config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            slots: DashMap::new(),
            store,
            engine,
            events,
        });
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch::dispatch(shared.clone(), rx, config.max_workers));
        info!(target: "autoprobe.registry", max_workers = config.max_workers, "job registry started");
        Self {
            shared,
            queue,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    /// Validates the definition and queues `repeat` tasks. Nothing is created
    /// when validation fails.
    pub async fn enqueue(
        &self,
        definition: TaskDefinition,
        owner: Option<&str>,
    ) -> Result<Vec<String>, RegistryError> {
        let mut definition = definition;
        definition.validate(self.config.max_repeat)?;
        let task_name = definition.task_name();
        let owner = owner.map(str::to_string);

        self.shared
            .store
            .save_definition(&StoredDefinition {
                task_name: task_name.clone(),
                definition: definition.clone(),
                owner: owner.clone(),
                updated_at: Utc::now(),
            })
            .await?;

        let mut ids = Vec::with_capacity(definition.repeat as usize);
        for _ in 0..definition.repeat {
            let task_id = Uuid::new_v4().simple().to_string();
            let task = Task::new(task_id.clone(), definition.clone(), owner.clone());
            self.shared.store.save_task(&task).await?;
            self.shared
                .slots
                .insert(task_id.clone(), Arc::new(TaskSlot::new(task)));
            self.queue
                .send(task_id.clone())
                .map_err(|_| RegistryError::QueueClosed)?;
            self.shared.emit(TaskEvent::Queued {
                task_id: task_id.clone(),
                task_name: task_name.clone(),
            });
            ids.push(task_id);
        }
        info!(target: "autoprobe.registry", task_name = %task_name, count = ids.len(), "tasks queued");
        Ok(ids)
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskStatus, RegistryError> {
        if let Some(slot) = self.shared.slot(task_id) {
            return Ok(slot.status());
        }
        Ok(self.stored_task(task_id).await?.status)
    }

    pub async fn task(&self, task_id: &str) -> Result<Task, RegistryError> {
        if let Some(slot) = self.shared.slot(task_id) {
            return Ok(slot.snapshot());
        }
        self.stored_task(task_id).await
    }

    /// Final summary of a terminal task.
    pub async fn result(&self, task_id: &str) -> Result<Summary, RegistryError> {
        let task = self.task(task_id).await?;
        if !task.status.is_terminal() {
            return Err(RegistryError::Conflict(
                "task is still in progress".to_string(),
            ));
        }
        task.summary
            .ok_or_else(|| RegistryError::NotFound(format!("summary for task {task_id}")))
    }

    /// Blocks until the task reaches a terminal status.
    pub async fn wait(&self, task_id: &str) -> Result<Task, RegistryError> {
        if let Some(slot) = self.shared.slot(task_id) {
            slot.wait_finished(None).await;
            return Ok(slot.snapshot());
        }
        self.stored_task(task_id).await
    }

    /// Requests cooperative cancellation without removing the task.
    pub async fn cancel(&self, task_id: &str) -> Result<TaskStatus, RegistryError> {
        match self.shared.slot(task_id) {
            Some(slot) => {
                let status = slot.request_cancel();
                info!(target: "autoprobe.registry", task_id = %task_id, status = %status, "cancellation requested");
                if status != TaskStatus::Pending {
                    return Ok(status);
                }
                // never started, so no worker will finish it
                let task = slot.snapshot();
                let summary = RunOutcome::cancelled().summary(task_id, &task.task_name);
                Ok(self.shared.finish(&slot, summary).await.status)
            }
            None => Ok(self.stored_task(task_id).await?.status),
        }
    }

    /// Removes a task. Running tasks are cancelled first and must acknowledge
    /// within the configured grace period.
    pub async fn delete(&self, task_id: &str) -> Result<(), RegistryError> {
        let Some(slot) = self.shared.slot(task_id) else {
            self.stored_task(task_id).await?;
            return self.remove(task_id).await;
        };

        match slot.request_cancel() {
            TaskStatus::Pending => {
                // never started; a worker picking it up now sees the flag
                slot.mark_finished();
            }
            TaskStatus::Running => {
                let grace = Duration::from_millis(self.config.delete_grace_ms);
                if !slot.wait_finished(Some(grace)).await {
                    warn!(target: "autoprobe.registry", task_id = %task_id, "running task did not stop in time");
                    return Err(RegistryError::Conflict(format!(
                        "task {task_id} did not stop within {}ms; retry the delete",
                        self.config.delete_grace_ms
                    )));
                }
            }
            TaskStatus::Completed | TaskStatus::Error => {}
        }
        self.remove(task_id).await
    }

    /// Queues the stored definition of `task_name` again.
    pub async fn rerun(
        &self,
        task_name: &str,
        owner: Option<&str>,
    ) -> Result<Vec<String>, RegistryError> {
        let stored = self.stored_definition(task_name).await?;
        let owner = owner.or(stored.owner.as_deref());
        self.enqueue(stored.definition.clone(), owner).await
    }

    pub async fn get_definition(&self, task_name: &str) -> Result<TaskDefinition, RegistryError> {
        Ok(self.stored_definition(task_name).await?.definition)
    }

    /// Replaces the stored definition of an existing task name.
    pub async fn update_definition(
        &self,
        task_name: &str,
        definition: TaskDefinition,
    ) -> Result<(), RegistryError> {
        let previous = self.stored_definition(task_name).await?;
        let mut definition = definition;
        definition.validate(self.config.max_repeat)?;
        self.shared
            .store
            .save_definition(&StoredDefinition {
                task_name: task_name.to_string(),
                definition,
                owner: previous.owner,
                updated_at: Utc::now(),
            })
            .await
    }

    /// Every task of `owner` (or of everyone when `None`), grouped by status.
    pub async fn list_by_owner(&self, owner: Option<&str>) -> Result<TaskGroups, RegistryError> {
        let mut tasks: HashMap<String, Task> = self
            .shared
            .store
            .list_tasks(owner)
            .await?
            .into_iter()
            .map(|t| (t.task_id.clone(), t))
            .collect();
        for entry in self.shared.slots.iter() {
            let task = entry.value().snapshot();
            if owner.is_none() || task.owner.as_deref() == owner {
                tasks.insert(task.task_id.clone(), task);
            }
        }

        let mut sorted: Vec<Task> = tasks.into_values().collect();
        sorted.sort_by_key(|t| Reverse(t.updated_at));

        let mut groups = TaskGroups::default();
        for task in sorted {
            match task.status {
                TaskStatus::Pending => groups.pending.push(task),
                TaskStatus::Running => groups.running.push(task),
                TaskStatus::Completed => groups.completed.push(task),
                TaskStatus::Error => groups.error.push(task),
            }
        }
        Ok(groups)
    }

    async fn remove(&self, task_id: &str) -> Result<(), RegistryError> {
        self.shared.slots.remove(task_id);
        self.shared.store.delete_task(task_id).await?;
        self.shared.emit(TaskEvent::Deleted {
            task_id: task_id.to_string(),
        });
        info!(target: "autoprobe.registry", task_id = %task_id, "task deleted");
        Ok(())
    }

    async fn stored_task(&self, task_id: &str) -> Result<Task, RegistryError> {
        self.shared
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("task {task_id}")))
    }

    async fn stored_definition(&self, task_name: &str) -> Result<StoredDefinition, RegistryError> {
        self.shared
            .store
            .load_definition(task_name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("task definition {task_name}")))
    }
}
