use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::model::{Task, TaskDefinition};

/// Definition kept under its task name so it can be rerun later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDefinition {
    pub task_name: String,
    pub definition: TaskDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Durable side of the registry. In-memory entries stay authoritative while
/// a task is live; the store answers for everything else.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save_task(&self, task: &Task) -> Result<(), RegistryError>;

    async fn load_task(&self, task_id: &str) -> Result<Option<Task>, RegistryError>;

    async fn delete_task(&self, task_id: &str) -> Result<(), RegistryError>;

    /// Tasks belonging to `owner`, or every task when `owner` is `None`.
    async fn list_tasks(&self, owner: Option<&str>) -> Result<Vec<Task>, RegistryError>;

    async fn save_definition(&self, stored: &StoredDefinition) -> Result<(), RegistryError>;

    async fn load_definition(
        &self,
        task_name: &str,
    ) -> Result<Option<StoredDefinition>, RegistryError>;
}

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    definitions: RwLock<HashMap<String, StoredDefinition>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save_task(&self, task: &Task) -> Result<(), RegistryError> {
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<Task>, RegistryError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), RegistryError> {
        self.tasks.write().await.remove(task_id);
        Ok(())
    }

    async fn list_tasks(&self, owner: Option<&str>) -> Result<Vec<Task>, RegistryError> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| owner.is_none() || t.owner.as_deref() == owner)
            .cloned()
            .collect())
    }

    async fn save_definition(&self, stored: &StoredDefinition) -> Result<(), RegistryError> {
        self.definitions
            .write()
            .await
            .insert(stored.task_name.clone(), stored.clone());
        Ok(())
    }

    async fn load_definition(
        &self,
        task_name: &str,
    ) -> Result<Option<StoredDefinition>, RegistryError> {
        Ok(self.definitions.read().await.get(task_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskSpec;

    #[tokio::test]
    async fn lists_filter_by_owner() {
        let store = MemoryTaskStore::new();
        let def = TaskDefinition::new("p", vec![TaskSpec::new("login", "d")]);
        store
            .save_task(&Task::new("a".into(), def.clone(), Some("alice".into())))
            .await
            .unwrap();
        store
            .save_task(&Task::new("b".into(), def, Some("bob".into())))
            .await
            .unwrap();

        let alice = store.list_tasks(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].task_id, "a");
        assert_eq!(store.list_tasks(None).await.unwrap().len(), 2);
    }
}
