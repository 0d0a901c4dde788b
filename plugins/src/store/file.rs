use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use autoprobe_core::api::{RegistryError, StoredDefinition, Task, TaskStore};

/// JSON-file task store: `tasks/<id>.json` and `definitions/<name>.json`
/// under one root directory.
pub struct FileTaskStore {
    root: PathBuf,
}

impl FileTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, task_id: &str) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", file_stem(task_id)))
    }

    fn definition_path(&self, task_name: &str) -> PathBuf {
        self.root
            .join("definitions")
            .join(format!("{}.json", file_stem(task_name)))
    }
}

/// Injective file-name encoding: safe bytes pass through, others become `%XX`.
fn file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await.map_err(RegistryError::store)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(RegistryError::store)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await.map_err(RegistryError::store)?;
    fs::rename(&tmp, path).await.map_err(RegistryError::store)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RegistryError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RegistryError::store(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::store(e)),
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save_task(&self, task: &Task) -> Result<(), RegistryError> {
        write_json(&self.task_path(&task.task_id), task).await
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<Task>, RegistryError> {
        read_json(&self.task_path(task_id)).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), RegistryError> {
        match fs::remove_file(self.task_path(task_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(RegistryError::store(e)),
            _ => Ok(()),
        }
    }

    async fn list_tasks(&self, owner: Option<&str>) -> Result<Vec<Task>, RegistryError> {
        let dir = self.root.join("tasks");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegistryError::store(e)),
        };

        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(RegistryError::store)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Task>(&path).await {
                Ok(Some(task)) if owner.is_none() || task.owner.as_deref() == owner => {
                    tasks.push(task)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "autoprobe.registry", path = %path.display(), error = %e, "skipping unreadable task file")
                }
            }
        }
        Ok(tasks)
    }

    async fn save_definition(&self, stored: &StoredDefinition) -> Result<(), RegistryError> {
        write_json(&self.definition_path(&stored.task_name), stored).await
    }

    async fn load_definition(
        &self,
        task_name: &str,
    ) -> Result<Option<StoredDefinition>, RegistryError> {
        read_json(&self.definition_path(task_name)).await
    }
}
