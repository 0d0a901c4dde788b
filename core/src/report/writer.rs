use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::model::{artifact_stem, normalise_target_name, Snapshot, Step, Summary, TaskDefinition};

/// Writes artifacts under `<reports_folder>/<task_name>/<task_id>/`.
///
/// Every write is best effort: a failing disk never fails the run, it is only logged.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: Option<PathBuf>,
}

impl ReportWriter {
    pub fn new(reports_folder: &str, task_name: &str, task_id: &str) -> Self {
        let dir = Path::new(reports_folder)
            .join(normalise_target_name(task_name))
            .join(task_id);
        Self { dir: Some(dir) }
    }

    /// A writer that drops everything.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Forward-slash form of the directory, as stored in summaries.
    pub fn display_path(&self) -> Option<String> {
        self.dir
            .as_ref()
            .map(|d| d.to_string_lossy().replace('\\', "/"))
    }

    pub async fn prepare(&self) {
        if let Some(dir) = &self.dir {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(target: "autoprobe.loop", dir = %dir.display(), error = %e, "cannot create report directory");
            }
        }
    }

    pub async fn write_bytes(&self, name: &str, bytes: &[u8]) -> Option<String> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(name.to_string()),
            Err(e) => {
                warn!(target: "autoprobe.loop", path = %path.display(), error = %e, "failed to write report artifact");
                None
            }
        }
    }

    pub async fn write_text(&self, name: &str, text: &str) -> Option<String> {
        self.write_bytes(name, text.as_bytes()).await
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Option<String> {
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => self.write_bytes(name, &bytes).await,
            Err(e) => {
                warn!(target: "autoprobe.loop", name, error = %e, "failed to serialize report artifact");
                None
            }
        }
    }

    pub async fn write_task(&self, definition: &TaskDefinition) {
        self.write_json("task.json", definition).await;
    }

    pub async fn write_prompt(&self, index: usize, prompt: &str) {
        self.write_text(&format!("step{index}_prompt.md"), prompt).await;
    }

    /// Stores the page source and screenshot the step was decided on.
    /// Returns the screenshot file name when one was written.
    pub async fn write_snapshot(&self, index: usize, snapshot: &Snapshot, multi_target: bool) -> Option<String> {
        let stem = artifact_stem(index, &snapshot.target, multi_target);
        if !snapshot.source.is_empty() {
            self.write_text(&format!("{stem}.{}", snapshot.source_extension()), &snapshot.source)
                .await;
        }
        match snapshot.screenshot.as_deref() {
            Some(png) => self.write_bytes(&format!("{stem}.png"), png).await,
            None => None,
        }
    }

    pub async fn write_step(&self, step: &Step) {
        self.write_json(&format!("step{}.json", step.index), step).await;
    }

    pub async fn write_summary(&self, summary: &Summary) {
        self.write_json("summary.json", summary).await;
    }
}
