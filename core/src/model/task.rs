use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::state::{StateTransition, TransitionError};

use super::report::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            other => Err(format!("unsupported platform '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    #[default]
    Auto,
    Text,
    Vision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named automation endpoint a run may act against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub platform: Platform,
    /// Falls back to the definition-level `server` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, serde_json::Value>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, platform: Platform, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform,
            server: Some(server.into()),
            default: false,
            capabilities: BTreeMap::new(),
        }
    }

    pub fn server(&self) -> &str {
        self.server.as_deref().unwrap_or_default()
    }
}

fn default_scope() -> String {
    "functional".to_string()
}

/// A scenario the run has to carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub details: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub skip: bool,
    /// Scripted actions; when present they are replayed instead of asking the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<serde_json::Value>,
    /// Target that should be current when the scenario starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Apps activated in order before the scenario starts (mobile only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: details.into(),
            scope: default_scope(),
            skip: false,
            steps: Vec::new(),
            target: None,
            apps: Vec::new(),
        }
    }

    /// Free text the vision classifier inspects.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.name.as_str(), self.details.as_str(), self.scope.as_str()];
        for step in &self.steps {
            if let Some(obj) = step.as_object() {
                parts.extend(obj.values().filter_map(|v| v.as_str()));
            }
        }
        parts.join(" ")
    }
}

fn default_reports_folder() -> String {
    "./reports".to_string()
}

fn default_repeat() -> u32 {
    1
}

/// A run request as submitted to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub prompt: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_reports_folder")]
    pub reports_folder: String,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub llm_mode: LlmMode,
    #[serde(default)]
    pub debug: bool,
}

impl TaskDefinition {
    pub fn new(prompt: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            prompt: prompt.into(),
            tasks,
            server: None,
            platform: None,
            targets: Vec::new(),
            reports_folder: default_reports_folder(),
            repeat: default_repeat(),
            llm_mode: LlmMode::Auto,
            debug: false,
        }
    }

    /// Normalises the definition in place and rejects anything that cannot run.
    ///
    /// Normalisation is idempotent so a stored definition can be re-enqueued unchanged.
    pub fn validate(&mut self, max_repeat: u32) -> Result<(), RegistryError> {
        if self.prompt.trim().is_empty() {
            return Err(RegistryError::validation("prompt must not be empty"));
        }
        if self.tasks.is_empty() {
            return Err(RegistryError::validation(
                "at least one task to perform is required",
            ));
        }
        if let Some(spec) = self.tasks.iter().find(|t| t.name.trim().is_empty()) {
            return Err(RegistryError::validation(format!(
                "task names must not be empty (details: '{}')",
                spec.details
            )));
        }
        if self.repeat == 0 || self.repeat > max_repeat {
            return Err(RegistryError::validation(format!(
                "repeat must be between 1 and {max_repeat}"
            )));
        }

        self.server = self
            .server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if self.targets.is_empty() {
            if self.platform.is_none() {
                return Err(RegistryError::validation(
                    "a platform must be provided when no automation targets are configured",
                ));
            }
            if self.server.is_none() {
                return Err(RegistryError::validation(
                    "an automation server must be provided when no targets are configured",
                ));
            }
            return Ok(());
        }

        let mut seen = HashSet::new();
        let mut defaults = 0usize;
        for target in &mut self.targets {
            target.name = target.name.trim().to_string();
            if target.name.is_empty() {
                return Err(RegistryError::validation("target names must not be empty"));
            }
            if !seen.insert(target.name.clone()) {
                return Err(RegistryError::validation(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            let server = target
                .server
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| self.server.clone());
            let Some(server) = server else {
                return Err(RegistryError::validation(format!(
                    "target '{}' is missing an automation server",
                    target.name
                )));
            };
            target.server = Some(server);
            if target.default {
                defaults += 1;
            }
        }
        if defaults > 1 {
            return Err(RegistryError::validation(
                "at most one target may be marked as default",
            ));
        }
        Ok(())
    }

    /// Name shared by every task enqueued from this definition.
    pub fn task_name(&self) -> String {
        self.tasks
            .iter()
            .find(|t| !t.skip)
            .or_else(|| self.tasks.first())
            .map(|t| t.name.clone())
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Targets the run will coordinate. Without explicit targets a single implicit
    /// target named after the platform is derived from `server`/`platform`.
    pub fn resolved_targets(&self) -> Vec<TargetConfig> {
        if !self.targets.is_empty() {
            return self.targets.clone();
        }
        match (self.platform, self.server.as_ref()) {
            (Some(platform), Some(server)) => {
                let mut target = TargetConfig::new(platform.as_str(), platform, server.clone());
                target.default = true;
                vec![target]
            }
            _ => Vec::new(),
        }
    }
}

/// A queued unit of work. Mutated only by its owning worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub definition: TaskDefinition,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl Task {
    pub fn new(task_id: String, definition: TaskDefinition, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            task_name: definition.task_name(),
            owner,
            definition,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            summary: None,
        }
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        StateTransition::validate_status(self.status, next)?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves the task to its terminal status and attaches the summary.
    pub fn finish(&mut self, summary: Summary) -> Result<(), TransitionError> {
        self.transition(summary.status)?;
        self.summary = Some(summary);
        Ok(())
    }
}
