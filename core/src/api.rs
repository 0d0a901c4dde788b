//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `autoprobe_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_explicit, load_from_path, AppConfig, DriverConfig, EngineConfig,
    InferenceConfig, LoggingConfig, RegistryConfig, StorageConfig,
};
pub use crate::engine::{run_task, EngineContext, RunInput, RunOutcome, StepObserver};
pub use crate::error::{
    CliError, DriverError, InferenceError, ParseError, RegistryError, RunError, StepError,
};
pub use crate::inference::{DecisionRequest, InferenceClient, InferenceMode};
pub use crate::model::{
    ActionKind, ActionRequest, Bounds, ElementAction, LlmMode, Locator, Platform, Snapshot, Step, StepOutcome,
    Summary, TargetConfig, Task, TaskDefinition, TaskSpec, TaskStatus, UiElement,
};
pub use crate::registry::{
    JobRegistry, MemoryTaskStore, StoredDefinition, TaskEvent, TaskGroups, TaskStore,
};
pub use crate::session::{DriverClient, DriverSession};
