//! Data model shared by the registry, the decision loop and the plugins.

pub mod action;
pub mod parse;
pub mod report;
pub mod snapshot;
pub mod task;

pub use action::{ActionKind, ActionRequest, Bounds, ElementAction, Locator, Route};
pub use parse::extract_json_object;
pub use report::{artifact_stem, normalise_target_name, Report, Step, StepOutcome, Summary};
pub use snapshot::{Snapshot, UiElement};
pub use task::{LlmMode, Platform, TargetConfig, Task, TaskDefinition, TaskSpec, TaskStatus};
