//! Inference collaborator contract and prompt construction.

pub mod mode;
pub mod prompt;

pub use mode::{resolve_mode, InferenceMode, VisionClassifier, DEFAULT_VISION_KEYWORDS};
pub use prompt::{PromptBuilder, PromptContext};

use async_trait::async_trait;

use crate::error::InferenceError;

/// Everything the model needs to choose the next action.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub task_id: String,
    /// Index the resulting step will receive.
    pub step: usize,
    pub system_prompt: String,
    /// Rendered user message (task, history, page source, targets).
    pub prompt: String,
    pub mode: InferenceMode,
    /// Only populated in vision mode.
    pub screenshot: Option<Vec<u8>>,
}

/// Model service returning the raw text of the next decision.
///
/// Parsing happens in the decision loop so malformed output can be re-prompted.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, request: &DecisionRequest) -> Result<String, InferenceError>;

    /// Natural-language description of a screenshot, used in vision mode.
    async fn describe_screen(&self, _screenshot: &[u8]) -> Result<Option<String>, InferenceError> {
        Ok(None)
    }
}
