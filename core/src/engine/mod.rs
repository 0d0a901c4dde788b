//! The per-run decision loop.
//!
//! One run executes every non-skipped scenario (task spec) of a definition in
//! order, sharing one [`SessionCoordinator`](crate::session::SessionCoordinator)
//! and one append-only report. Each iteration captures state, obtains the next
//! action (from the model or a scripted step), validates its locator, executes
//! it against the resolved target and records a step.

pub mod budget;
pub mod phase;
pub mod run;

pub use budget::{ParseBudget, StepBudget};
pub use phase::PhaseTracker;
pub use run::{run_task, RunInput, RunOutcome, StepObserver};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::inference::{InferenceClient, VisionClassifier};
use crate::session::DriverClient;

/// Collaborators and settings shared by every run.
#[derive(Clone)]
pub struct EngineContext {
    pub inference: Arc<dyn InferenceClient>,
    /// Used instead of `inference` for definitions with `debug` set.
    pub debug_inference: Option<Arc<dyn InferenceClient>>,
    pub driver: Arc<dyn DriverClient>,
    pub config: EngineConfig,
    pub classifier: VisionClassifier,
}

impl EngineContext {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        driver: Arc<dyn DriverClient>,
        config: EngineConfig,
    ) -> Result<Self, regex::Error> {
        let classifier = VisionClassifier::new(&config.vision_keywords)?;
        Ok(Self {
            inference,
            debug_inference: None,
            driver,
            config,
            classifier,
        })
    }

    pub fn with_debug_inference(mut self, client: Arc<dyn InferenceClient>) -> Self {
        self.debug_inference = Some(client);
        self
    }
}
