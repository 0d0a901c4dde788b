use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use autoprobe_core::api::{
    AppConfig, DriverClient, EngineContext, InferenceClient, MemoryTaskStore, TaskStore,
};

use crate::driver::WebDriverClient;
use crate::inference::{ConsoleInference, OpenAiInference};
use crate::store::FileTaskStore;

pub fn build_inference(cfg: &AppConfig) -> Result<Arc<dyn InferenceClient>> {
    Ok(Arc::new(OpenAiInference::new(&cfg.inference)?))
}

/// Operator-driven client used for definitions with `debug` set.
pub fn build_debug_inference() -> Arc<dyn InferenceClient> {
    Arc::new(ConsoleInference::stdio())
}

pub fn build_driver(cfg: &AppConfig) -> Result<Arc<dyn DriverClient>> {
    Ok(Arc::new(WebDriverClient::new(cfg.driver.clone())?))
}

/// File-backed store when `storage.directory` is set, in-memory otherwise.
pub fn build_store(cfg: &AppConfig) -> Arc<dyn TaskStore> {
    match cfg.storage.directory.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => Arc::new(FileTaskStore::new(PathBuf::from(dir))),
        _ => Arc::new(MemoryTaskStore::new()),
    }
}

pub fn build_engine(cfg: &AppConfig) -> Result<EngineContext> {
    let engine = EngineContext::new(
        build_inference(cfg)?,
        build_driver(cfg)?,
        cfg.engine.clone(),
    )
    .context("failed to compile engine.vision_keywords")?;
    Ok(engine.with_debug_inference(build_debug_inference()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoprobe_core::api::{Task, TaskDefinition, TaskSpec};

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.inference.model = "gpt-test".to_string();
        cfg
    }

    #[test]
    fn engine_builds_from_defaults_with_a_model() {
        let engine = build_engine(&config()).unwrap();
        assert_eq!(engine.inference.name(), "openai");
        assert_eq!(engine.driver.name(), "webdriver");
        assert!(engine.debug_inference.is_some());
    }

    #[tokio::test]
    async fn storage_directory_selects_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.storage.directory = Some(dir.path().to_string_lossy().to_string());

        let def = TaskDefinition::new("p", vec![TaskSpec::new("login", "d")]);
        build_store(&cfg)
            .save_task(&Task::new("t1".into(), def, None))
            .await
            .unwrap();
        assert!(dir.path().join("tasks").join("t1.json").exists());
    }
}
