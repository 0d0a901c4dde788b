use std::path::Path;

use anyhow::Context as _;

use autoprobe_core::api::{self, AppConfig, CliError, JobRegistry};
use autoprobe_plugins::factory;

/// Loaded configuration plus the in-process job registry.
pub struct AppContext {
    cfg: AppConfig,
    registry: JobRegistry,
}

impl AppContext {
    pub fn new(cfg: AppConfig) -> Result<Self, CliError> {
        let engine = factory::build_engine(&cfg).map_err(|e| CliError::Config(format!("{e:#}")))?;
        let store = factory::build_store(&cfg);
        let registry = JobRegistry::start(engine, store, cfg.registry.clone());
        Ok(Self { cfg, registry })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, CliError> {
    let loaded = match path {
        Some(path) => api::load_explicit(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => api::load_default(),
    };
    loaded.map_err(|e| CliError::Config(format!("{e:#}")))
}
