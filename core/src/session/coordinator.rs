use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{DriverError, RunError, StepError};
use crate::model::TargetConfig;

use super::driver::DriverClient;
use super::target::TargetSession;

/// Owns every target session of one run.
///
/// Sessions are opened lazily on first use and closed together by
/// [`SessionCoordinator::close_all`]. The "current" target only lives here and
/// is never shared between runs.
pub struct SessionCoordinator {
    driver: Arc<dyn DriverClient>,
    configs: Vec<TargetConfig>,
    sessions: HashMap<String, TargetSession>,
    current: Option<String>,
    default: String,
}

impl SessionCoordinator {
    pub fn new(driver: Arc<dyn DriverClient>, configs: Vec<TargetConfig>) -> Result<Self, RunError> {
        let mut seen = HashSet::new();
        for config in &configs {
            if !seen.insert(config.name.as_str()) {
                return Err(RunError::Setup(format!(
                    "duplicate target name '{}'",
                    config.name
                )));
            }
        }
        let default = configs
            .iter()
            .find(|c| c.default)
            .or_else(|| configs.first())
            .map(|c| c.name.clone())
            .ok_or_else(|| RunError::Setup("no automation target configured".to_string()))?;
        Ok(Self {
            driver,
            configs,
            sessions: HashMap::new(),
            current: None,
            default,
        })
    }

    pub fn configs(&self) -> &[TargetConfig] {
        &self.configs
    }

    pub fn config(&self, name: &str) -> Option<&TargetConfig> {
        self.configs.iter().find(|c| c.name == name)
    }

    pub fn is_multi_target(&self) -> bool {
        self.configs.len() > 1
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Target used by actions that name neither a target nor a platform.
    pub fn current_name(&self) -> &str {
        self.current.as_deref().unwrap_or(&self.default)
    }

    /// Picks the target for an action: explicit name first, then the first
    /// target of the hinted platform, then the current target.
    pub fn resolve_name(&self, target: Option<&str>, platform: Option<&str>) -> Result<String, StepError> {
        if let Some(name) = target.map(str::trim).filter(|n| !n.is_empty()) {
            return self
                .config(name)
                .map(|c| c.name.clone())
                .ok_or_else(|| StepError::UnknownTarget(format!("unknown target '{name}'")));
        }
        if let Some(hint) = platform.map(str::trim).filter(|p| !p.is_empty()) {
            let hint = hint.to_ascii_lowercase();
            return self
                .configs
                .iter()
                .find(|c| c.platform.as_str() == hint)
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    StepError::UnknownTarget(format!("no target configured for platform '{hint}'"))
                });
        }
        Ok(self.current_name().to_string())
    }

    /// Makes `name` current for later actions without touching other sessions.
    pub fn switch(&mut self, name: &str) -> Result<(), StepError> {
        if self.config(name).is_none() {
            return Err(StepError::UnknownTarget(format!("unknown target '{name}'")));
        }
        if self.current_name() != name {
            debug!(target: "autoprobe.driver", from = %self.current_name(), to = %name, "switching current target");
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Returns the session for `name`, connecting on first reference.
    pub async fn session(&mut self, name: &str) -> Result<&mut TargetSession, DriverError> {
        if !self.sessions.contains_key(name) {
            let config = self
                .config(name)
                .cloned()
                .ok_or_else(|| DriverError::Connect(format!("unknown target '{name}'")))?;
            info!(
                target: "autoprobe.driver",
                target_name = %config.name,
                platform = %config.platform,
                server = %config.server(),
                driver = %self.driver.name(),
                "connecting target session"
            );
            let handle = self.driver.connect(&config).await?;
            self.sessions
                .insert(name.to_string(), TargetSession::new(config, handle));
        }
        self.sessions
            .get_mut(name)
            .ok_or_else(|| DriverError::Connect(format!("session '{name}' unavailable")))
    }

    /// Closes every open session. Failures are logged, never propagated.
    pub async fn close_all(&mut self) {
        for (name, mut session) in self.sessions.drain() {
            match session.close().await {
                Ok(()) => debug!(target: "autoprobe.driver", target_name = %name, "session closed"),
                Err(e) => {
                    warn!(target: "autoprobe.driver", target_name = %name, error = %e, "failed to close session")
                }
            }
        }
    }
}
