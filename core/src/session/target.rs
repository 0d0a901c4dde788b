use crate::error::{DriverError, StepError};
use crate::model::{ActionRequest, Platform, Snapshot, TargetConfig};

use super::driver::DriverSession;

/// Why an action could not be carried out on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// Rejected before reaching the driver.
    Rejected(StepError),
    Driver(DriverError),
}

impl From<DriverError> for ExecuteError {
    fn from(err: DriverError) -> Self {
        ExecuteError::Driver(err)
    }
}

/// Owns exactly one driver connection and the last snapshot captured through it.
pub struct TargetSession {
    config: TargetConfig,
    handle: Box<dyn DriverSession>,
    last_snapshot: Option<Snapshot>,
    closed: bool,
}

impl TargetSession {
    pub fn new(config: TargetConfig, handle: Box<dyn DriverSession>) -> Self {
        Self {
            config,
            handle,
            last_snapshot: None,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub async fn capture(&mut self, with_screenshot: bool) -> Result<&Snapshot, DriverError> {
        let mut snapshot = self.handle.capture(with_screenshot).await?;
        snapshot.target = self.config.name.clone();
        Ok(self.last_snapshot.insert(snapshot))
    }

    /// Attaches a screen description to the last snapshot.
    pub fn describe_last(&mut self, description: Option<String>) {
        if let Some(snapshot) = self.last_snapshot.as_mut() {
            snapshot.description = description;
        }
    }

    /// Executes an action after applying the platform routing rules:
    /// `tap` becomes `click` on web, `navigate` is web-only and app actions are mobile-only.
    pub async fn execute(&mut self, action: &ActionRequest) -> Result<String, ExecuteError> {
        let platform = self.config.platform;
        let routed = match action {
            ActionRequest::Tap(el) if platform == Platform::Web => ActionRequest::Click(el.clone()),
            ActionRequest::Navigate(_) if platform != Platform::Web => {
                return Err(ExecuteError::Rejected(StepError::Unsupported(format!(
                    "navigate is only available on web targets, '{}' is {platform}",
                    self.config.name
                ))));
            }
            ActionRequest::ActivateApp(_) | ActionRequest::TerminateApp(_)
                if platform == Platform::Web =>
            {
                return Err(ExecuteError::Rejected(StepError::Unsupported(format!(
                    "{} is only available on mobile targets",
                    action.kind()
                ))));
            }
            ActionRequest::Wait(_) | ActionRequest::Finish(_) | ActionRequest::Error(_) => {
                return Ok("success".to_string());
            }
            other => other.clone(),
        };
        Ok(self.handle.perform(&routed).await?)
    }

    pub async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.handle.disconnect().await
    }
}
