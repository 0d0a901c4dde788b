use async_trait::async_trait;

use crate::error::DriverError;
use crate::model::{ActionRequest, Snapshot, TargetConfig};

/// One live automation session (a device or a browser).
#[async_trait]
pub trait DriverSession: Send {
    /// Captures the UI hierarchy, plus a screenshot when `with_screenshot` is set.
    async fn capture(&mut self, with_screenshot: bool) -> Result<Snapshot, DriverError>;
    /// Performs one action with an already validated locator and returns a short result message.
    async fn perform(&mut self, action: &ActionRequest) -> Result<String, DriverError>;
    async fn disconnect(&mut self) -> Result<(), DriverError>;
}

/// Opens sessions against automation servers.
#[async_trait]
pub trait DriverClient: Send + Sync {
    fn name(&self) -> &str;
    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn DriverSession>, DriverError>;
}
