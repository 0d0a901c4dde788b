//! Target sessions and the per-run coordinator that routes actions to them.

pub mod coordinator;
pub mod driver;
pub mod target;

pub use coordinator::SessionCoordinator;
pub use driver::{DriverClient, DriverSession};
pub use target::{ExecuteError, TargetSession};
