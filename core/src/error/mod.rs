#[allow(clippy::module_inception)]
pub mod error;
pub mod registry;

pub use error::{CliError, DriverError, InferenceError, ParseError, RunError, StepError};
pub use registry::RegistryError;
