use thiserror::Error;

use super::registry::RegistryError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures that end a run. The task is moved to `error` with the rendered message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("model output could not be parsed after {attempts} attempt(s): {message}")]
    Parse { attempts: u32, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("session for target '{target}' was lost: {message}")]
    SessionLost { target: String, message: String },
    #[error("capture failed on target '{target}': {message}")]
    Capture { target: String, message: String },
    #[error("step budget of {max_steps} exhausted before the task finished")]
    MaxStepsExceeded { max_steps: usize },
    #[error("model reported an unrecoverable error: {0}")]
    Reported(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("run setup failed: {0}")]
    Setup(String),
}

/// Failures local to one step. They are written into the step record and the loop continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("selector unresolvable: {0}")]
    SelectorUnresolvable(String),
    #[error("driver execution failed: {0}")]
    DriverExecution(String),
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("unsupported action: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("session lost: {0}")]
    SessionLost(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Session-level failures abort the run; everything else is absorbed into the step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_) | Self::Connect(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("inference config error: {0}")]
    Config(String),
    #[error("model returned an empty response")]
    EmptyResponse,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing 'action' field")]
    MissingAction,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid '{action}' action: {message}")]
    InvalidFields { action: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_level_driver_errors_are_fatal() {
        assert!(DriverError::SessionLost("gone".into()).is_fatal());
        assert!(DriverError::Connect("refused".into()).is_fatal());
        assert!(!DriverError::Execution("no such element".into()).is_fatal());
        assert!(!DriverError::Protocol("bad json".into()).is_fatal());
    }

    #[test]
    fn run_error_messages_are_human_readable() {
        let err = RunError::MaxStepsExceeded { max_steps: 3 };
        assert_eq!(
            err.to_string(),
            "step budget of 3 exhausted before the task finished"
        );
    }
}
