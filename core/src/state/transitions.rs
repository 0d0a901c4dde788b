//! Transition rules for loop phases and task status.

use super::types::LoopPhase;
use crate::model::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("cannot transition from terminal state {state}")]
    FromTerminalState { state: String },
}

pub struct StateTransition;

impl StateTransition {
    /// Validates a decision-loop phase change.
    pub fn validate(from: LoopPhase, to: LoopPhase) -> Result<(), TransitionError> {
        if Self::is_terminal(from) {
            return Err(TransitionError::FromTerminalState {
                state: from.to_string(),
            });
        }

        let is_valid = match (from, to) {
            (LoopPhase::Capturing, LoopPhase::Inferring) => true,
            (LoopPhase::Inferring, LoopPhase::Validating) => true,
            // malformed output is re-prompted
            (LoopPhase::Inferring, LoopPhase::Inferring) => true,
            (LoopPhase::Validating, LoopPhase::Executing) => true,
            // unresolvable selectors are recorded without executing
            (LoopPhase::Validating, LoopPhase::Recording) => true,
            (LoopPhase::Recording, LoopPhase::Capturing) => true,
            // scripted steps skip inference
            (LoopPhase::Capturing, LoopPhase::Validating) => true,
            // app activation at scenario start follows the previous step directly
            (LoopPhase::Recording, LoopPhase::Validating) => true,
            // any live phase may record, including the synthetic error step
            (_, LoopPhase::Recording) => true,
            (_, LoopPhase::Completed) | (_, LoopPhase::Failed) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Validates a task status change. Terminal statuses never change again.
    pub fn validate_status(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState {
                state: from.to_string(),
            });
        }
        let is_valid = matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Error)
                // cancelled or failed to start before a worker picked it up
                | (TaskStatus::Pending, TaskStatus::Error)
        );
        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn is_terminal(phase: LoopPhase) -> bool {
        matches!(phase, LoopPhase::Completed | LoopPhase::Failed)
    }
}
