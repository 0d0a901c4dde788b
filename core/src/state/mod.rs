//! # State machines
//!
//! Phase bookkeeping for the decision loop and the task status lifecycle.
//! Task status only moves forward: `pending -> running -> {completed, error}`.

pub mod transitions;
pub mod types;

pub use transitions::{StateTransition, TransitionError};
pub use types::LoopPhase;
