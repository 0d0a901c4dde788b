use tracing::{trace, warn};

use crate::state::{LoopPhase, StateTransition};

/// Tracks the decision-loop phase of one run and logs every change.
#[derive(Debug)]
pub struct PhaseTracker {
    task_id: String,
    phase: LoopPhase,
}

impl PhaseTracker {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase: LoopPhase::Capturing,
        }
    }

    pub fn enter(&mut self, next: LoopPhase) {
        if self.phase == next && next == LoopPhase::Capturing {
            return;
        }
        if let Err(e) = StateTransition::validate(self.phase, next) {
            warn!(target: "autoprobe.loop", task_id = %self.task_id, error = %e, "unexpected phase change");
        }
        trace!(target: "autoprobe.loop", task_id = %self.task_id, from = %self.phase, to = %next, "phase");
        self.phase = next;
    }

    /// Starts a new iteration. Terminal phases are not left again.
    pub fn restart(&mut self) {
        if !StateTransition::is_terminal(self.phase) {
            self.enter(LoopPhase::Capturing);
        }
    }
}
