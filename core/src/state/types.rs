use serde::{Deserialize, Serialize};

/// Phase of one decision-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Capturing,
    Inferring,
    Validating,
    Executing,
    Recording,
    Completed,
    Failed,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Capturing => "capturing",
            LoopPhase::Inferring => "inferring",
            LoopPhase::Validating => "validating",
            LoopPhase::Executing => "executing",
            LoopPhase::Recording => "recording",
            LoopPhase::Completed => "completed",
            LoopPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
