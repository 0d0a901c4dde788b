use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionRequest;
use super::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    pub message: String,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            message: "success".to_string(),
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One recorded iteration of the decision loop. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    /// Name of the task spec this step belongs to.
    pub scenario: String,
    pub target: String,
    pub action: ActionRequest,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only list of steps for one run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    steps: Vec<Step>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next appended step will receive.
    pub fn next_index(&self) -> usize {
        self.steps.len()
    }

    /// Appends a step. Its index is its position in the report.
    pub fn append(
        &mut self,
        scenario: &str,
        target: &str,
        action: ActionRequest,
        outcome: StepOutcome,
        screenshot: Option<String>,
    ) -> &Step {
        let step = Step {
            index: self.steps.len(),
            scenario: scenario.to_string(),
            target: target.to_string(),
            action,
            outcome,
            screenshot,
            recorded_at: Utc::now(),
        };
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

/// Final outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_path: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Filesystem-friendly form of a target name.
pub fn normalise_target_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut last_sep = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            cleaned.push(ch);
            last_sep = false;
        } else if !last_sep {
            cleaned.push('_');
            last_sep = true;
        }
    }
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "target".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `step{N}` for single-target runs, `step{N}_{target}` otherwise.
pub fn artifact_stem(index: usize, target: &str, multi_target: bool) -> String {
    if multi_target {
        format!("step{index}_{}", normalise_target_name(target))
    } else {
        format!("step{index}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_append_order() {
        let mut report = Report::new();
        for _ in 0..3 {
            report.append("s", "t", ActionRequest::wait(1), StepOutcome::success(), None);
        }
        let indices: Vec<_> = report.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.next_index(), 3);
    }

    #[test]
    fn artifact_names_carry_target_only_when_multi_target() {
        assert_eq!(artifact_stem(4, "phone", false), "step4");
        assert_eq!(artifact_stem(4, "my phone/1", true), "step4_my_phone_1");
        assert_eq!(normalise_target_name("***"), "target");
    }
}
