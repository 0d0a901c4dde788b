use serde::{Deserialize, Serialize};

use crate::model::TaskStatus;

/// Lifecycle notifications broadcast by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued {
        task_id: String,
        task_name: String,
    },
    Started {
        task_id: String,
    },
    StepRecorded {
        task_id: String,
        index: usize,
        action: String,
        success: bool,
        message: String,
    },
    Finished {
        task_id: String,
        status: TaskStatus,
    },
    Deleted {
        task_id: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Queued { task_id, .. }
            | TaskEvent::Started { task_id }
            | TaskEvent::StepRecorded { task_id, .. }
            | TaskEvent::Finished { task_id, .. }
            | TaskEvent::Deleted { task_id } => task_id,
        }
    }
}
