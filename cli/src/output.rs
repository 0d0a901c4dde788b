//! Text rendering for command output. `--json` bypasses this module.

use std::fmt::Write as _;

use autoprobe_core::api::{Summary, Task, TaskGroups};

pub fn short_id(task_id: &str) -> &str {
    task_id.get(..8).unwrap_or(task_id)
}

pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}: {} ({} steps)",
        summary.task_name,
        summary.task_id,
        summary.status,
        summary.steps.len()
    );
    for step in &summary.steps {
        let mark = if step.outcome.success { "ok" } else { "FAILED" };
        let _ = writeln!(
            out,
            "  #{:<3} [{}] {:<13} {:<6} {}",
            step.index,
            step.target,
            step.action.kind().as_str(),
            mark,
            step.outcome.message
        );
    }
    if let Some(path) = &summary.reports_path {
        let _ = writeln!(out, "  reports: {path}");
    }
    if let Some(error) = &summary.error {
        let _ = writeln!(out, "  error: {error}");
    }
    out
}

fn render_task_line(out: &mut String, task: &Task) {
    let _ = writeln!(
        out,
        "  {}  {:<24} {}",
        short_id(&task.task_id),
        task.task_name,
        task.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

pub fn render_groups(groups: &TaskGroups) -> String {
    if groups.is_empty() {
        return "no tasks\n".to_string();
    }
    let mut out = String::new();
    for (label, tasks) in [
        ("pending", &groups.pending),
        ("running", &groups.running),
        ("completed", &groups.completed),
        ("error", &groups.error),
    ] {
        if tasks.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{label} ({})", tasks.len());
        for task in tasks {
            render_task_line(&mut out, task);
        }
    }
    out
}

/// One progress line for a recorded step, prefixed by the short task id.
pub fn render_progress(
    task_id: &str,
    index: usize,
    action: &str,
    success: bool,
    message: &str,
) -> String {
    let mark = if success { "ok" } else { "FAILED" };
    format!("[{}] step {index} {action} {mark}: {message}", short_id(task_id))
}
