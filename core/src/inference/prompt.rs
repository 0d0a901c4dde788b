//! User-message rendering for the decision model.

use serde_json::Value;

use crate::error::ParseError;
use crate::model::{Snapshot, Step, TargetConfig, TaskSpec};

pub struct PromptContext<'a> {
    pub spec: &'a TaskSpec,
    /// Steps already taken for this scenario, oldest first.
    pub history: &'a [Step],
    pub snapshot: &'a Snapshot,
    pub targets: &'a [TargetConfig],
    pub active_target: &'a str,
}

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(ctx: &PromptContext<'_>) -> String {
        let task = if ctx.spec.details.trim().is_empty() {
            ctx.spec.name.as_str()
        } else {
            ctx.spec.details.as_str()
        };
        let history: Vec<String> = ctx.history.iter().map(Self::history_line).collect();

        let mut sections = vec![
            format!("# Task \n {task}"),
            format!("# History of Actions \n {}", history.join("\n")),
            format!("# Source of Page \n ```yaml\n {} \n```", ctx.snapshot.outline()),
        ];
        if let Some(description) = ctx.snapshot.description.as_deref() {
            sections.push(format!("# Screen Description \n {description}"));
        }
        if !ctx.targets.is_empty() {
            let mut lines = vec!["# Available Targets".to_string()];
            for target in ctx.targets {
                lines.push(format!(
                    "- {}: platform={}, server={}",
                    target.name,
                    target.platform,
                    target.server()
                ));
            }
            lines.push(
                "When proposing an action JSON include a 'target' field to choose which device/session should execute it."
                    .to_string(),
            );
            lines.push("Omit the 'target' field to keep using the active context.".to_string());
            sections.push(lines.join("\n"));
        }
        sections.push(format!("# Active Target \n {}", ctx.active_target));
        sections.join("\n")
    }

    /// Appends a correction note after output that could not be parsed.
    pub fn with_correction(prompt: &str, raw: &str, error: &ParseError) -> String {
        format!(
            "{prompt}\n# Correction \n Your previous answer could not be used ({error}). \
             Reply with exactly one JSON object with an \"action\" field \
             (tap, click, input, swipe, wait, navigate, activate_app, terminate_app, error or finish).\n \
             Previous answer:\n ```\n{raw}\n```"
        )
    }

    /// The recorded action JSON with its execution result, as fed back to the model.
    pub fn history_line(step: &Step) -> String {
        let mut value = serde_json::to_value(&step.action).unwrap_or(Value::Null);
        if let Value::Object(obj) = &mut value {
            obj.insert("target".into(), Value::String(step.target.clone()));
            obj.insert("result".into(), Value::String(step.outcome.message.clone()));
        }
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionRequest, Platform, Report, StepOutcome, UiElement};

    #[test]
    fn prompt_has_all_sections_in_order() {
        let spec = TaskSpec::new("login", "log in as admin");
        let mut report = Report::new();
        report.append(
            "login",
            "phone",
            ActionRequest::wait(100),
            StepOutcome::success(),
            None,
        );
        let mut snapshot = Snapshot::new("phone", Platform::Android, UiElement::new("hierarchy"));
        snapshot.description = Some("a login form".into());
        let targets = vec![TargetConfig::new("phone", Platform::Android, "http://localhost:4723")];
        let prompt = PromptBuilder::build(&PromptContext {
            spec: &spec,
            history: report.steps(),
            snapshot: &snapshot,
            targets: &targets,
            active_target: "phone",
        });

        let order = [
            "# Task",
            "# History of Actions",
            "# Source of Page",
            "# Screen Description",
            "# Available Targets",
            "# Active Target",
        ];
        let positions: Vec<usize> = order.iter().map(|s| prompt.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains(r#""result":"success""#));
        assert!(prompt.contains("- phone: platform=android, server=http://localhost:4723"));
    }
}
