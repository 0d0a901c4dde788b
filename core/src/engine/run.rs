use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DriverError, RunError, StepError};
use crate::inference::{
    resolve_mode, DecisionRequest, InferenceClient, InferenceMode, PromptBuilder, PromptContext,
};
use crate::model::{
    ActionRequest, Report, Snapshot, Step, StepOutcome, Summary, TaskDefinition, TaskSpec,
    TaskStatus,
};
use crate::report::ReportWriter;
use crate::selector::SelectorValidator;
use crate::session::{ExecuteError, SessionCoordinator};
use crate::state::LoopPhase;

use super::budget::{ParseBudget, StepBudget};
use super::phase::PhaseTracker;
use super::EngineContext;

/// Called after every recorded step.
pub type StepObserver = Arc<dyn Fn(&Step) + Send + Sync>;

pub struct RunInput {
    pub task_id: String,
    pub task_name: String,
    pub definition: TaskDefinition,
    /// Observed at the top of every iteration and during `wait`.
    pub cancel: CancellationToken,
    pub on_step: Option<StepObserver>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: TaskStatus,
    pub steps: Vec<Step>,
    pub error: Option<RunError>,
    pub reports_path: Option<String>,
}

impl RunOutcome {
    /// Outcome of a task cancelled before any step ran.
    pub fn cancelled() -> Self {
        Self {
            status: TaskStatus::Error,
            steps: Vec::new(),
            error: Some(RunError::Cancelled),
            reports_path: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(RunError::Cancelled))
    }

    pub fn summary(&self, task_id: &str, task_name: &str) -> Summary {
        Summary {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            status: self.status,
            steps: self.steps.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
            reports_path: self.reports_path.clone(),
            finished_at: Utc::now(),
        }
    }
}

/// Runs every scenario of a definition to completion, failure or cancellation.
/// All target sessions are closed before this returns, whatever the outcome.
pub async fn run_task(ctx: &EngineContext, input: RunInput) -> RunOutcome {
    let writer = ReportWriter::new(
        &input.definition.reports_folder,
        &input.task_name,
        &input.task_id,
    );
    writer.prepare().await;
    writer.write_task(&input.definition).await;

    let coordinator =
        match SessionCoordinator::new(ctx.driver.clone(), input.definition.resolved_targets()) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "autoprobe.loop", task_id = %input.task_id, error = %e, "run setup failed");
                let outcome = RunOutcome {
                    status: TaskStatus::Error,
                    steps: Vec::new(),
                    error: Some(e),
                    reports_path: writer.display_path(),
                };
                writer
                    .write_summary(&outcome.summary(&input.task_id, &input.task_name))
                    .await;
                return outcome;
            }
        };

    let client = if input.definition.debug {
        match &ctx.debug_inference {
            Some(client) => client.clone(),
            None => {
                warn!(target: "autoprobe.loop", task_id = %input.task_id, "debug requested but no console inference configured");
                ctx.inference.clone()
            }
        }
    } else {
        ctx.inference.clone()
    };

    let mut run = RunLoop {
        ctx,
        input: &input,
        client,
        coordinator,
        report: Report::new(),
        writer: writer.clone(),
        validator: SelectorValidator::new(ctx.config.selector_rewrites),
        phase: PhaseTracker::new(input.task_id.clone()),
    };

    let result = run.run().await;
    run.coordinator.close_all().await;

    let (status, error) = match result {
        Ok(()) => {
            run.phase.enter(LoopPhase::Completed);
            info!(target: "autoprobe.loop", task_id = %input.task_id, steps = run.report.len(), "run completed");
            (TaskStatus::Completed, None)
        }
        Err(e) => {
            run.phase.enter(LoopPhase::Failed);
            if e == RunError::Cancelled {
                info!(target: "autoprobe.loop", task_id = %input.task_id, "run cancelled");
            } else {
                warn!(target: "autoprobe.loop", task_id = %input.task_id, error = %e, "run failed");
            }
            (TaskStatus::Error, Some(e))
        }
    };

    let outcome = RunOutcome {
        status,
        steps: run.report.into_steps(),
        error,
        reports_path: writer.display_path(),
    };
    writer
        .write_summary(&outcome.summary(&input.task_id, &input.task_name))
        .await;
    outcome
}

struct Scenario<'s> {
    spec: &'s TaskSpec,
    mode: InferenceMode,
    /// Report index of the scenario's first step.
    start: usize,
}

struct LoopState {
    parse: ParseBudget,
    steps: StepBudget,
}

enum Flow {
    Continue,
    Finished,
    Failed(RunError),
}

struct IterationResult {
    state: LoopState,
    flow: Flow,
}

/// State captured at the start of an iteration.
struct Captured {
    snapshot: Snapshot,
    /// Screenshot artifact name.
    screenshot: Option<String>,
}

struct RunLoop<'a> {
    ctx: &'a EngineContext,
    input: &'a RunInput,
    client: Arc<dyn InferenceClient>,
    coordinator: SessionCoordinator,
    report: Report,
    writer: ReportWriter,
    validator: SelectorValidator,
    phase: PhaseTracker,
}

impl<'a> RunLoop<'a> {
    async fn run(&mut self) -> Result<(), RunError> {
        let input = self.input;
        info!(
            target: "autoprobe.loop",
            task_id = %input.task_id,
            scenarios = input.definition.tasks.len(),
            targets = self.coordinator.configs().len(),
            default_target = %self.coordinator.default_name(),
            "starting run"
        );
        for spec in &input.definition.tasks {
            if spec.skip {
                info!(target: "autoprobe.loop", task_id = %input.task_id, scenario = %spec.name, "skipping task");
                continue;
            }
            if input.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            self.run_scenario(spec).await?;
        }
        Ok(())
    }

    async fn run_scenario(&mut self, spec: &TaskSpec) -> Result<(), RunError> {
        let ctx = self.ctx;
        let mode = resolve_mode(self.input.definition.llm_mode, spec, &ctx.classifier);
        info!(
            target: "autoprobe.loop",
            task_id = %self.input.task_id,
            scenario = %spec.name,
            mode = %mode,
            keywords = ?ctx.classifier.matched(&spec.searchable_text()),
            "starting scenario"
        );

        if let Some(name) = spec.target.as_deref() {
            if let Err(e) = self.coordinator.switch(name) {
                warn!(
                    target: "autoprobe.loop",
                    task_id = %self.input.task_id,
                    error = %e,
                    current = %self.coordinator.current_name(),
                    "requested start target unavailable"
                );
            }
        }

        let scenario = Scenario {
            spec,
            mode,
            start: self.report.len(),
        };
        let mut state = LoopState {
            parse: ParseBudget::new(ctx.config.parse_retries),
            steps: StepBudget::new(ctx.config.max_steps),
        };

        for app in &spec.apps {
            state.steps.record();
            if let Flow::Failed(e) = self.apply(&scenario, ActionRequest::activate_app(app.clone()), None).await {
                return Err(e);
            }
        }

        if spec.steps.is_empty() {
            loop {
                let IterationResult { state: next, flow } =
                    self.iterate(&scenario, state, None).await;
                state = next;
                match flow {
                    Flow::Continue => {}
                    Flow::Finished => return Ok(()),
                    Flow::Failed(e) => return Err(e),
                }
            }
        }

        for raw in &spec.steps {
            let IterationResult { state: next, flow } =
                self.iterate(&scenario, state, Some(raw)).await;
            state = next;
            match flow {
                Flow::Continue => {}
                Flow::Finished => return Ok(()),
                Flow::Failed(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Capture, decide, validate, execute and record one step.
    async fn iterate(
        &mut self,
        scenario: &Scenario<'_>,
        mut state: LoopState,
        scripted: Option<&Value>,
    ) -> IterationResult {
        if self.input.cancel.is_cancelled() {
            return IterationResult {
                state,
                flow: Flow::Failed(RunError::Cancelled),
            };
        }
        let target = self.coordinator.current_name().to_string();
        if state.steps.exhausted() {
            let err = RunError::MaxStepsExceeded {
                max_steps: state.steps.max(),
            };
            self.record_terminal_error(scenario, &target, &err).await;
            return IterationResult {
                state,
                flow: Flow::Failed(err),
            };
        }

        self.phase.restart();
        let captured = match self.capture(&target, scenario.mode).await {
            Ok(c) => c,
            Err(e) => {
                let err = RunError::Capture {
                    target: target.clone(),
                    message: e.to_string(),
                };
                self.record_terminal_error(scenario, &target, &err).await;
                return IterationResult {
                    state,
                    flow: Flow::Failed(err),
                };
            }
        };

        let decided = match scripted {
            Some(raw) => ActionRequest::from_value(raw.clone()).map_err(|e| RunError::Parse {
                attempts: 1,
                message: e.to_string(),
            }),
            None => {
                self.phase.enter(LoopPhase::Inferring);
                self.decide(scenario, &captured, &mut state.parse).await
            }
        };
        let action = match decided {
            Ok(action) => action,
            Err(err) => {
                self.record_terminal_error(scenario, &target, &err).await;
                return IterationResult {
                    state,
                    flow: Flow::Failed(err),
                };
            }
        };

        state.parse = state.parse.reset();
        state.steps.record();
        let flow = self.apply(scenario, action, Some(&captured)).await;
        IterationResult { state, flow }
    }

    async fn capture(&mut self, name: &str, mode: InferenceMode) -> Result<Captured, DriverError> {
        let with_screenshot = mode == InferenceMode::Vision || self.ctx.config.capture_screenshots;
        let index = self.report.next_index();
        let multi_target = self.coordinator.is_multi_target();

        let session = self.coordinator.session(name).await?;
        let mut snapshot = session.capture(with_screenshot).await?.clone();
        if mode == InferenceMode::Vision {
            if let Some(png) = snapshot.screenshot.as_deref() {
                match self.client.describe_screen(png).await {
                    Ok(description) => snapshot.description = description,
                    Err(e) => {
                        warn!(target: "autoprobe.loop", task_id = %self.input.task_id, error = %e, "screen description failed")
                    }
                }
                session.describe_last(snapshot.description.clone());
            }
        }

        let screenshot = self
            .writer
            .write_snapshot(index, &snapshot, multi_target)
            .await;
        Ok(Captured {
            snapshot,
            screenshot,
        })
    }

    /// Asks the model for the next action, re-prompting on malformed output
    /// while the parse budget lasts.
    async fn decide(
        &mut self,
        scenario: &Scenario<'_>,
        captured: &Captured,
        budget: &mut ParseBudget,
    ) -> Result<ActionRequest, RunError> {
        let index = self.report.next_index();
        let prompt = PromptBuilder::build(&PromptContext {
            spec: scenario.spec,
            history: &self.report.steps()[scenario.start..],
            snapshot: &captured.snapshot,
            targets: self.coordinator.configs(),
            active_target: self.coordinator.current_name(),
        });
        self.writer.write_prompt(index, &prompt).await;

        let mut request = DecisionRequest {
            task_id: self.input.task_id.clone(),
            step: index,
            system_prompt: self.input.definition.prompt.clone(),
            prompt: prompt.clone(),
            mode: scenario.mode,
            screenshot: match scenario.mode {
                InferenceMode::Vision => captured.snapshot.screenshot.clone(),
                InferenceMode::Text => None,
            },
        };

        loop {
            let raw = self
                .client
                .decide(&request)
                .await
                .map_err(|e| RunError::Inference(e.to_string()))?;
            debug!(target: "autoprobe.loop", task_id = %self.input.task_id, step = index, raw = %raw, "model output");

            match ActionRequest::parse(&raw) {
                Ok(action) => return Ok(action),
                Err(e) => {
                    if !budget.try_consume() {
                        return Err(RunError::Parse {
                            attempts: budget.attempts(),
                            message: e.to_string(),
                        });
                    }
                    warn!(
                        target: "autoprobe.loop",
                        task_id = %self.input.task_id,
                        step = index,
                        error = %e,
                        "malformed model output, re-prompting"
                    );
                    request.prompt = PromptBuilder::with_correction(&prompt, &raw, &e);
                }
            }
        }
    }

    /// Routes, validates, executes and records one action.
    async fn apply(
        &mut self,
        scenario: &Scenario<'_>,
        mut action: ActionRequest,
        captured: Option<&Captured>,
    ) -> Flow {
        self.phase.enter(LoopPhase::Validating);
        let current = self.coordinator.current_name().to_string();
        let name = match self
            .coordinator
            .resolve_name(action.target(), action.platform_hint())
        {
            Ok(name) => name,
            Err(e) => {
                self.phase.enter(LoopPhase::Recording);
                self.record(scenario, &current, action, StepOutcome::failure(e.to_string()), None)
                    .await;
                return Flow::Continue;
            }
        };
        action.route_mut().target = Some(name.clone());
        let on_captured = captured.filter(|c| c.snapshot.target == name);
        let screenshot = on_captured.and_then(|c| c.screenshot.clone());

        match &action {
            ActionRequest::Finish(report) => {
                let message = non_empty_or(&report.route.explanation, "success");
                self.phase.enter(LoopPhase::Recording);
                self.record(scenario, &name, action, StepOutcome::success_with(message), screenshot)
                    .await;
                let _ = self.coordinator.switch(&name);
                return Flow::Finished;
            }
            ActionRequest::Error(report) => {
                let message = non_empty_or(&report.route.explanation, "model reported an error");
                self.phase.enter(LoopPhase::Recording);
                self.record(
                    scenario,
                    &name,
                    action,
                    StepOutcome::failure(message.clone()),
                    screenshot,
                )
                .await;
                return Flow::Failed(RunError::Reported(message));
            }
            ActionRequest::Wait(wait) => {
                let ms = wait.timeout.min(self.ctx.config.wait_cap_ms);
                self.phase.enter(LoopPhase::Executing);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = self.input.cancel.cancelled() => return Flow::Failed(RunError::Cancelled),
                }
                self.phase.enter(LoopPhase::Recording);
                self.record(
                    scenario,
                    &name,
                    action,
                    StepOutcome::success_with(format!("waited {ms}ms")),
                    screenshot,
                )
                .await;
                let _ = self.coordinator.switch(&name);
                return Flow::Continue;
            }
            _ => {}
        }

        if action.element().is_some() {
            let Some(platform) = self.coordinator.config(&name).map(|c| c.platform) else {
                let err = StepError::UnknownTarget(format!("unknown target '{name}'"));
                self.phase.enter(LoopPhase::Recording);
                self.record(scenario, &current, action, StepOutcome::failure(err.to_string()), None)
                    .await;
                return Flow::Continue;
            };

            let fresh;
            let snapshot: &Snapshot = match on_captured {
                Some(c) => &c.snapshot,
                None => match self.fresh_snapshot(&name).await {
                    Ok(s) => {
                        fresh = s;
                        &fresh
                    }
                    Err(e) => return self.driver_failure(scenario, &name, action, e).await,
                },
            };

            match self.validator.validate(platform, &action, snapshot) {
                Ok(Some(validation)) => {
                    if let Some(original) = &validation.rewritten_from {
                        debug!(
                            target: "autoprobe.loop",
                            task_id = %self.input.task_id,
                            from = %original,
                            to = ?validation.locator,
                            "selector rewritten"
                        );
                    }
                    action.set_locator(validation.locator);
                }
                Ok(None) => {}
                Err(e) => {
                    self.phase.enter(LoopPhase::Recording);
                    self.record(scenario, &name, action, StepOutcome::failure(e.to_string()), screenshot)
                        .await;
                    let _ = self.coordinator.switch(&name);
                    return Flow::Continue;
                }
            }
        }

        self.phase.enter(LoopPhase::Executing);
        let result = match self.coordinator.session(&name).await {
            Ok(session) => session.execute(&action).await,
            Err(e) => Err(ExecuteError::Driver(e)),
        };

        match result {
            Ok(message) => {
                self.phase.enter(LoopPhase::Recording);
                self.record(scenario, &name, action, StepOutcome::success_with(message), screenshot)
                    .await;
                let _ = self.coordinator.switch(&name);
                Flow::Continue
            }
            Err(ExecuteError::Rejected(e)) => {
                self.phase.enter(LoopPhase::Recording);
                self.record(scenario, &name, action, StepOutcome::failure(e.to_string()), screenshot)
                    .await;
                let _ = self.coordinator.switch(&name);
                Flow::Continue
            }
            Err(ExecuteError::Driver(e)) => self.driver_failure(scenario, &name, action, e).await,
        }
    }

    /// Records a failed driver call. Session-level failures end the run.
    async fn driver_failure(
        &mut self,
        scenario: &Scenario<'_>,
        name: &str,
        action: ActionRequest,
        err: DriverError,
    ) -> Flow {
        self.phase.enter(LoopPhase::Recording);
        let step_err = StepError::DriverExecution(err.to_string());
        self.record(scenario, name, action, StepOutcome::failure(step_err.to_string()), None)
            .await;
        if err.is_fatal() {
            let run_err = RunError::SessionLost {
                target: name.to_string(),
                message: err.to_string(),
            };
            self.record_terminal_error(scenario, name, &run_err).await;
            return Flow::Failed(run_err);
        }
        let _ = self.coordinator.switch(name);
        Flow::Continue
    }

    async fn fresh_snapshot(&mut self, name: &str) -> Result<Snapshot, DriverError> {
        let session = self.coordinator.session(name).await?;
        Ok(session.capture(false).await?.clone())
    }

    async fn record(
        &mut self,
        scenario: &Scenario<'_>,
        target: &str,
        action: ActionRequest,
        outcome: StepOutcome,
        screenshot: Option<String>,
    ) {
        let step = self
            .report
            .append(&scenario.spec.name, target, action, outcome, screenshot)
            .clone();
        info!(
            target: "autoprobe.loop",
            task_id = %self.input.task_id,
            step = step.index,
            action = %step.action.kind(),
            target_name = %step.target,
            success = step.outcome.success,
            "{}",
            step.outcome.message
        );
        self.writer.write_step(&step).await;
        if let Some(observer) = &self.input.on_step {
            observer(&step);
        }
    }

    /// Appends the synthetic `error` step that closes a failed run.
    async fn record_terminal_error(&mut self, scenario: &Scenario<'_>, target: &str, err: &RunError) {
        self.phase.enter(LoopPhase::Recording);
        let mut action = ActionRequest::error(err.to_string());
        action.route_mut().target = Some(target.to_string());
        self.record(scenario, target, action, StepOutcome::failure(err.to_string()), None)
            .await;
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
