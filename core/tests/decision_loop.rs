mod common;

use std::time::Duration;

use autoprobe_core::api::{
    run_task, ActionKind, DriverError, EngineConfig, InferenceMode, RunError,
    RunInput, RunOutcome, TaskDefinition, TaskSpec, TaskStatus,
};
use common::{
    android_definition, android_login_screen, engine, engine_with, FakeDriver, ScriptedInference,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const TAP_LOGIN: &str =
    r#"{"action": "tap", "selector": "//android.widget.Button[@text='Login']", "explanation": "tap login"}"#;
const FINISH: &str = r#"{"action": "finish", "explanation": "logged in"}"#;

fn input(definition: TaskDefinition) -> RunInput {
    RunInput {
        task_id: "t1".to_string(),
        task_name: definition.task_name(),
        definition,
        cancel: CancellationToken::new(),
        on_step: None,
    }
}

fn kinds(outcome: &RunOutcome) -> Vec<ActionKind> {
    outcome.steps.iter().map(|s| s.action.kind()).collect()
}

#[tokio::test]
async fn text_mode_run_taps_and_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([TAP_LOGIN, FINISH]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference.clone(), driver.clone());
    let spec = TaskSpec::new("login", "Tap the login button");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.error, None);
    assert_eq!(kinds(&outcome), vec![ActionKind::Tap, ActionKind::Finish]);
    let indices: Vec<_> = outcome.steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(outcome.steps.iter().all(|s| s.outcome.success));
    assert_eq!(outcome.steps[1].outcome.message, "logged in");

    let requests = inference.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.mode == InferenceMode::Text));
    assert!(requests.iter().all(|r| r.screenshot.is_none()));
    assert!(requests[0].prompt.contains("Tap the login button"));
    assert!(requests[1].prompt.contains("# History of Actions"));
    assert_eq!(inference.description_calls(), 0);

    let performed = driver.performed();
    assert_eq!(performed.len(), 1);
    assert_eq!(performed[0].target, "android");
    assert_eq!(driver.disconnected(), vec!["android".to_string()]);
}

#[tokio::test]
async fn visual_task_uses_vision_mode() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([FINISH]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference.clone(), driver);
    let spec = TaskSpec::new("branding", "Check that the login icon colour is blue");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    let requests = inference.requests();
    assert_eq!(requests[0].mode, InferenceMode::Vision);
    assert!(requests[0].screenshot.is_some());
    assert!(requests[0].prompt.contains("a login form"));
    assert_eq!(inference.description_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn long_wait_keeps_parse_retry_available() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([
        r#"{"action": "wait", "timeout": 5000}"#,
        "I think the page is still loading",
        FINISH,
    ]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference.clone(), driver);
    let spec = TaskSpec::new("splash", "Wait for the splash screen to go away");

    let started = tokio::time::Instant::now();
    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(kinds(&outcome), vec![ActionKind::Wait, ActionKind::Finish]);
    assert_eq!(outcome.steps[0].outcome.message, "waited 5000ms");

    let requests = inference.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].prompt.contains("# Correction"));
}

#[tokio::test]
async fn malformed_output_beyond_retry_budget_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new(["no idea", "still no idea", FINISH]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference.clone(), driver);
    let spec = TaskSpec::new("login", "Log in");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Error);
    assert!(matches!(
        outcome.error,
        Some(RunError::Parse { attempts: 2, .. })
    ));
    assert_eq!(kinds(&outcome), vec![ActionKind::Error]);
    assert!(!outcome.steps[0].outcome.success);
    assert_eq!(inference.requests().len(), 2);
}

#[tokio::test]
async fn step_budget_ends_the_run_with_a_closing_error_step() {
    let dir = tempfile::tempdir().unwrap();
    let wait = r#"{"action": "wait", "timeout": 1}"#;
    let inference = ScriptedInference::new([wait, wait, wait]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let config = EngineConfig {
        max_steps: 2,
        ..EngineConfig::default()
    };
    let ctx = engine_with(inference, driver, config);
    let spec = TaskSpec::new("loop", "Keep waiting");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Error);
    assert_eq!(
        outcome.error,
        Some(RunError::MaxStepsExceeded { max_steps: 2 })
    );
    assert_eq!(
        kinds(&outcome),
        vec![ActionKind::Wait, ActionKind::Wait, ActionKind::Error]
    );
}

#[tokio::test]
async fn lost_session_is_fatal_and_sessions_are_closed() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([TAP_LOGIN, FINISH]);
    let driver = FakeDriver::new()
        .with_screen("android", android_login_screen())
        .failing("android", DriverError::SessionLost("invalid session id".into()));
    let ctx = engine(inference, driver.clone());
    let spec = TaskSpec::new("login", "Log in");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Error);
    assert!(matches!(
        outcome.error,
        Some(RunError::SessionLost { ref target, .. }) if target == "android"
    ));
    assert_eq!(kinds(&outcome), vec![ActionKind::Tap, ActionKind::Error]);
    assert!(outcome.steps.iter().all(|s| !s.outcome.success));
    assert_eq!(driver.disconnected(), vec!["android".to_string()]);
}

#[tokio::test]
async fn unresolvable_selector_is_recorded_and_the_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([
        r#"{"action": "tap", "selector": "//android.widget.Button[@text='Sign up']"}"#,
        FINISH,
    ]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference, driver.clone());
    let spec = TaskSpec::new("signup", "Open the sign up form");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert!(!outcome.steps[0].outcome.success);
    assert!(outcome.steps[0]
        .outcome
        .message
        .contains("selector unresolvable"));
    assert!(driver.performed().is_empty());
}

#[tokio::test]
async fn model_reported_error_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([
        r#"{"action": "error", "explanation": "the app crashed"}"#,
    ]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference, driver);
    let spec = TaskSpec::new("login", "Log in");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Error);
    assert_eq!(
        outcome.error,
        Some(RunError::Reported("the app crashed".to_string()))
    );
    assert_eq!(outcome.steps.len(), 1);
}

#[tokio::test]
async fn scripted_steps_bypass_inference() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new(Vec::<String>::new());
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference.clone(), driver.clone());
    let mut spec = TaskSpec::new("login", "Log in");
    spec.steps = vec![
        serde_json::json!({"action": "input", "xpath": "//android.widget.EditText[@resource-id='com.example:id/user']", "value": "alice"}),
        serde_json::from_str(TAP_LOGIN).unwrap(),
    ];

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert!(inference.requests().is_empty());
    let performed: Vec<_> = driver.performed().into_iter().map(|p| p.action.kind()).collect();
    assert_eq!(performed, vec![ActionKind::Input, ActionKind::Tap]);
}

#[tokio::test]
async fn cancelled_run_stops_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([FINISH]);
    let driver = FakeDriver::new();
    let ctx = engine(inference.clone(), driver);
    let run = input(android_definition(dir.path(), TaskSpec::new("login", "Log in")));
    run.cancel.cancel();

    let outcome = run_task(&ctx, run).await;

    assert_eq!(outcome.status, TaskStatus::Error);
    assert!(outcome.is_cancelled());
    assert!(outcome.steps.is_empty());
    assert!(inference.requests().is_empty());
}

#[tokio::test]
async fn artifacts_are_written_per_step() {
    let dir = tempfile::tempdir().unwrap();
    let inference = ScriptedInference::new([TAP_LOGIN, FINISH]);
    let driver = FakeDriver::new().with_screen("android", android_login_screen());
    let ctx = engine(inference, driver);
    let spec = TaskSpec::new("login", "Log in");

    let outcome = run_task(&ctx, input(android_definition(dir.path(), spec))).await;

    let reports = dir.path().join("login").join("t1");
    assert_eq!(
        outcome.reports_path.as_deref(),
        Some(reports.to_string_lossy().replace('\\', "/").as_str())
    );
    for name in [
        "task.json",
        "summary.json",
        "step0.json",
        "step0.xml",
        "step0.png",
        "step0_prompt.md",
        "step1.json",
    ] {
        assert!(reports.join(name).exists(), "missing {name}");
    }
    let step: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reports.join("step0.json")).unwrap())
            .unwrap();
    assert_eq!(step["action"]["action"], "tap");
    assert_eq!(step["screenshot"], "step0.png");
}
