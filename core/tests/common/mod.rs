#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autoprobe_core::api::{
    ActionRequest, Bounds, DecisionRequest, DriverClient, DriverError, DriverSession,
    EngineConfig, EngineContext, InferenceClient, InferenceError, Platform, Snapshot,
    TargetConfig, TaskDefinition, TaskSpec, UiElement,
};

/// Inference double that replays queued raw responses.
#[derive(Default)]
pub struct ScriptedInference {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<DecisionRequest>>,
    descriptions: Mutex<usize>,
}

impl ScriptedInference {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn description_calls(&self) -> usize {
        *self.descriptions.lock().unwrap()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<String, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InferenceError::EmptyResponse)
    }

    async fn describe_screen(&self, _png: &[u8]) -> Result<Option<String>, InferenceError> {
        *self.descriptions.lock().unwrap() += 1;
        Ok(Some("a login form".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Performed {
    pub target: String,
    pub action: ActionRequest,
}

#[derive(Default)]
struct FakeState {
    screens: HashMap<String, UiElement>,
    failures: HashMap<String, DriverError>,
    perform_delay: Option<Duration>,
    performed: Vec<Performed>,
    connected: Vec<String>,
    disconnected: Vec<String>,
}

/// Driver double serving a fixed UI tree per target and recording every action.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(self, target: &str, root: UiElement) -> Self {
        self.state
            .lock()
            .unwrap()
            .screens
            .insert(target.to_string(), root);
        self
    }

    /// Every `perform` on `target` fails with `err`.
    pub fn failing(self, target: &str, err: DriverError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(target.to_string(), err);
        self
    }

    /// Every `perform` is recorded at once but answers only after `delay`.
    pub fn slow(self, delay: Duration) -> Self {
        self.state.lock().unwrap().perform_delay = Some(delay);
        self
    }

    pub fn performed(&self) -> Vec<Performed> {
        self.state.lock().unwrap().performed.clone()
    }

    pub fn connected(&self) -> Vec<String> {
        self.state.lock().unwrap().connected.clone()
    }

    pub fn disconnected(&self) -> Vec<String> {
        self.state.lock().unwrap().disconnected.clone()
    }
}

struct FakeSession {
    config: TargetConfig,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl DriverSession for FakeSession {
    async fn capture(&mut self, with_screenshot: bool) -> Result<Snapshot, DriverError> {
        let root = self
            .state
            .lock()
            .unwrap()
            .screens
            .get(&self.config.name)
            .cloned()
            .unwrap_or_else(|| UiElement::new("hierarchy"));
        let source = format!("<{}/>", root.tag);
        let mut snapshot = Snapshot::new(self.config.name.clone(), self.config.platform, root);
        snapshot.source = source;
        if with_screenshot {
            snapshot.screenshot = Some(vec![0x89, b'P', b'N', b'G']);
        }
        Ok(snapshot)
    }

    async fn perform(&mut self, action: &ActionRequest) -> Result<String, DriverError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.failures.get(&self.config.name) {
                return Err(err.clone());
            }
            state.performed.push(Performed {
                target: self.config.name.clone(),
                action: action.clone(),
            });
            state.perform_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok("success".to_string())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        self.state
            .lock()
            .unwrap()
            .disconnected
            .push(self.config.name.clone());
        Ok(())
    }
}

#[async_trait]
impl DriverClient for FakeDriver {
    fn name(&self) -> &str {
        "fake"
    }

    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn DriverSession>, DriverError> {
        self.state
            .lock()
            .unwrap()
            .connected
            .push(target.name.clone());
        Ok(Box::new(FakeSession {
            config: target.clone(),
            state: self.state.clone(),
        }))
    }
}

pub fn engine(inference: Arc<ScriptedInference>, driver: FakeDriver) -> EngineContext {
    engine_with(inference, driver, EngineConfig::default())
}

pub fn engine_with(
    inference: Arc<ScriptedInference>,
    driver: FakeDriver,
    config: EngineConfig,
) -> EngineContext {
    EngineContext::new(inference, Arc::new(driver), config).unwrap()
}

pub fn android_login_screen() -> UiElement {
    UiElement::new("hierarchy").with_child(
        UiElement::new("android.widget.FrameLayout")
            .with_attr("package", "com.example")
            .with_bounds(Bounds::new(0, 0, 1080, 1920))
            .with_child(
                UiElement::new("android.widget.EditText")
                    .with_attr("resource-id", "com.example:id/user")
                    .with_bounds(Bounds::new(40, 200, 1040, 300)),
            )
            .with_child(
                UiElement::new("android.widget.Button")
                    .with_attr("resource-id", "com.example:id/login")
                    .with_attr("text", "Login")
                    .with_bounds(Bounds::new(40, 400, 1040, 500)),
            ),
    )
}

pub fn web_login_page() -> UiElement {
    UiElement::new("html").with_child(
        UiElement::new("body")
            .with_child(UiElement::new("input").with_attr("id", "email"))
            .with_child(UiElement::new("button").with_attr("text", "Login")),
    )
}

/// Single-target android definition writing its reports under `reports`.
pub fn android_definition(reports: &std::path::Path, spec: TaskSpec) -> TaskDefinition {
    let mut def = TaskDefinition::new("You are a mobile QA agent.", vec![spec]);
    def.platform = Some(Platform::Android);
    def.server = Some("http://127.0.0.1:4723".to_string());
    def.reports_folder = reports.to_string_lossy().into_owned();
    def
}

/// Phone + browser definition with the phone as default.
pub fn phone_and_browser_definition(reports: &std::path::Path, spec: TaskSpec) -> TaskDefinition {
    let mut phone = TargetConfig::new("phone", Platform::Android, "http://127.0.0.1:4723");
    phone.default = true;
    let browser = TargetConfig::new("browser", Platform::Web, "http://127.0.0.1:4444");
    let mut def = TaskDefinition::new("You are a QA agent.", vec![spec]);
    def.targets = vec![phone, browser];
    def.reports_folder = reports.to_string_lossy().into_owned();
    def
}
