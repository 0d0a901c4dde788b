//! The closed set of actions a model (or a scripted step) may request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

use super::parse::extract_json_object;

/// Screen rectangle in device pixels, written as `[left,top][right,bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BoundsRepr", into = "String")]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundsRepr {
    Text(String),
    Quad([i32; 4]),
}

impl TryFrom<BoundsRepr> for Bounds {
    type Error = String;

    fn try_from(repr: BoundsRepr) -> Result<Self, Self::Error> {
        match repr {
            BoundsRepr::Text(s) => s.parse(),
            BoundsRepr::Quad([left, top, right, bottom]) => Ok(Bounds {
                left,
                top,
                right,
                bottom,
            }),
        }
    }
}

impl From<Bounds> for String {
    fn from(b: Bounds) -> Self {
        b.to_string()
    }
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + (self.right - self.left) / 2,
            self.top + (self.bottom - self.top) / 2,
        )
    }

    pub fn contains(&self, (x, y): (i32, i32)) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

impl FromStr for Bounds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nums: Vec<i32> = s
            .split(|c: char| !(c.is_ascii_digit() || c == '-'))
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<i32>().map_err(|e| format!("invalid bounds '{s}': {e}")))
            .collect::<Result<_, _>>()?;
        match nums.as_slice() {
            [left, top, right, bottom] => Ok(Bounds::new(*left, *top, *right, *bottom)),
            _ => Err(format!("invalid bounds '{s}': expected [l,t][r,b]")),
        }
    }
}

/// Routing metadata every action carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Platform hint used when no target name is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

/// Tap, click and input all address one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub route: Route,
}

fn default_swipe_duration() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeAction {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    #[serde(default = "default_swipe_duration")]
    pub duration: u64,
    #[serde(flatten)]
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    /// Milliseconds.
    pub timeout: u64,
    #[serde(flatten)]
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateAction {
    pub url: String,
    #[serde(flatten)]
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAction {
    pub app: String,
    #[serde(flatten)]
    pub route: Route,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAction {
    #[serde(flatten)]
    pub route: Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Tap,
    Click,
    Input,
    Swipe,
    Wait,
    Navigate,
    Error,
    Finish,
    ActivateApp,
    TerminateApp,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::Click => "click",
            ActionKind::Input => "input",
            ActionKind::Swipe => "swipe",
            ActionKind::Wait => "wait",
            ActionKind::Navigate => "navigate",
            ActionKind::Error => "error",
            ActionKind::Finish => "finish",
            ActionKind::ActivateApp => "activate_app",
            ActionKind::TerminateApp => "terminate_app",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const KNOWN_ACTIONS: &[&str] = &[
    "tap",
    "click",
    "input",
    "swipe",
    "wait",
    "navigate",
    "error",
    "finish",
    "activate_app",
    "terminate_app",
];

/// One decision. Serialized with the kind under the `action` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Tap(ElementAction),
    Click(ElementAction),
    Input(ElementAction),
    Swipe(SwipeAction),
    Wait(WaitAction),
    Navigate(NavigateAction),
    Error(ReportAction),
    Finish(ReportAction),
    ActivateApp(AppAction),
    TerminateApp(AppAction),
}

/// Resolved locator for an element action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Selector(String),
    Bounds(Bounds),
}

impl ActionRequest {
    /// Parses raw model output into one action.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Self::from_value(extract_json_object(raw)?)
    }

    /// Builds an action from a JSON object, accepting the legacy field names.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let Value::Object(mut obj) = value else {
            return Err(ParseError::NoJson);
        };
        let action = normalise(&mut obj)?;
        let request: ActionRequest =
            serde_json::from_value(Value::Object(obj)).map_err(|e| ParseError::InvalidFields {
                action: action.clone(),
                message: e.to_string(),
            })?;
        request.check().map_err(|message| ParseError::InvalidFields { action, message })?;
        Ok(request)
    }

    fn check(&self) -> Result<(), String> {
        match self {
            ActionRequest::Tap(el) | ActionRequest::Click(el) => {
                if el.selector.is_none() && el.bounds.is_none() {
                    return Err("either 'selector' or 'bounds' is required".into());
                }
            }
            ActionRequest::Input(el) => {
                if el.selector.is_none() && el.bounds.is_none() {
                    return Err("either 'selector' or 'bounds' is required".into());
                }
                if el.value.is_none() {
                    return Err("'value' is required".into());
                }
            }
            ActionRequest::Navigate(nav) if nav.url.trim().is_empty() => {
                return Err("'url' must not be empty".into());
            }
            ActionRequest::ActivateApp(app) | ActionRequest::TerminateApp(app)
                if app.app.trim().is_empty() =>
            {
                return Err("'app' must not be empty".into());
            }
            _ => {}
        }
        Ok(())
    }

    pub fn error(explanation: impl Into<String>) -> Self {
        ActionRequest::Error(ReportAction {
            route: Route {
                explanation: explanation.into(),
                ..Route::default()
            },
        })
    }

    pub fn wait(timeout_ms: u64) -> Self {
        ActionRequest::Wait(WaitAction {
            timeout: timeout_ms,
            route: Route::default(),
        })
    }

    pub fn activate_app(app: impl Into<String>) -> Self {
        ActionRequest::ActivateApp(AppAction {
            app: app.into(),
            route: Route::default(),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Tap(_) => ActionKind::Tap,
            ActionRequest::Click(_) => ActionKind::Click,
            ActionRequest::Input(_) => ActionKind::Input,
            ActionRequest::Swipe(_) => ActionKind::Swipe,
            ActionRequest::Wait(_) => ActionKind::Wait,
            ActionRequest::Navigate(_) => ActionKind::Navigate,
            ActionRequest::Error(_) => ActionKind::Error,
            ActionRequest::Finish(_) => ActionKind::Finish,
            ActionRequest::ActivateApp(_) => ActionKind::ActivateApp,
            ActionRequest::TerminateApp(_) => ActionKind::TerminateApp,
        }
    }

    pub fn route(&self) -> &Route {
        match self {
            ActionRequest::Tap(a) | ActionRequest::Click(a) | ActionRequest::Input(a) => &a.route,
            ActionRequest::Swipe(a) => &a.route,
            ActionRequest::Wait(a) => &a.route,
            ActionRequest::Navigate(a) => &a.route,
            ActionRequest::Error(a) | ActionRequest::Finish(a) => &a.route,
            ActionRequest::ActivateApp(a) | ActionRequest::TerminateApp(a) => &a.route,
        }
    }

    pub fn route_mut(&mut self) -> &mut Route {
        match self {
            ActionRequest::Tap(a) | ActionRequest::Click(a) | ActionRequest::Input(a) => {
                &mut a.route
            }
            ActionRequest::Swipe(a) => &mut a.route,
            ActionRequest::Wait(a) => &mut a.route,
            ActionRequest::Navigate(a) => &mut a.route,
            ActionRequest::Error(a) | ActionRequest::Finish(a) => &mut a.route,
            ActionRequest::ActivateApp(a) | ActionRequest::TerminateApp(a) => &mut a.route,
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.route().target.as_deref()
    }

    pub fn platform_hint(&self) -> Option<&str> {
        self.route().platform.as_deref()
    }

    /// `finish` and `error` end the scenario.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionRequest::Finish(_) | ActionRequest::Error(_))
    }

    pub fn element(&self) -> Option<&ElementAction> {
        match self {
            ActionRequest::Tap(a) | ActionRequest::Click(a) | ActionRequest::Input(a) => Some(a),
            _ => None,
        }
    }

    /// Replaces the locator so exactly one of selector and bounds is set.
    pub fn set_locator(&mut self, locator: Locator) {
        if let ActionRequest::Tap(a) | ActionRequest::Click(a) | ActionRequest::Input(a) = self {
            match locator {
                Locator::Selector(selector) => {
                    a.selector = Some(selector);
                    a.bounds = None;
                }
                Locator::Bounds(bounds) => {
                    a.selector = None;
                    a.bounds = Some(bounds);
                }
            }
        }
    }

    pub fn locator(&self) -> Option<Locator> {
        let el = self.element()?;
        match (&el.selector, el.bounds) {
            (Some(selector), _) => Some(Locator::Selector(selector.clone())),
            (None, Some(bounds)) => Some(Locator::Bounds(bounds)),
            (None, None) => None,
        }
    }
}

fn rename(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = obj.remove(from) {
        let absent = obj.get(to).map_or(true, Value::is_null);
        if absent && !v.is_null() {
            obj.insert(to.to_string(), v);
        }
    }
}

fn coerce_integer(obj: &mut Map<String, Value>, key: &str) {
    let Some(v) = obj.get(key) else {
        return;
    };
    let coerced = match v {
        Value::Number(n) if n.is_f64() => n.as_f64().map(|f| f.round() as i64),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    };
    if let Some(i) = coerced {
        obj.insert(key.to_string(), Value::from(i));
    }
}

/// Maps legacy and alternative field names onto the canonical shape and
/// returns the canonical action name.
fn normalise(obj: &mut Map<String, Value>) -> Result<String, ParseError> {
    let action = match obj.get("action") {
        Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
        Some(_) | None => return Err(ParseError::MissingAction),
    };
    let action = match action.as_str() {
        "activate" => "activate_app".to_string(),
        "terminate" => "terminate_app".to_string(),
        _ => action,
    };
    if !KNOWN_ACTIONS.contains(&action.as_str()) {
        return Err(ParseError::UnknownAction(action));
    }
    obj.insert("action".into(), Value::String(action.clone()));

    rename(obj, "xpath", "selector");
    rename(obj, "device", "target");
    rename(obj, "session", "target");
    rename(obj, "platformName", "platform");
    rename(obj, "platform_name", "platform");
    rename(obj, "swipe_start_x", "start_x");
    rename(obj, "swipe_start_y", "start_y");
    rename(obj, "swipe_end_x", "end_x");
    rename(obj, "swipe_end_y", "end_y");
    rename(obj, "bundleId", "app");
    rename(obj, "package", "app");
    rename(obj, "reason", "explanation");
    rename(obj, "message", "explanation");

    // recorded steps carry the execution result; it is not part of the request
    obj.remove("result");

    if let Some(Value::String(p)) = obj.get("platform") {
        let lowered = p.trim().to_ascii_lowercase();
        obj.insert("platform".into(), Value::String(lowered));
    }
    for key in ["start_x", "start_y", "end_x", "end_y", "duration", "timeout"] {
        coerce_integer(obj, key);
    }
    if let Some(Value::Number(n)) = obj.get("value") {
        let text = n.to_string();
        obj.insert("value".into(), Value::String(text));
    }
    obj.retain(|_, v| !v.is_null());

    Ok(action)
}
