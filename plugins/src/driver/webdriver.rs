//! W3C WebDriver client covering Appium (Android/iOS) and browser sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use autoprobe_core::api::{
    ActionRequest, DriverClient, DriverConfig, DriverError, DriverSession, Locator, Platform,
    Snapshot, TargetConfig,
};

use super::apps::resolve_app_id;
use super::hierarchy::{parse_dom, parse_hierarchy, DOM_SNAPSHOT_SCRIPT};
use super::url::{append_wd_hub, normalise_server};
use crate::http::{send_json, FailureKind, HttpError};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Error codes meaning the remote session is gone.
const SESSION_GONE: &[&str] = &["invalid session id", "no such window", "session not created"];

fn default_capabilities(platform: Platform) -> BTreeMap<String, Value> {
    let pairs: Vec<(&str, Value)> = match platform {
        Platform::Android => vec![
            ("platformName", json!("Android")),
            ("appium:automationName", json!("UiAutomator2")),
            ("appium:deviceName", json!("Android")),
            ("appium:language", json!("en")),
            ("appium:locale", json!("US")),
            ("appium:newCommandTimeout", json!(0)),
            ("appium:noReset", json!(true)),
        ],
        Platform::Ios => vec![
            ("platformName", json!("iOS")),
            ("appium:automationName", json!("XCUITest")),
            ("appium:deviceName", json!("iPhone")),
            ("appium:autoLaunch", json!(false)),
            ("appium:noReset", json!(true)),
        ],
        Platform::Web => vec![("browserName", json!("chrome"))],
    };
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Opens WebDriver sessions for every target platform.
pub struct WebDriverClient {
    http: reqwest::Client,
    config: DriverConfig,
}

impl WebDriverClient {
    pub fn new(config: DriverConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    /// Built-in defaults, then configured per-platform capabilities, then the target's own.
    pub fn capabilities(&self, target: &TargetConfig) -> BTreeMap<String, Value> {
        let configured = match target.platform {
            Platform::Android => &self.config.android_capabilities,
            Platform::Ios => &self.config.ios_capabilities,
            Platform::Web => &self.config.web_capabilities,
        };
        let mut caps = default_capabilities(target.platform);
        caps.extend(configured.iter().map(|(k, v)| (k.clone(), v.clone())));
        caps.extend(target.capabilities.iter().map(|(k, v)| (k.clone(), v.clone())));
        caps
    }

    fn server_for<'a>(&'a self, target: &'a TargetConfig) -> &'a str {
        match (&self.config.web_server, target.platform) {
            (Some(fixed), Platform::Web) if !fixed.trim().is_empty() => fixed.as_str(),
            _ => target.server(),
        }
    }

    async fn create_session(
        &self,
        base: &str,
        caps: &BTreeMap<String, Value>,
    ) -> Result<String, HttpError> {
        let url = format!("{base}/session");
        let body = json!({
            "capabilities": { "alwaysMatch": caps, "firstMatch": [{}] },
        });
        let value = send_json(self.http.post(&url).json(&body), &url).await?;
        value["value"]["sessionId"]
            .as_str()
            .or_else(|| value["sessionId"].as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                HttpError::rejected(200, &url, "response carries no sessionId", Some(value.clone()))
            })
    }
}

fn needs_wd_hub_retry(err: &HttpError) -> bool {
    err.status == Some(404)
        || err
            .message
            .to_ascii_lowercase()
            .contains("requested resource could not be found")
}

/// Maps an HTTP failure onto the driver error taxonomy.
fn classify(err: HttpError) -> DriverError {
    if let Some(code) = err.protocol_code() {
        let message = err
            .body
            .as_ref()
            .and_then(|b| b["value"]["message"].as_str())
            .unwrap_or(err.message.as_str());
        let detail = format!("{code}: {}", first_line(message));
        return if SESSION_GONE.contains(&code) {
            DriverError::SessionLost(detail)
        } else {
            DriverError::Execution(detail)
        };
    }
    match err.kind {
        FailureKind::Connect => DriverError::SessionLost(err.to_string()),
        FailureKind::Decode => DriverError::Protocol(err.to_string()),
        _ => DriverError::Execution(err.to_string()),
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

#[async_trait]
impl DriverClient for WebDriverClient {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn DriverSession>, DriverError> {
        let base = normalise_server(
            self.server_for(target),
            &self.config.default_scheme,
            self.config.force_tls,
        )?;
        let caps = self.capabilities(target);

        let (base, session_id) = match self.create_session(&base, &caps).await {
            Ok(id) => (base, id),
            Err(err) if needs_wd_hub_retry(&err) && append_wd_hub(&base) != base => {
                let fallback = append_wd_hub(&base);
                info!(target: "autoprobe.driver", target_name = %target.name, server = %fallback, "retrying session with /wd/hub base path");
                let id = self
                    .create_session(&fallback, &caps)
                    .await
                    .map_err(|e| DriverError::Connect(e.to_string()))?;
                (fallback, id)
            }
            Err(err) => return Err(DriverError::Connect(err.to_string())),
        };
        info!(
            target: "autoprobe.driver",
            target_name = %target.name,
            platform = %target.platform,
            server = %base,
            session_id = %session_id,
            "session created"
        );

        let session = WebDriverSession {
            http: self.http.clone(),
            session_url: format!("{base}/session/{session_id}"),
            name: target.name.clone(),
            platform: target.platform,
        };
        if self.config.implicit_wait_ms > 0 {
            let configured = session
                .command(
                    Method::POST,
                    "/timeouts",
                    Some(json!({ "implicit": self.config.implicit_wait_ms })),
                )
                .await;
            if let Err(e) = configured {
                // the caller never sees this session, so release it here
                let url = session.session_url.clone();
                if let Err(close) = send_json(self.http.delete(&url), &url).await {
                    warn!(target: "autoprobe.driver", target_name = %target.name, error = %close, "failed to release session");
                }
                return Err(e);
            }
        }
        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    http: reqwest::Client,
    session_url: String,
    name: String,
    platform: Platform,
}

impl WebDriverSession {
    /// Sends one command and returns the `value` member of the answer.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.session_url, path);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.json(&body);
        } else if method == Method::POST {
            req = req.json(&json!({}));
        }
        let mut value = send_json(req, &url).await.map_err(classify)?;
        debug!(target: "autoprobe.driver", target_name = %self.name, method = %method, path = %path, "command ok");
        Ok(value.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    async fn execute_script(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find_first(&self, selector: &str) -> Result<Option<String>, DriverError> {
        let found = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "xpath", "value": selector })),
            )
            .await?;
        Ok(found
            .as_array()
            .and_then(|items| items.first())
            .and_then(element_id))
    }

    async fn require(&self, selector: &str) -> Result<String, DriverError> {
        self.find_first(selector)
            .await?
            .ok_or_else(|| DriverError::Execution(format!("can't find element {selector}")))
    }

    async fn click(&self, element: &str) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{element}/click"), None)
            .await
            .map(drop)
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(drop)
    }

    /// Element holding input focus after a coordinate tap.
    async fn focused_element(&self) -> Result<Option<String>, DriverError> {
        if self.platform == Platform::Android {
            return self.find_first("//*[@focused='true']").await;
        }
        match self.command(Method::GET, "/element/active", None).await {
            Ok(value) => Ok(element_id(&value)),
            Err(DriverError::Execution(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn pointer_type(&self) -> &'static str {
        match self.platform {
            Platform::Web => "mouse",
            Platform::Android | Platform::Ios => "touch",
        }
    }

    async fn pointer(&self, steps: Value) -> Result<(), DriverError> {
        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": self.pointer_type() },
                "actions": steps,
            }],
        });
        self.command(Method::POST, "/actions", Some(body)).await?;
        self.command(Method::DELETE, "/actions", None).await.map(drop)
    }

    async fn tap_at(&self, (x, y): (i32, i32)) -> Result<(), DriverError> {
        self.pointer(json!([
            { "type": "pointerMove", "duration": 0, "x": x, "y": y },
            { "type": "pointerDown", "button": 0 },
            { "type": "pause", "duration": 100 },
            { "type": "pointerUp", "button": 0 },
        ]))
        .await
    }

    async fn swipe(
        &self,
        from: (i32, i32),
        to: (i32, i32),
        duration: u64,
    ) -> Result<(), DriverError> {
        self.pointer(json!([
            { "type": "pointerMove", "duration": 0, "x": from.0, "y": from.1 },
            { "type": "pointerDown", "button": 0 },
            { "type": "pointerMove", "duration": duration, "x": to.0, "y": to.1 },
            { "type": "pointerUp", "button": 0 },
        ]))
        .await
    }

    async fn app_command(&self, script: &str, app: &str) -> Result<(), DriverError> {
        let id = resolve_app_id(app, self.platform);
        self.execute_script(script, json!([{ "appId": id, "bundleId": id }]))
            .await
            .map(drop)
    }

    async fn tap(&self, locator: Option<Locator>) -> Result<(), DriverError> {
        match locator {
            Some(Locator::Selector(selector)) => {
                let element = self.require(&selector).await?;
                self.click(&element).await
            }
            Some(Locator::Bounds(bounds)) => self.tap_at(bounds.center()).await,
            None => Err(DriverError::Execution("action carries no locator".into())),
        }
    }

    async fn input(&self, locator: Option<Locator>, value: &str) -> Result<(), DriverError> {
        let element = match locator {
            Some(Locator::Selector(selector)) => {
                let element = self.require(&selector).await?;
                self.click(&element).await?;
                element
            }
            Some(Locator::Bounds(bounds)) => {
                self.tap_at(bounds.center()).await?;
                self.focused_element().await?.ok_or_else(|| {
                    DriverError::Execution(format!("can't find element in bounds {bounds}"))
                })?
            }
            None => return Err(DriverError::Execution("action carries no locator".into())),
        };
        self.send_keys(&element, value).await
    }
}

fn element_id(value: &Value) -> Option<String> {
    value[ELEMENT_KEY]
        .as_str()
        .or_else(|| value[LEGACY_ELEMENT_KEY].as_str())
        .map(str::to_string)
}

#[async_trait]
impl DriverSession for WebDriverSession {
    async fn capture(&mut self, with_screenshot: bool) -> Result<Snapshot, DriverError> {
        let source = self
            .command(Method::GET, "/source", None)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let root = match self.platform {
            Platform::Web => parse_dom(self.execute_script(DOM_SNAPSHOT_SCRIPT, json!([])).await?)?,
            Platform::Android | Platform::Ios => parse_hierarchy(&source, self.platform)?,
        };

        let mut snapshot = Snapshot::new(self.name.clone(), self.platform, root);
        snapshot.source = source;
        if with_screenshot {
            let encoded = self.command(Method::GET, "/screenshot", None).await?;
            let encoded = encoded.as_str().unwrap_or_default();
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(png) => snapshot.screenshot = Some(png),
                Err(e) => {
                    warn!(target: "autoprobe.driver", target_name = %self.name, error = %e, "screenshot is not valid base64")
                }
            }
        }
        Ok(snapshot)
    }

    async fn perform(&mut self, action: &ActionRequest) -> Result<String, DriverError> {
        match action {
            ActionRequest::Tap(_) | ActionRequest::Click(_) => self.tap(action.locator()).await?,
            ActionRequest::Input(el) => {
                self.input(action.locator(), el.value.as_deref().unwrap_or_default())
                    .await?
            }
            ActionRequest::Swipe(s) => {
                self.swipe((s.start_x, s.start_y), (s.end_x, s.end_y), s.duration)
                    .await?
            }
            ActionRequest::Navigate(nav) => {
                self.command(Method::POST, "/url", Some(json!({ "url": nav.url })))
                    .await?;
            }
            ActionRequest::ActivateApp(app) => {
                self.app_command("mobile: activateApp", &app.app).await?
            }
            ActionRequest::TerminateApp(app) => {
                self.app_command("mobile: terminateApp", &app.app).await?
            }
            ActionRequest::Wait(_) | ActionRequest::Finish(_) | ActionRequest::Error(_) => {}
        }
        Ok("success".to_string())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        let url = self.session_url.clone();
        send_json(self.http.delete(&url), &url)
            .await
            .map_err(classify)?;
        info!(target: "autoprobe.driver", target_name = %self.name, "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoprobe_core::api::{Bounds, ElementAction};
    use mockito::{Matcher, Server, ServerGuard};
    use pretty_assertions::assert_eq;

    const ANDROID_SOURCE: &str = r#"<hierarchy><android.widget.Button text="Login" resource-id="login" bounds="[0,0][100,50]"/></hierarchy>"#;

    async fn session_mock(server: &mut ServerGuard, path: &str) -> mockito::Mock {
        server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": {"sessionId": "s1", "capabilities": {}}}"#)
            .create_async()
            .await
    }

    fn client() -> WebDriverClient {
        WebDriverClient::new(DriverConfig::default()).unwrap()
    }

    fn android(server: &ServerGuard) -> TargetConfig {
        TargetConfig::new("phone", Platform::Android, server.url())
    }

    #[test]
    fn target_capabilities_override_defaults() {
        let mut target = TargetConfig::new("phone", Platform::Android, "127.0.0.1:4723");
        target
            .capabilities
            .insert("appium:deviceName".to_string(), json!("Pixel 8"));
        let mut config = DriverConfig::default();
        config
            .android_capabilities
            .insert("appium:udid".to_string(), json!("emulator-5554"));
        let caps = WebDriverClient::new(config).unwrap().capabilities(&target);
        assert_eq!(caps["platformName"], json!("Android"));
        assert_eq!(caps["appium:deviceName"], json!("Pixel 8"));
        assert_eq!(caps["appium:udid"], json!("emulator-5554"));
    }

    #[test]
    fn session_errors_are_classified() {
        let gone = HttpError::rejected(
            404,
            "u",
            "p",
            Some(json!({"value": {"error": "invalid session id", "message": "terminated\nstack"}})),
        );
        assert_eq!(
            classify(gone),
            DriverError::SessionLost("invalid session id: terminated".into())
        );
        let missing = HttpError::rejected(
            404,
            "u",
            "p",
            Some(json!({"value": {"error": "no such element", "message": "nope"}})),
        );
        assert!(!classify(missing).is_fatal());
    }

    #[tokio::test]
    async fn connect_retries_with_wd_hub_on_404() {
        let mut server = Server::new_async().await;
        let _root = server
            .mock("POST", "/session")
            .with_status(404)
            .with_body("The requested resource could not be found")
            .create_async()
            .await;
        let hub = session_mock(&mut server, "/wd/hub/session").await;

        let _session = client().connect(&android(&server)).await.unwrap();
        hub.assert_async().await;
    }

    #[tokio::test]
    async fn failed_timeouts_release_the_new_session() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let _timeouts = server
            .mock("POST", "/session/s1/timeouts")
            .with_status(500)
            .with_body(r#"{"value": {"error": "unknown error", "message": "boom"}}"#)
            .create_async()
            .await;
        let release = server
            .mock("DELETE", "/session/s1")
            .with_status(200)
            .with_body(r#"{"value": null}"#)
            .create_async()
            .await;
        let config = DriverConfig {
            implicit_wait_ms: 500,
            ..DriverConfig::default()
        };

        let err = WebDriverClient::new(config)
            .unwrap()
            .connect(&android(&server))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Execution(_)));
        release.assert_async().await;
    }

    #[tokio::test]
    async fn capture_parses_source_and_screenshot() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let _src = server
            .mock("GET", "/session/s1/source")
            .with_status(200)
            .with_body(json!({ "value": ANDROID_SOURCE }).to_string())
            .create_async()
            .await;
        let _shot = server
            .mock("GET", "/session/s1/screenshot")
            .with_status(200)
            .with_body(r#"{"value": "iVBORw=="}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        let snapshot = session.capture(true).await.unwrap();
        assert_eq!(snapshot.target, "phone");
        assert_eq!(snapshot.root.children[0].attr("text"), Some("Login"));
        assert_eq!(snapshot.screenshot.as_deref(), Some(&[0x89, 0x50, 0x4e, 0x47][..]));
        assert!(snapshot.source.contains("android.widget.Button"));
    }

    #[tokio::test]
    async fn tap_by_selector_clicks_first_match() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let _find = server
            .mock("POST", "/session/s1/elements")
            .match_body(Matcher::PartialJson(json!({"using": "xpath", "value": "//*[@text='Login']"})))
            .with_status(200)
            .with_body(r#"{"value": [{"element-6066-11e4-a52e-4f735466cecf": "e1"}]}"#)
            .create_async()
            .await;
        let click = server
            .mock("POST", "/session/s1/element/e1/click")
            .with_status(200)
            .with_body(r#"{"value": null}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        let tap = ActionRequest::Tap(ElementAction {
            selector: Some("//*[@text='Login']".into()),
            ..ElementAction::default()
        });
        assert_eq!(session.perform(&tap).await.unwrap(), "success");
        click.assert_async().await;
    }

    #[tokio::test]
    async fn missing_element_is_not_fatal() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let _find = server
            .mock("POST", "/session/s1/elements")
            .with_status(200)
            .with_body(r#"{"value": []}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        let tap = ActionRequest::Tap(ElementAction {
            selector: Some("//*[@text='Gone']".into()),
            ..ElementAction::default()
        });
        let err = session.perform(&tap).await.unwrap_err();
        assert!(matches!(err, DriverError::Execution(ref m) if m.contains("can't find element")));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn bounds_tap_uses_pointer_actions() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let actions = server
            .mock("POST", "/session/s1/actions")
            .match_body(Matcher::Regex(r#""x":50,"y":25"#.to_string()))
            .with_status(200)
            .with_body(r#"{"value": null}"#)
            .create_async()
            .await;
        let _release = server
            .mock("DELETE", "/session/s1/actions")
            .with_status(200)
            .with_body(r#"{"value": null}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        let tap = ActionRequest::Tap(ElementAction {
            bounds: Some(Bounds::new(0, 0, 100, 50)),
            ..ElementAction::default()
        });
        session.perform(&tap).await.unwrap();
        actions.assert_async().await;
    }

    #[tokio::test]
    async fn lost_session_is_fatal() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let _src = server
            .mock("GET", "/session/s1/source")
            .with_status(404)
            .with_body(r#"{"value": {"error": "invalid session id", "message": "A session is either terminated or not started"}}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        let err = session.capture(false).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn activate_app_resolves_aliases() {
        let mut server = Server::new_async().await;
        let _s = session_mock(&mut server, "/session").await;
        let exec = server
            .mock("POST", "/session/s1/execute/sync")
            .match_body(Matcher::PartialJson(json!({
                "script": "mobile: activateApp",
                "args": [{"appId": "com.android.settings"}]
            })))
            .with_status(200)
            .with_body(r#"{"value": null}"#)
            .create_async()
            .await;

        let mut session = client().connect(&android(&server)).await.unwrap();
        session
            .perform(&ActionRequest::activate_app("settings"))
            .await
            .unwrap();
        exec.assert_async().await;
    }
}
