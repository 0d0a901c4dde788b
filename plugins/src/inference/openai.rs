use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};

use autoprobe_core::api::{DecisionRequest, InferenceClient, InferenceConfig, InferenceError};

use crate::http::{send_json, HttpError};

const DESCRIBE_PROMPT: &str = "Describe the visible screen of this application in a few \
sentences: the page or dialog shown, the main controls and any text that matters for testing.";

struct Endpoint {
    chat_url: String,
    api_key: String,
    model: String,
}

impl Endpoint {
    fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            chat_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiInference {
    http: reqwest::Client,
    decision: Endpoint,
    /// Describes screenshots in vision mode; absent when no vision model is set.
    vision: Option<Endpoint>,
}

impl OpenAiInference {
    pub fn new(cfg: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        let decision = Endpoint::new(&cfg.base_url, &cfg.api_key, &cfg.model);
        let vision = (!cfg.vision_model.trim().is_empty()).then(|| {
            Endpoint::new(
                cfg.vision_base_url.as_deref().unwrap_or(&cfg.base_url),
                cfg.vision_api_key.as_deref().unwrap_or(&cfg.api_key),
                &cfg.vision_model,
            )
        });
        Ok(Self {
            http,
            decision,
            vision,
        })
    }

    async fn complete(
        &self,
        endpoint: &Endpoint,
        messages: Value,
    ) -> Result<String, InferenceError> {
        if endpoint.model.trim().is_empty() {
            return Err(InferenceError::Config(
                "inference.model is not configured (set it in config.toml or OPENAI_MODEL)".into(),
            ));
        }
        let url = &endpoint.chat_url;
        let body = json!({
            "model": endpoint.model,
            "messages": messages,
            "temperature": 0,
        });
        let mut req = self.http.post(url).json(&body);
        if !endpoint.api_key.trim().is_empty() {
            req = req.bearer_auth(&endpoint.api_key);
        }
        let value = send_json(req, url).await.map_err(transport)?;
        tracing::debug!(target: "autoprobe.inference", url = %url, model = %endpoint.model, "chat completion");

        let content = message_content(&value);
        if content.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(content)
    }
}

fn transport(err: HttpError) -> InferenceError {
    InferenceError::Transport(err.to_string())
}

fn image_part(png: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(png);
    json!({
        "type": "image_url",
        "image_url": { "url": format!("data:image/png;base64,{encoded}") },
    })
}

/// Text of the first choice. Content may be a plain string or a list of parts.
fn message_content(response: &Value) -> String {
    let content = &response["choices"][0]["message"]["content"];
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[async_trait]
impl InferenceClient for OpenAiInference {
    fn name(&self) -> &str {
        "openai"
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<String, InferenceError> {
        let mut parts = vec![json!({ "type": "text", "text": request.prompt })];
        if let Some(png) = request.screenshot.as_deref() {
            parts.push(image_part(png));
        }
        let messages = json!([
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": parts },
        ]);
        tracing::debug!(
            target: "autoprobe.inference",
            task_id = %request.task_id,
            step = request.step,
            mode = %request.mode,
            prompt_len = request.prompt.len(),
            "requesting next action"
        );
        self.complete(&self.decision, messages).await
    }

    async fn describe_screen(&self, png: &[u8]) -> Result<Option<String>, InferenceError> {
        let Some(endpoint) = &self.vision else {
            return Ok(None);
        };
        let messages = json!([
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": DESCRIBE_PROMPT },
                    image_part(png),
                ],
            },
        ]);
        self.complete(endpoint, messages).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoprobe_core::api::InferenceMode;
    use mockito::{Matcher, Server};

    fn config(base_url: String) -> InferenceConfig {
        InferenceConfig {
            base_url,
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            ..InferenceConfig::default()
        }
    }

    fn request(screenshot: Option<Vec<u8>>) -> DecisionRequest {
        DecisionRequest {
            task_id: "t".to_string(),
            step: 0,
            system_prompt: "You are a QA agent.".to_string(),
            prompt: "# Task \n log in".to_string(),
            mode: if screenshot.is_some() {
                InferenceMode::Vision
            } else {
                InferenceMode::Text
            },
            screenshot,
        }
    }

    #[tokio::test]
    async fn missing_model_is_a_config_error() {
        let client = OpenAiInference::new(&InferenceConfig::default()).unwrap();
        let err = client.decide(&request(None)).await.unwrap_err();
        assert!(matches!(err, InferenceError::Config(msg) if msg.contains("inference.model")));
    }

    #[test]
    fn content_parts_are_joined() {
        let response = json!({"choices": [{"message": {"content": [{"type": "text", "text": "{\"action\":"}, {"type": "text", "text": "\"finish\"}"}]}}]});
        assert_eq!(message_content(&response), "{\"action\":\"finish\"}");
    }

    #[tokio::test]
    async fn decide_posts_chat_completion_with_image() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJsonString(r#"{"model": "gpt-test"}"#.to_string()),
                Matcher::Regex("data:image/png;base64,".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "{\"action\": \"finish\"}"}}]}"#)
            .create_async()
            .await;

        let client = OpenAiInference::new(&config(server.url())).unwrap();
        let raw = client.decide(&request(Some(vec![1, 2, 3]))).await.unwrap();
        assert_eq!(raw, r#"{"action": "finish"}"#);
    }

    #[tokio::test]
    async fn empty_content_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "  "}}]}"#)
            .create_async()
            .await;

        let client = OpenAiInference::new(&config(server.url())).unwrap();
        let err = client.decide(&request(None)).await.unwrap_err();
        assert_eq!(err, InferenceError::EmptyResponse);
    }

    #[tokio::test]
    async fn server_errors_are_transport_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = OpenAiInference::new(&config(server.url())).unwrap();
        let err = client.decide(&request(None)).await.unwrap_err();
        assert!(matches!(err, InferenceError::Transport(msg) if msg.contains("status=500")));
    }

    #[tokio::test]
    async fn description_needs_a_vision_model() {
        let client = OpenAiInference::new(&config("http://127.0.0.1:9".to_string())).unwrap();
        assert_eq!(client.describe_screen(&[1]).await.unwrap(), None);
    }
}
