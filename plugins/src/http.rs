//! JSON-over-HTTP plumbing shared by the inference and WebDriver clients.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

const PREVIEW_CHARS: usize = 512;

/// Where a call broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    /// The request could not be built or sent.
    Request,
    /// The answer was not the JSON we expected.
    Decode,
    /// The server answered with a non-2xx status.
    Rejected,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Decode => "decode",
            Self::Rejected => "status",
            Self::Other => "unknown",
        })
    }
}

#[derive(Debug, Error)]
#[error("http error kind={kind}{}{}: {message}", status_part(.status), url_part(.url))]
pub struct HttpError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub url: String,
    pub message: String,
    /// Decoded error body, when the server sent JSON.
    pub body: Option<Value>,
}

fn status_part(status: &Option<u16>) -> String {
    status.map(|s| format!(" status={s}")).unwrap_or_default()
}

fn url_part(url: &str) -> String {
    if url.is_empty() {
        String::new()
    } else {
        format!(" url={url}")
    }
}

impl HttpError {
    pub fn transport(err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else if err.is_request() || err.is_builder() {
            FailureKind::Request
        } else if err.is_decode() || err.is_body() {
            FailureKind::Decode
        } else {
            FailureKind::Other
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            message: err.to_string(),
            body: None,
        }
    }

    pub fn rejected(
        status: u16,
        url: &str,
        message: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        Self {
            kind: FailureKind::Rejected,
            status: Some(status),
            url: url.to_string(),
            message: message.into(),
            body,
        }
    }

    /// WebDriver `value.error` code carried by the error body, if any.
    pub fn protocol_code(&self) -> Option<&str> {
        self.body.as_ref()?.get("value")?.get("error")?.as_str()
    }
}

/// Trimmed and clipped to a size fit for logs and error messages.
pub(crate) fn preview(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    let mut clipped: String = body.chars().take(PREVIEW_CHARS).collect();
    if clipped.len() < body.len() {
        clipped.push_str("...");
    }
    clipped
}

/// Sends `req` and decodes the JSON answer. An empty 2xx body is `null`.
/// Non-2xx answers keep their decoded body so protocol error codes survive.
pub(crate) async fn send_json(
    req: reqwest::RequestBuilder,
    url: &str,
) -> Result<Value, HttpError> {
    let resp = req.send().await.map_err(|e| HttpError::transport(e, url))?;
    let status = resp.status();
    let text = resp.text().await.map_err(|e| HttpError::transport(e, url))?;

    if !status.is_success() {
        let body = serde_json::from_str::<Value>(&text).ok();
        return Err(HttpError::rejected(status.as_u16(), url, preview(&text), body));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| HttpError {
        kind: FailureKind::Decode,
        status: Some(status.as_u16()),
        url: url.to_string(),
        message: format!("failed to decode response body: {e} | body={}", preview(&text)),
        body: None,
    })
}
