use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::inference::DEFAULT_VISION_KEYWORDS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "autoprobe.loop=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Size of the worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How long a delete waits for a running task to acknowledge cancellation.
    #[serde(default = "default_delete_grace_ms")]
    pub delete_grace_ms: u64,

    #[serde(default = "default_max_repeat")]
    pub max_repeat: u32,
}

fn default_max_workers() -> usize {
    4
}

fn default_delete_grace_ms() -> u64 {
    10_000
}

fn default_max_repeat() -> u32 {
    500
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            delete_grace_ms: default_delete_grace_ms(),
            max_repeat: default_max_repeat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step budget per scenario.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Corrective re-prompts allowed after malformed model output.
    #[serde(default = "default_parse_retries")]
    pub parse_retries: u32,

    /// Extra attributes the validator may add to make a selector unique.
    #[serde(default = "default_selector_rewrites")]
    pub selector_rewrites: usize,

    /// Upper bound for a single `wait` action.
    #[serde(default = "default_wait_cap_ms")]
    pub wait_cap_ms: u64,

    /// Capture a screenshot on every step, not only in vision mode.
    #[serde(default = "default_capture_screenshots")]
    pub capture_screenshots: bool,

    #[serde(default = "default_vision_keywords")]
    pub vision_keywords: Vec<String>,
}

fn default_max_steps() -> usize {
    60
}

fn default_parse_retries() -> u32 {
    1
}

fn default_selector_rewrites() -> usize {
    2
}

fn default_wait_cap_ms() -> u64 {
    60_000
}

fn default_capture_screenshots() -> bool {
    true
}

fn default_vision_keywords() -> Vec<String> {
    DEFAULT_VISION_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            parse_retries: default_parse_retries(),
            selector_rewrites: default_selector_rewrites(),
            wait_cap_ms: default_wait_cap_ms(),
            capture_screenshots: default_capture_screenshots(),
            vision_keywords: default_vision_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// OpenAI-compatible endpoint, e.g. "https://api.openai.com/v1".
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: String,

    /// Model used to describe screenshots in vision mode. Description is skipped when empty.
    #[serde(default)]
    pub vision_model: String,

    #[serde(default)]
    pub vision_api_key: Option<String>,

    #[serde(default)]
    pub vision_base_url: Option<String>,

    #[serde(default = "default_inference_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_inference_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_inference_timeout_ms() -> u64 {
    120_000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_base_url(),
            api_key: String::new(),
            model: String::new(),
            vision_model: String::new(),
            vision_api_key: None,
            vision_base_url: None,
            timeout_ms: default_inference_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Scheme added to server endpoints written without one.
    #[serde(default = "default_scheme")]
    pub default_scheme: String,

    /// Rewrite http:// endpoints to https://.
    #[serde(default)]
    pub force_tls: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_implicit_wait_ms")]
    pub implicit_wait_ms: u64,

    /// Fixed WebDriver endpoint for web targets, overriding their configured server.
    #[serde(default)]
    pub web_server: Option<String>,

    /// Capabilities merged under each target's own capabilities.
    #[serde(default)]
    pub android_capabilities: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub ios_capabilities: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub web_capabilities: BTreeMap<String, serde_json::Value>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_implicit_wait_ms() -> u64 {
    0
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_scheme: default_scheme(),
            force_tls: false,
            request_timeout_ms: default_request_timeout_ms(),
            implicit_wait_ms: default_implicit_wait_ms(),
            web_server: None,
            android_capabilities: BTreeMap::new(),
            ios_capabilities: BTreeMap::new(),
            web_capabilities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for stored tasks. Defaults to `~/.autoprobe/tasks`.
    #[serde(default)]
    pub directory: Option<String>,
}
