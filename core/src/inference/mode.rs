use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{LlmMode, TaskSpec};

/// Words that suggest a task can only be judged by looking at the screen.
pub const DEFAULT_VISION_KEYWORDS: &[&str] = &[
    "screenshot",
    "image",
    "visual",
    "picture",
    "photo",
    "icon",
    "colour",
    "color",
    "see",
    "words",
    "diagram",
    "graph",
    "chart",
    "camera",
    "ocr",
    "scan",
];

/// Mode actually used for one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    Text,
    Vision,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Text => "text",
            InferenceMode::Vision => "vision",
        }
    }
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive whole-word match over a configurable keyword list.
#[derive(Debug, Clone)]
pub struct VisionClassifier {
    pattern: Option<Regex>,
}

impl Default for VisionClassifier {
    fn default() -> Self {
        let keywords: Vec<String> = DEFAULT_VISION_KEYWORDS.iter().map(|k| k.to_string()).collect();
        Self::new(&keywords).expect("escaped default keywords form a valid regex")
    }
}

impl VisionClassifier {
    pub fn new(keywords: &[String]) -> Result<Self, regex::Error> {
        let words: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if words.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Lower-cased keywords found in `text`, without duplicates.
    pub fn matched(&self, text: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut found: Vec<String> = Vec::new();
        for m in pattern.find_iter(text) {
            let word = m.as_str().to_lowercase();
            if !found.contains(&word) {
                found.push(word);
            }
        }
        found
    }

    pub fn needs_vision(&self, spec: &TaskSpec) -> bool {
        !self.matched(&spec.searchable_text()).is_empty()
    }
}

/// `auto` escalates to vision only when the classifier matches the scenario text.
pub fn resolve_mode(preference: LlmMode, spec: &TaskSpec, classifier: &VisionClassifier) -> InferenceMode {
    match preference {
        LlmMode::Text => InferenceMode::Text,
        LlmMode::Vision => InferenceMode::Vision,
        LlmMode::Auto if classifier.needs_vision(spec) => InferenceMode::Vision,
        LlmMode::Auto => InferenceMode::Text,
    }
}
