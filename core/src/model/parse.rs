//! Lenient extraction of a JSON object from model output.

use serde_json::Value;

use crate::error::ParseError;

/// Strips the noise models wrap around JSON: a BOM, one pair of wrapping
/// quotes, markdown fences and leading chatter.
fn strip_wrapping(raw: &str) -> &str {
    let mut s = raw.trim().trim_start_matches('\u{feff}').trim();

    let quoted = (s.starts_with('"') && s.ends_with('"'))
        || (s.starts_with('\'') && s.ends_with('\''));
    if quoted && s.len() >= 2 {
        s = s[1..s.len() - 1].trim();
    }

    if let Some(rest) = s.strip_prefix("```") {
        // drop the language tag on the fence line
        let body_start = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        s = rest[body_start..].trim();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim();
    }

    match s.find('{') {
        Some(start) => &s[start..],
        None => s,
    }
}

/// Returns the prefix of `text` holding the first balanced top-level object.
fn clip_balanced(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts exactly one JSON object from messy model output.
pub fn extract_json_object(raw: &str) -> Result<Value, ParseError> {
    let candidate = strip_wrapping(raw);
    if !candidate.starts_with('{') {
        return Err(ParseError::NoJson);
    }

    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(first) => {
            let clipped = clip_balanced(candidate)
                .ok_or_else(|| ParseError::InvalidJson(first.to_string()))?;
            serde_json::from_str::<Value>(clipped)
                .map_err(|e| ParseError::InvalidJson(e.to_string()))?
        }
    };

    if value.is_object() {
        Ok(value)
    } else {
        Err(ParseError::NoJson)
    }
}
