use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Bounds;
use super::task::Platform;

/// One node of a captured UI hierarchy. Attribute names are platform specific
/// (`resource-id`, `content-desc`, `text` on Android; `name`, `label`, `type` on iOS;
/// `id`, `name`, `text`, `data-*` on web).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiElement>,
}

impl UiElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_child(mut self, child: UiElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Pre-order walk of this element and its descendants.
    pub fn descendants(&self) -> Vec<&UiElement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// Captured UI state of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub target: String,
    pub platform: Platform,
    pub root: UiElement,
    /// Raw page source as returned by the driver.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(target: impl Into<String>, platform: Platform, root: UiElement) -> Self {
        Self {
            target: target.into(),
            platform,
            root,
            source: String::new(),
            screenshot: None,
            description: None,
            captured_at: Utc::now(),
        }
    }

    /// Indented YAML-like rendering of the hierarchy for the prompt.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        render(&self.root, 0, &mut out);
        out
    }

    /// File extension of the stored page source.
    pub fn source_extension(&self) -> &'static str {
        match self.platform {
            Platform::Web => "html",
            Platform::Android | Platform::Ios => "xml",
        }
    }
}

fn render(node: &UiElement, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}- {}:", node.tag);
    for (name, value) in &node.attributes {
        if !value.is_empty() {
            let _ = writeln!(out, "{indent}    {name}: {value:?}");
        }
    }
    if let Some(bounds) = node.bounds {
        let _ = writeln!(out, "{indent}    bounds: \"{bounds}\"");
    }
    for child in &node.children {
        render(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_are_preorder() {
        let root = UiElement::new("root")
            .with_child(UiElement::new("a").with_child(UiElement::new("a1")))
            .with_child(UiElement::new("b"));
        let tags: Vec<_> = root.descendants().iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["root", "a", "a1", "b"]);
    }

    #[test]
    fn outline_lists_attributes_and_bounds() {
        let root = UiElement::new("hierarchy").with_child(
            UiElement::new("android.widget.Button")
                .with_attr("text", "OK")
                .with_attr("content-desc", "")
                .with_bounds(Bounds::new(0, 0, 10, 10)),
        );
        let snapshot = Snapshot::new("phone", Platform::Android, root);
        let outline = snapshot.outline();
        assert!(outline.contains("- android.widget.Button:"));
        assert!(outline.contains("text: \"OK\""));
        assert!(outline.contains("bounds: \"[0,0][10,10]\""));
        assert!(!outline.contains("content-desc"));
    }
}
