//! Selector validation.
//!
//! Decides whether a model-proposed locator is acceptable for a platform and,
//! when it is ambiguous or positional, rewrites it into an attribute-based
//! form that resolves to exactly one element of the captured hierarchy.

pub mod path;
pub mod rules;

pub use path::{AttrPath, PathError, Predicate};
pub use rules::PlatformRules;

use crate::error::StepError;
use crate::model::{ActionRequest, Locator, Platform, Snapshot, UiElement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Anchored and resolves to exactly one element.
    Unique,
    Ambiguous(usize),
    NotFound,
    /// Uses a `[n]` position; always needs a rewrite.
    Positional,
    /// No identifying attribute for the platform.
    Unanchored,
    Malformed(String),
}

impl Check {
    fn describe(&self) -> String {
        match self {
            Check::Unique => "is unique".to_string(),
            Check::Ambiguous(n) => format!("matches {n} elements"),
            Check::NotFound => "matches no element".to_string(),
            Check::Positional => "relies on a positional index".to_string(),
            Check::Unanchored => "has no identifying attribute".to_string(),
            Check::Malformed(msg) => format!("cannot be evaluated ({msg})"),
        }
    }
}

/// Locator accepted for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub locator: Locator,
    /// Original selector when the locator was rewritten or replaced by bounds.
    pub rewritten_from: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorValidator {
    max_rewrites: usize,
}

impl Default for SelectorValidator {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SelectorValidator {
    pub fn new(max_rewrites: usize) -> Self {
        Self { max_rewrites }
    }

    /// Classifies `selector` against the hierarchy rooted at `root`.
    pub fn check(platform: Platform, selector: &str, root: &UiElement) -> Check {
        let path = match AttrPath::parse(selector) {
            Ok(path) => path,
            Err(e) => return Check::Malformed(e.0),
        };
        let rules = PlatformRules::for_platform(platform);
        if path.has_position() {
            return Check::Positional;
        }
        if !rules.is_anchored(&path) {
            return Check::Unanchored;
        }
        match path.evaluate(root).len() {
            0 => Check::NotFound,
            1 => Check::Unique,
            n => Check::Ambiguous(n),
        }
    }

    /// Validates the locator of an element action. Returns `Ok(None)` for
    /// actions that do not address an element.
    pub fn validate(
        &self,
        platform: Platform,
        action: &ActionRequest,
        snapshot: &Snapshot,
    ) -> Result<Option<Validation>, StepError> {
        let Some(el) = action.element() else {
            return Ok(None);
        };
        let rules = PlatformRules::for_platform(platform);
        let root = &snapshot.root;

        let Some(selector) = el.selector.as_deref() else {
            return match el.bounds {
                Some(_) if !rules.allow_bounds => Err(StepError::SelectorUnresolvable(
                    "coordinate actions are not allowed on web, use a selector".to_string(),
                )),
                Some(bounds) => Ok(Some(Validation {
                    locator: Locator::Bounds(bounds),
                    rewritten_from: None,
                })),
                None => Err(StepError::SelectorUnresolvable(
                    "neither selector nor bounds given".to_string(),
                )),
            };
        };

        let check = Self::check(platform, selector, root);
        if check == Check::Unique {
            return Ok(Some(Validation {
                locator: Locator::Selector(selector.to_string()),
                rewritten_from: None,
            }));
        }

        let candidates = AttrPath::parse(selector)
            .map(|path| path.evaluate(root))
            .unwrap_or_default();
        let hint = el.bounds.map(|b| b.center());
        let chosen = hint
            .and_then(|center| {
                candidates
                    .iter()
                    .copied()
                    .find(|c| c.bounds.is_some_and(|b| b.contains(center)))
            })
            .or_else(|| candidates.first().copied());

        if let Some(candidate) = chosen {
            if let Some(rewritten) = self.rewrite(rules, candidate, root) {
                return Ok(Some(Validation {
                    locator: Locator::Selector(rewritten),
                    rewritten_from: Some(selector.to_string()),
                }));
            }
        }

        if rules.allow_bounds {
            if let Some(bounds) = el.bounds.or_else(|| chosen.and_then(|c| c.bounds)) {
                return Ok(Some(Validation {
                    locator: Locator::Bounds(bounds),
                    rewritten_from: Some(selector.to_string()),
                }));
            }
        }

        Err(StepError::SelectorUnresolvable(format!(
            "selector '{selector}' {}",
            check.describe()
        )))
    }

    /// Builds an anchored selector for `candidate`, adding one attribute per
    /// rewrite until it is unique.
    fn rewrite(&self, rules: &PlatformRules, candidate: &UiElement, root: &UiElement) -> Option<String> {
        let preds = rules.ordered_predicates(candidate);
        if !preds.first().is_some_and(|p| rules.is_anchor(&p.name)) {
            return None;
        }
        let attempts = (1 + self.max_rewrites).min(preds.len());
        for n in 1..=attempts {
            let path = AttrPath::for_element(&candidate.tag, preds[..n].to_vec());
            let hits = path.evaluate(root);
            if hits.len() == 1 && std::ptr::eq(hits[0], candidate) {
                return Some(rules.render(&path));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, ElementAction};
    use pretty_assertions::assert_eq;

    fn tap(selector: Option<&str>, bounds: Option<Bounds>) -> ActionRequest {
        ActionRequest::Tap(ElementAction {
            selector: selector.map(str::to_string),
            bounds,
            ..ElementAction::default()
        })
    }

    fn android() -> Snapshot {
        let root = UiElement::new("hierarchy").with_child(
            UiElement::new("android.widget.FrameLayout")
                .with_child(
                    UiElement::new("android.widget.Button")
                        .with_attr("resource-id", "app:id/ok")
                        .with_attr("text", "OK")
                        .with_bounds(Bounds::new(0, 0, 100, 50)),
                )
                .with_child(
                    UiElement::new("android.widget.Button")
                        .with_attr("resource-id", "app:id/ok_dialog")
                        .with_attr("text", "OK")
                        .with_bounds(Bounds::new(0, 100, 100, 150)),
                )
                .with_child(
                    UiElement::new("android.view.View").with_bounds(Bounds::new(0, 200, 100, 250)),
                ),
        );
        Snapshot::new("phone", Platform::Android, root)
    }

    fn ios() -> Snapshot {
        let root = UiElement::new("XCUIElementTypeApplication").with_child(
            UiElement::new("XCUIElementTypeWindow")
                .with_child(
                    UiElement::new("XCUIElementTypeButton")
                        .with_attr("name", "Back")
                        .with_attr("type", "XCUIElementTypeButton"),
                )
                .with_child(
                    UiElement::new("XCUIElementTypeButton")
                        .with_attr("name", "Save")
                        .with_attr("label", "Save")
                        .with_attr("type", "XCUIElementTypeButton")
                        .with_bounds(Bounds::new(300, 40, 360, 80)),
                ),
        );
        Snapshot::new("iphone", Platform::Ios, root)
    }

    #[test]
    fn unique_android_selector_is_accepted_unchanged() {
        let v = SelectorValidator::default();
        let out = v
            .validate(Platform::Android, &tap(Some("//*[@resource-id='app:id/ok']"), None), &android())
            .unwrap()
            .unwrap();
        assert_eq!(out.locator, Locator::Selector("//*[@resource-id='app:id/ok']".into()));
        assert_eq!(out.rewritten_from, None);
    }

    #[test]
    fn ambiguous_text_selector_is_rewritten_with_resource_id() {
        let v = SelectorValidator::default();
        let action = tap(Some("//*[@text='OK']"), Some(Bounds::new(0, 100, 100, 150)));
        let out = v.validate(Platform::Android, &action, &android()).unwrap().unwrap();
        assert_eq!(
            out.locator,
            Locator::Selector("//android.widget.Button[@resource-id='app:id/ok_dialog']".into())
        );
        assert_eq!(out.rewritten_from.as_deref(), Some("//*[@text='OK']"));
    }

    #[test]
    fn ios_positional_selector_is_always_rejected_and_rewritten() {
        let snapshot = ios();
        let selector = "//XCUIElementTypeButton[2]";
        assert_eq!(
            SelectorValidator::check(Platform::Ios, selector, &snapshot.root),
            Check::Positional
        );
        let out = SelectorValidator::default()
            .validate(Platform::Ios, &tap(Some(selector), None), &snapshot)
            .unwrap()
            .unwrap();
        assert_eq!(
            out.locator,
            Locator::Selector("//XCUIElementTypeButton[@name='Save']".into())
        );
        assert_ne!(out.locator, Locator::Selector(selector.into()));
    }

    #[test]
    fn unanchored_selector_falls_back_to_element_bounds() {
        let out = SelectorValidator::default()
            .validate(Platform::Android, &tap(Some("//android.view.View"), None), &android())
            .unwrap()
            .unwrap();
        assert_eq!(out.locator, Locator::Bounds(Bounds::new(0, 200, 100, 250)));
    }

    #[test]
    fn missing_element_without_bounds_is_unresolvable() {
        let err = SelectorValidator::default()
            .validate(Platform::Android, &tap(Some("//*[@text='Nope']"), None), &android())
            .unwrap_err();
        assert!(matches!(err, StepError::SelectorUnresolvable(_)));
    }

    #[test]
    fn web_rejects_bounds_only_actions() {
        let snapshot = Snapshot::new("browser", Platform::Web, UiElement::new("html"));
        let err = SelectorValidator::default()
            .validate(Platform::Web, &tap(None, Some(Bounds::new(0, 0, 1, 1))), &snapshot)
            .unwrap_err();
        assert!(matches!(err, StepError::SelectorUnresolvable(_)));
    }

    #[test]
    fn web_text_rewrite_uses_text_function() {
        let root = UiElement::new("html").with_child(
            UiElement::new("body")
                .with_child(UiElement::new("button").with_attr("text", "Login"))
                .with_child(UiElement::new("a").with_attr("text", "Login")),
        );
        let snapshot = Snapshot::new("browser", Platform::Web, root);
        let out = SelectorValidator::default()
            .validate(Platform::Web, &tap(Some("//*[text()='Login']"), None), &snapshot)
            .unwrap()
            .unwrap();
        assert_eq!(out.locator, Locator::Selector("//button[text()='Login']".into()));
    }

    #[test]
    fn non_element_actions_pass_through() {
        let out = SelectorValidator::default()
            .validate(Platform::Web, &ActionRequest::wait(10), &android())
            .unwrap();
        assert_eq!(out, None);
    }
}
