//! Per-platform locator rules.

use crate::model::{Platform, UiElement};

use super::path::{AttrPath, Predicate};

#[derive(Debug, Clone, Copy)]
pub struct PlatformRules {
    pub platform: Platform,
    /// Identifying attributes in priority order.
    pub anchors: &'static [&'static str],
    /// Attributes that may be added to an anchored selector to narrow it down.
    pub disambiguators: &'static [&'static str],
    /// Whether coordinate actions are allowed at all.
    pub allow_bounds: bool,
    /// Whether `text` is rendered as `text()` instead of `@text`.
    pub text_fn: bool,
}

const ANDROID: PlatformRules = PlatformRules {
    platform: Platform::Android,
    anchors: &["resource-id", "content-desc", "text"],
    disambiguators: &["class", "package", "enabled", "clickable"],
    allow_bounds: true,
    text_fn: false,
};

const IOS: PlatformRules = PlatformRules {
    platform: Platform::Ios,
    anchors: &["name", "label"],
    disambiguators: &["type", "enabled", "visible", "value"],
    allow_bounds: true,
    text_fn: false,
};

const WEB: PlatformRules = PlatformRules {
    platform: Platform::Web,
    anchors: &["id", "name", "text"],
    disambiguators: &["type", "role", "aria-label", "href", "placeholder"],
    allow_bounds: false,
    text_fn: true,
};

impl PlatformRules {
    pub fn for_platform(platform: Platform) -> &'static PlatformRules {
        match platform {
            Platform::Android => &ANDROID,
            Platform::Ios => &IOS,
            Platform::Web => &WEB,
        }
    }

    /// Stable `data-*` attributes count as anchors on web.
    pub fn is_anchor(&self, name: &str) -> bool {
        self.anchors.contains(&name) || (self.platform == Platform::Web && name.starts_with("data-"))
    }

    /// A selector is anchored when at least one predicate uses an anchor attribute.
    pub fn is_anchored(&self, path: &AttrPath) -> bool {
        path.predicates().any(|p| self.is_anchor(&p.name))
    }

    /// The element's usable attributes in the order rewrites should add them:
    /// anchors first, then `data-*` on web, then disambiguators.
    pub fn ordered_predicates(&self, el: &UiElement) -> Vec<Predicate> {
        let mut out = Vec::new();
        let mut push = |name: &str| {
            if let Some(value) = el.attr(name) {
                out.push(Predicate {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        };
        for name in self.anchors {
            push(*name);
        }
        if self.platform == Platform::Web {
            for name in el.attributes.keys().filter(|k| k.starts_with("data-")) {
                push(name.as_str());
            }
        }
        for name in self.disambiguators {
            push(*name);
        }
        out
    }

    pub fn render(&self, path: &AttrPath) -> String {
        path.render(self.text_fn)
    }
}
