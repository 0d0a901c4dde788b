//! Minimal XPath subset used by model-proposed selectors.
//!
//! Supported: `/` and `//` steps, `*` or a tag name, `[n]` positions and
//! `[@attr='v' and text()='v']` equality predicates. `#id` is accepted as
//! shorthand for `//*[@id='id']`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::UiElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Attribute name; `text()` and `.` are stored as `text`.
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub axis: Axis,
    pub tag: String,
    pub predicates: Vec<Predicate>,
    /// 1-based position among matching siblings.
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError(pub String);

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn condition_re() -> &'static Regex {
    static CONDITION_REGEX: OnceLock<Regex> = OnceLock::new();
    CONDITION_REGEX.get_or_init(|| {
        Regex::new(r#"^\s*(?:@([\w:.-]+)|(text\(\))|(\.))\s*=\s*(?:'([^']*)'|"([^"]*)")\s*"#)
            .expect("CONDITION_REGEX is valid")
    })
}

fn tag_re() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| {
        Regex::new(r"^(\*|[A-Za-z_][\w.:-]*)").expect("TAG_REGEX is valid")
    })
}

impl AttrPath {
    pub fn parse(selector: &str) -> Result<Self, PathError> {
        let s = selector.trim();
        if let Some(id) = s.strip_prefix('#') {
            if id.is_empty() || id.contains(char::is_whitespace) {
                return Err(PathError(format!("invalid id shorthand '{s}'")));
            }
            return Ok(AttrPath {
                segments: vec![Segment {
                    axis: Axis::Descendant,
                    tag: "*".into(),
                    predicates: vec![Predicate {
                        name: "id".into(),
                        value: id.into(),
                    }],
                    index: None,
                }],
            });
        }
        if !s.starts_with('/') {
            return Err(PathError(format!("'{s}' is not an attribute path")));
        }

        let mut segments = Vec::new();
        let mut rest = s;
        while !rest.is_empty() {
            let axis = if let Some(r) = rest.strip_prefix("//") {
                rest = r;
                Axis::Descendant
            } else if let Some(r) = rest.strip_prefix('/') {
                rest = r;
                Axis::Child
            } else {
                return Err(PathError(format!("unexpected '{rest}' in '{s}'")));
            };

            let tag = tag_re()
                .find(rest)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| PathError(format!("missing tag in '{s}'")))?;
            rest = &rest[tag.len()..];

            let mut predicates = Vec::new();
            let mut index = None;
            while rest.starts_with('[') {
                let end = closing_bracket(rest)
                    .ok_or_else(|| PathError(format!("unbalanced '[' in '{s}'")))?;
                let group = rest[1..end].trim();
                rest = &rest[end + 1..];
                if let Ok(n) = group.parse::<usize>() {
                    if n == 0 || index.is_some() {
                        return Err(PathError(format!("unsupported position in '{s}'")));
                    }
                    index = Some(n);
                } else {
                    predicates.extend(parse_conditions(group, s)?);
                }
            }
            segments.push(Segment {
                axis,
                tag,
                predicates,
                index,
            });
        }
        if segments.is_empty() {
            return Err(PathError(format!("empty path '{s}'")));
        }
        Ok(AttrPath { segments })
    }

    /// Builds `//tag[@a='x' and @b='y']`.
    pub fn for_element(tag: &str, predicates: Vec<Predicate>) -> Self {
        AttrPath {
            segments: vec![Segment {
                axis: Axis::Descendant,
                tag: tag.to_string(),
                predicates,
                index: None,
            }],
        }
    }

    pub fn has_position(&self) -> bool {
        self.segments.iter().any(|s| s.index.is_some())
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.segments.iter().flat_map(|s| s.predicates.iter())
    }

    /// Renders the path. Text predicates use `text()` when `text_fn` is set,
    /// otherwise `@text`.
    pub fn render(&self, text_fn: bool) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            out.push_str(match seg.axis {
                Axis::Child => "/",
                Axis::Descendant => "//",
            });
            out.push_str(&seg.tag);
            if !seg.predicates.is_empty() {
                let conds: Vec<String> = seg
                    .predicates
                    .iter()
                    .map(|p| {
                        let lhs = if p.name == "text" && text_fn {
                            "text()".to_string()
                        } else {
                            format!("@{}", p.name)
                        };
                        format!("{lhs}={}", quote(&p.value))
                    })
                    .collect();
                out.push('[');
                out.push_str(&conds.join(" and "));
                out.push(']');
            }
            if let Some(i) = seg.index {
                out.push_str(&format!("[{i}]"));
            }
        }
        out
    }

    /// Elements of the tree rooted at `root` selected by this path, in document order.
    pub fn evaluate<'a>(&self, root: &'a UiElement) -> Vec<&'a UiElement> {
        let mut context: Vec<&'a UiElement> = Vec::new();
        for (i, seg) in self.segments.iter().enumerate() {
            let index = seg.index;
            let mut next: Vec<&'a UiElement> = Vec::new();
            if i == 0 {
                // the root is the only child of the document node
                if seg_matches(seg, root) && index.map_or(true, |n| n == 1) {
                    push_unique(&mut next, root);
                }
                if seg.axis == Axis::Descendant {
                    for parent in root.descendants() {
                        select_children(parent, seg, index, &mut next);
                    }
                }
            } else {
                for ctx in &context {
                    match seg.axis {
                        Axis::Child => select_children(ctx, seg, index, &mut next),
                        Axis::Descendant => {
                            for parent in ctx.descendants() {
                                select_children(parent, seg, index, &mut next);
                            }
                        }
                    }
                }
            }
            context = next;
            if context.is_empty() {
                break;
            }
        }
        order_by_document(root, context)
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

/// XPath string literal for `value`. Values holding both quote kinds need `concat()`.
fn quote(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let mut parts = Vec::new();
    for (i, chunk) in value.split('\'').enumerate() {
        if i > 0 {
            parts.push("\"'\"".to_string());
        }
        if !chunk.is_empty() {
            parts.push(format!("'{chunk}'"));
        }
    }
    format!("concat({})", parts.join(", "))
}

fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices().skip(1) {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, ']') => return Some(i),
            (None, '[') => return None,
            _ => {}
        }
    }
    None
}

fn parse_conditions(group: &str, selector: &str) -> Result<Vec<Predicate>, PathError> {
    let mut preds = Vec::new();
    let mut rest = group;
    loop {
        let caps = condition_re()
            .captures(rest)
            .ok_or_else(|| PathError(format!("unsupported predicate '[{group}]' in '{selector}'")))?;
        let name = match caps.get(1) {
            Some(attr) => attr.as_str().to_string(),
            None => "text".to_string(),
        };
        let value = caps
            .get(4)
            .or_else(|| caps.get(5))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        preds.push(Predicate { name, value });
        let consumed = caps.get(0).map_or(0, |m| m.end());
        rest = rest[consumed..].trim_start();
        if rest.is_empty() {
            return Ok(preds);
        }
        rest = rest
            .strip_prefix("and ")
            .ok_or_else(|| PathError(format!("unsupported predicate '[{group}]' in '{selector}'")))?;
    }
}

fn seg_matches(seg: &Segment, el: &UiElement) -> bool {
    (seg.tag == "*" || seg.tag == el.tag)
        && seg.predicates.iter().all(|p| {
            el.attributes.get(&p.name).map(String::as_str).unwrap_or("") == p.value
        })
}

fn select_children<'a>(
    parent: &'a UiElement,
    seg: &Segment,
    index: Option<usize>,
    out: &mut Vec<&'a UiElement>,
) {
    let mut matching = parent.children.iter().filter(|c| seg_matches(seg, c));
    match index {
        Some(n) => {
            if let Some(el) = matching.nth(n - 1) {
                push_unique(out, el);
            }
        }
        None => {
            for el in matching {
                push_unique(out, el);
            }
        }
    }
}

fn push_unique<'a>(out: &mut Vec<&'a UiElement>, el: &'a UiElement) {
    if !out.iter().any(|e| std::ptr::eq(*e, el)) {
        out.push(el);
    }
}

fn order_by_document<'a>(root: &'a UiElement, found: Vec<&'a UiElement>) -> Vec<&'a UiElement> {
    if found.len() < 2 {
        return found;
    }
    root.descendants()
        .into_iter()
        .filter(|el| found.iter().any(|f| std::ptr::eq(*f, *el)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn literals_pick_a_quote_the_value_lacks() {
        let render = |value: &str| {
            AttrPath::for_element(
                "android.widget.Button",
                vec![Predicate {
                    name: "text".into(),
                    value: value.into(),
                }],
            )
            .render(false)
        };
        assert_eq!(render("OK"), "//android.widget.Button[@text='OK']");
        assert_eq!(render("it's"), r#"//android.widget.Button[@text="it's"]"#);
        assert_eq!(
            render(r#"it's "on""#),
            r#"//android.widget.Button[@text=concat('it', "'", 's "on"')]"#
        );
    }

    fn tree() -> UiElement {
        UiElement::new("hierarchy").with_child(
            UiElement::new("android.widget.LinearLayout")
                .with_child(
                    UiElement::new("android.widget.Button")
                        .with_attr("text", "OK")
                        .with_attr("resource-id", "app:id/ok"),
                )
                .with_child(UiElement::new("android.widget.Button").with_attr("text", "Cancel")),
        )
    }

    #[test]
    fn parses_predicates_and_positions() {
        let path = AttrPath::parse("//android.widget.Button[@text='OK' and @resource-id=\"app:id/ok\"][1]").unwrap();
        assert_eq!(path.segments.len(), 1);
        let seg = &path.segments[0];
        assert_eq!(seg.tag, "android.widget.Button");
        assert_eq!(seg.predicates.len(), 2);
        assert_eq!(seg.index, Some(1));
    }

    #[test]
    fn evaluates_descendant_and_child_steps() {
        let root = tree();
        let all = AttrPath::parse("//android.widget.Button").unwrap().evaluate(&root);
        assert_eq!(all.len(), 2);
        let second = AttrPath::parse("/hierarchy/android.widget.LinearLayout/android.widget.Button[2]")
            .unwrap()
            .evaluate(&root);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].attr("text"), Some("Cancel"));
        let by_text = AttrPath::parse("//*[text()='OK']").unwrap().evaluate(&root);
        assert_eq!(by_text.len(), 1);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(AttrPath::parse("//a[contains(@text,'x')]").is_err());
        assert!(AttrPath::parse("button.primary").is_err());
        assert!(AttrPath::parse("//a[0]").is_err());
    }

    #[test]
    fn renders_text_predicate_per_style() {
        let path = AttrPath::for_element(
            "button",
            vec![Predicate {
                name: "text".into(),
                value: "it's".into(),
            }],
        );
        assert_eq!(path.render(true), "//button[text()=\"it's\"]");
        assert_eq!(path.render(false), "//button[@text=\"it's\"]");
    }
}
