//! Page source to [`UiElement`] conversion.
//!
//! Mobile sources are UIAutomator2/XCUITest XML parsed with quick-xml. Web
//! hierarchies are produced in the browser by [`DOM_SNAPSHOT_SCRIPT`] since
//! live HTML is rarely well-formed XML.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use autoprobe_core::api::{Bounds, DriverError, Platform, UiElement};

const ANDROID_ATTRS: &[&str] = &[
    "index",
    "package",
    "class",
    "text",
    "resource-id",
    "content-desc",
    "clickable",
    "scrollable",
    "enabled",
    "displayed",
    "checked",
    "selected",
    "password",
    "long-clickable",
    "focusable",
    "focused",
];

const IOS_ATTRS: &[&str] = &[
    "type",
    "name",
    "label",
    "value",
    "enabled",
    "visible",
    "accessible",
    "index",
];

/// Returns a JSON tree shaped like `UiElement` for the current document.
pub const DOM_SNAPSHOT_SCRIPT: &str = r#"
const KEEP = ["id", "name", "type", "value", "placeholder", "aria-label", "role", "href", "for", "title", "alt", "class"];
const SKIP = ["SCRIPT", "STYLE", "NOSCRIPT", "TEMPLATE", "SVG"];
function walk(node) {
  const el = { tag: node.tagName.toLowerCase(), attributes: {}, children: [] };
  for (const name of node.getAttributeNames()) {
    if (KEEP.includes(name) || name.startsWith("data-")) {
      const v = node.getAttribute(name);
      if (v) el.attributes[name] = v.slice(0, 200);
    }
  }
  const own = Array.from(node.childNodes)
    .filter(n => n.nodeType === 3)
    .map(n => n.textContent.trim())
    .filter(Boolean)
    .join(" ");
  if (own) el.attributes.text = own.slice(0, 200);
  const r = node.getBoundingClientRect();
  if (r.width > 0 && r.height > 0) {
    el.bounds = [Math.round(r.left), Math.round(r.top), Math.round(r.right), Math.round(r.bottom)];
  }
  for (const child of node.children) {
    if (!SKIP.includes(child.tagName.toUpperCase())) el.children.push(walk(child));
  }
  return el;
}
return walk(document.documentElement);
"#;

fn keeps(platform: Platform, name: &str) -> bool {
    match platform {
        Platform::Android => ANDROID_ATTRS.contains(&name),
        Platform::Ios => IOS_ATTRS.contains(&name),
        Platform::Web => true,
    }
}

fn protocol(msg: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(format!("malformed page source: {msg}"))
}

fn element_from(start: &BytesStart<'_>, platform: Platform) -> Result<UiElement, DriverError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = UiElement::new(tag);
    let mut frame: [Option<i32>; 4] = [None; 4];

    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(protocol)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(protocol)?.into_owned();
        if value.trim().is_empty() {
            continue;
        }
        match key.as_str() {
            "bounds" => el.bounds = value.parse::<Bounds>().ok(),
            "x" => frame[0] = value.parse().ok(),
            "y" => frame[1] = value.parse().ok(),
            "width" => frame[2] = value.parse().ok(),
            "height" => frame[3] = value.parse().ok(),
            _ if keeps(platform, &key) => {
                el.attributes.insert(key, value);
            }
            _ => {}
        }
    }

    // XCUITest reports a frame instead of bounds
    if el.bounds.is_none() {
        if let [Some(x), Some(y), Some(w), Some(h)] = frame {
            el.bounds = Some(Bounds::new(x, y, x + w, y + h));
        }
    }
    Ok(el)
}

fn attach(stack: &mut [UiElement], root: &mut Option<UiElement>, el: UiElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    } else if root.is_none() {
        *root = Some(el);
    }
}

/// Parses UIAutomator2 or XCUITest page source, keeping only the attributes
/// useful for locating elements.
pub fn parse_hierarchy(xml: &str, platform: Platform) -> Result<UiElement, DriverError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<UiElement> = Vec::new();
    let mut root: Option<UiElement> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from(&e, platform)?),
            Ok(Event::Empty(e)) => {
                let el = element_from(&e, platform)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(protocol(format!(
                    "{e} at byte {}",
                    reader.buffer_position()
                )))
            }
        }
    }
    // tolerate a truncated document
    while let Some(el) = stack.pop() {
        attach(&mut stack, &mut root, el);
    }
    root.ok_or_else(|| protocol("no root element"))
}

/// Decodes the tree returned by [`DOM_SNAPSHOT_SCRIPT`].
pub fn parse_dom(value: Value) -> Result<UiElement, DriverError> {
    serde_json::from_value(value).map_err(protocol)
}
