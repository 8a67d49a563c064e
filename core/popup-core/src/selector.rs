//! Anchor probing for the counter badge.
//!
//! Themes disagree on what their "Add to cart" control looks like, so the
//! badge controller walks an ordered list of probes and takes the first hit.
//! Probes are compound CSS-style selectors (no combinators):
//!
//! ```text
//! button[name="add"]   .product-form__submit   #AddToCart
//! form[action*="/cart/add"]   [data-add-to-cart]
//! ```
//!
//! plus a last-resort text heuristic for buttons labelled "Add to cart".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// What the host exposes about one element for probing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
}

impl ElementInfo {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    fn attr(&self, name: &str) -> Option<&str> {
        match name {
            "id" => self.id.as_deref(),
            _ => self.attrs.get(name).map(String::as_str),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Selectors
// ═══════════════════════════════════════════════════════════════════════════════

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:(?P<tag>[A-Za-z][A-Za-z0-9-]*)|#(?P<id>[\w-]+)|\.(?P<class>[\w-]+)|\[\s*(?P<attr>[\w-]+)\s*(?:(?P<op>[*^$]?=)\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[\w-]+))\s*)?\])"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrMatch {
    fn matches(&self, element: &ElementInfo) -> bool {
        let Some(actual) = element.attr(&self.name) else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Contains => actual.contains(&self.value),
            AttrOp::StartsWith => actual.starts_with(&self.value),
            AttrOp::EndsWith => actual.ends_with(&self.value),
        }
    }
}

/// A compound selector: optional tag, then any mix of `#id`, `.class`,
/// `[attr]`, `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`, `[attr$="v"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Selector {
    /// Returns `None` for anything outside the supported grammar.
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }

        let mut selector = Selector {
            source: source.to_string(),
            tag: None,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
        };

        let mut rest = source;
        let mut first = true;
        while !rest.is_empty() {
            let caps = TOKEN_RE.captures(rest)?;
            let whole = caps.get(0)?;

            if let Some(tag) = caps.name("tag") {
                if !first {
                    return None;
                }
                selector.tag = Some(tag.as_str().to_ascii_lowercase());
            } else if let Some(id) = caps.name("id") {
                selector.id = Some(id.as_str().to_string());
            } else if let Some(class) = caps.name("class") {
                selector.classes.push(class.as_str().to_string());
            } else if let Some(name) = caps.name("attr") {
                let op = match caps.name("op").map(|m| m.as_str()) {
                    None => AttrOp::Exists,
                    Some("=") => AttrOp::Equals,
                    Some("*=") => AttrOp::Contains,
                    Some("^=") => AttrOp::StartsWith,
                    Some("$=") => AttrOp::EndsWith,
                    Some(_) => return None,
                };
                let value = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                selector.attrs.push(AttrMatch {
                    name: name.as_str().to_ascii_lowercase(),
                    op,
                    value,
                });
            }

            rest = &rest[whole.end()..];
            first = false;
        }

        Some(selector)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, element: &ElementInfo) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| element.classes.iter().any(|c| c == class))
            && self.attrs.iter().all(|attr| attr.matches(element))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probes
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorProbe {
    Selector(Selector),
    /// A button (or submit input) whose label contains this text,
    /// case-insensitively.
    ButtonText(String),
}

impl AnchorProbe {
    pub fn matches(&self, element: &ElementInfo) -> bool {
        match self {
            AnchorProbe::Selector(selector) => selector.matches(element),
            AnchorProbe::ButtonText(needle) => {
                let is_button = element.tag.eq_ignore_ascii_case("button")
                    || (element.tag.eq_ignore_ascii_case("input")
                        && element.attr("type") == Some("submit"));
                if !is_button {
                    return false;
                }
                let label = if element.text.trim().is_empty() {
                    element.attr("value").unwrap_or_default()
                } else {
                    element.text.as_str()
                };
                label.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AnchorProbe::Selector(selector) => selector.as_str().to_string(),
            AnchorProbe::ButtonText(needle) => format!("button text {:?}", needle),
        }
    }
}

/// Selectors tried in order, most specific theme markup first.
pub const DEFAULT_ANCHOR_SELECTORS: &[&str] = &[
    r#"button[name="add"]"#,
    ".product-form__submit",
    "button.product-form__cart-submit",
    "#AddToCart",
    "[data-add-to-cart]",
    r#"form[action*="/cart/add"]"#,
    ".shopify-payment-button",
];

pub const ADD_TO_CART_TEXT: &str = "add to cart";

/// Builds a probe list from selector strings, skipping (and logging) any that
/// don't parse, and appending the text heuristic.
pub fn probes_from(selectors: &[&str]) -> Vec<AnchorProbe> {
    let mut probes: Vec<AnchorProbe> = selectors
        .iter()
        .filter_map(|raw| match Selector::parse(raw) {
            Some(selector) => Some(AnchorProbe::Selector(selector)),
            None => {
                warn!(selector = raw, "Ignoring unsupported anchor selector");
                None
            }
        })
        .collect();
    probes.push(AnchorProbe::ButtonText(ADD_TO_CART_TEXT.to_string()));
    probes
}

pub fn default_anchor_probes() -> Vec<AnchorProbe> {
    probes_from(DEFAULT_ANCHOR_SELECTORS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_selector() {
        let selector = Selector::parse(r#"button.primary#buy[name="add"][data-x]"#).unwrap();
        let element = ElementInfo::new("BUTTON")
            .with_id("buy")
            .with_class("primary")
            .with_attr("name", "add")
            .with_attr("data-x", "");
        assert!(selector.matches(&element));
        assert!(!selector.matches(&ElementInfo::new("button").with_id("buy")));
    }

    #[test]
    fn attribute_operators() {
        let form = ElementInfo::new("form").with_attr("action", "/cart/add?variant=1");
        assert!(Selector::parse(r#"[action*="/cart/add"]"#).unwrap().matches(&form));
        assert!(Selector::parse(r#"[action^='/cart']"#).unwrap().matches(&form));
        assert!(Selector::parse(r#"[action$="=1"]"#).unwrap().matches(&form));
        assert!(!Selector::parse(r#"[action="/cart/add"]"#).unwrap().matches(&form));
        assert!(Selector::parse("[action]").unwrap().matches(&form));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(Selector::parse("form button").is_none());
        assert!(Selector::parse("div > a").is_none());
        assert!(Selector::parse(".a:hover").is_none());
        assert!(Selector::parse("").is_none());
        assert!(Selector::parse(".x button").is_none());
    }

    #[test]
    fn tag_after_other_token_is_rejected() {
        assert!(Selector::parse(".x.y").is_some());
        assert!(Selector::parse("#idbutton").is_some());
        assert!(Selector::parse("[a]button").is_none());
    }

    #[test]
    fn button_text_heuristic() {
        let probe = AnchorProbe::ButtonText(ADD_TO_CART_TEXT.to_string());
        assert!(probe.matches(&ElementInfo::new("button").with_text("  Add To Cart ")));
        assert!(probe.matches(
            &ElementInfo::new("input")
                .with_attr("type", "submit")
                .with_attr("value", "Add to cart")
        ));
        assert!(!probe.matches(&ElementInfo::new("a").with_text("Add to cart")));
    }

    #[test]
    fn default_probes_all_parse() {
        let probes = default_anchor_probes();
        assert_eq!(probes.len(), DEFAULT_ANCHOR_SELECTORS.len() + 1);
        assert!(matches!(probes.last(), Some(AnchorProbe::ButtonText(_))));
    }

    #[test]
    fn invalid_selectors_are_skipped() {
        let probes = probes_from(&["div > a", "#ok"]);
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].describe(), "#ok");
    }
}
