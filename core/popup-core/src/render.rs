//! Pure view construction.
//!
//! Activity text comes from store configuration and order data, so every
//! string that lands in markup goes through [`escape_html`] first. Views are
//! plain data; a host may render them however it likes, and `to_html` is the
//! reference markup the storefront stylesheet targets.

use crate::types::{Activity, PopupPosition, VisualState};

/// Escapes text for use in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// URLs are only emitted for http(s) and site-relative paths; anything else
/// (`javascript:`, `data:`) is dropped.
fn safe_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    let allowed = lower.starts_with("https://")
        || lower.starts_with("http://")
        || lower.starts_with("//")
        || (trimmed.starts_with('/') && !trimmed.starts_with("//"));
    allowed.then(|| escape_html(trimmed))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Popup
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    pub position: PopupPosition,
    pub headline: String,
    pub product_title: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub time_ago: String,
}

impl PopupView {
    /// Builds the escaped view for one activity.
    pub fn from_activity(activity: &Activity, position: PopupPosition) -> Self {
        let city = activity.city.trim();
        let headline = if city.is_empty() {
            "Someone purchased".to_string()
        } else {
            format!("Someone in {} purchased", escape_html(city))
        };

        PopupView {
            position,
            headline,
            product_title: escape_html(&activity.product_title),
            image_url: safe_url(&activity.product_image),
            link_url: activity.product_url.as_deref().and_then(safe_url),
            time_ago: escape_html(&activity.time_ago),
        }
    }

    pub fn class_list(&self, state: VisualState) -> String {
        format!("sp-popup {} {}", self.position.css_class(), state.css_class())
    }

    pub fn to_html(&self, state: VisualState) -> String {
        let mut html = format!(
            r#"<div class="{}" role="status" aria-live="polite">"#,
            self.class_list(state)
        );
        if let Some(image) = &self.image_url {
            html.push_str(&format!(
                r#"<img class="sp-popup__image" src="{}" alt="{}">"#,
                image, self.product_title
            ));
        }
        html.push_str(r#"<div class="sp-popup__body">"#);
        html.push_str(&format!(r#"<p class="sp-popup__headline">{}</p>"#, self.headline));
        match &self.link_url {
            Some(url) => html.push_str(&format!(
                r#"<a class="sp-popup__product" href="{}">{}</a>"#,
                url, self.product_title
            )),
            None => html.push_str(&format!(
                r#"<p class="sp-popup__product">{}</p>"#,
                self.product_title
            )),
        }
        if !self.time_ago.is_empty() {
            html.push_str(&format!(r#"<p class="sp-popup__time">{}</p>"#, self.time_ago));
        }
        html.push_str("</div>");
        html.push_str(r#"<button class="sp-popup__close" type="button" aria-label="Close">&times;</button>"#);
        html.push_str("</div>");
        html
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Counter Badge
// ═══════════════════════════════════════════════════════════════════════════════

pub const COUNT_PLACEHOLDER: &str = "{count}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeView {
    template: String,
}

impl BadgeView {
    /// A template without a placeholder gets the count prepended.
    pub fn new(template: &str) -> Self {
        let template = if template.contains(COUNT_PLACEHOLDER) {
            template.to_string()
        } else {
            format!("{} {}", COUNT_PLACEHOLDER, template.trim())
        };
        Self { template }
    }

    /// Escaped text for a displayed value.
    pub fn text(&self, value: u64) -> String {
        escape_html(&self.template).replace(COUNT_PLACEHOLDER, &value.to_string())
    }

    pub fn to_html(&self, value: u64, visible: bool) -> String {
        let class = if visible {
            "sp-counter sp-counter--visible"
        } else {
            "sp-counter"
        };
        format!(r#"<div class="{}">{}</div>"#, class, self.text(value))
    }
}
