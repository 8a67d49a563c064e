//! Configuration payload types for the storefront popup engine.
//!
//! This crate is shared by the engine and whatever produces its payload (the
//! app proxy endpoint, or the theme extension that inlines the same JSON into
//! the page) so the two sides cannot drift. The engine remains the authority
//! on validation; these types only describe the wire shape.
//!
//! Every field is optional on the wire. Deciding which absences are fatal is
//! the config loader's job, not the deserializer's. Fields that only tune the
//! presentation (position, badge inputs) read a value of the wrong type as
//! absent instead of failing the whole payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024; // 1MB

pub const DEFAULT_POPUP_DELAY_SECS: f64 = 5.0;
pub const DEFAULT_DISPLAY_DURATION_SECS: f64 = 4.0;
pub const DEFAULT_POSITION: &str = "BOTTOM_LEFT";

/// Top-level document the storefront receives before the engine starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    #[serde(default)]
    pub settings: Option<SettingsPayload>,
    #[serde(default)]
    pub activities: Vec<ActivityPayload>,
    #[serde(default)]
    pub page_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_product_id")]
    pub product_id: Option<ProductId>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub purchase_count: Option<u64>,
}

impl ConfigPayload {
    /// Page type, preferring the top-level value over the legacy copy that
    /// older theme embeds placed inside `settings`.
    pub fn effective_page_type(&self) -> Option<&str> {
        self.page_type
            .as_deref()
            .or_else(|| self.settings.as_ref().and_then(|s| s.page_type.as_deref()))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn effective_product_id(&self) -> Option<String> {
        self.product_id
            .as_ref()
            .or_else(|| self.settings.as_ref().and_then(|s| s.product_id.as_ref()))
            .and_then(ProductId::normalized)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    #[serde(default)]
    pub popup_enabled: bool,
    #[serde(default)]
    pub counter_enabled: bool,
    #[serde(default = "default_position", deserialize_with = "lenient_position")]
    pub popup_position: String,
    #[serde(default = "default_popup_delay")]
    pub popup_delay: f64,
    #[serde(default = "default_display_duration")]
    pub display_duration: f64,
    #[serde(default)]
    pub counter_label: Option<String>,
    #[serde(default)]
    pub page_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_product_id")]
    pub product_id: Option<ProductId>,
}

impl Default for SettingsPayload {
    fn default() -> Self {
        Self {
            popup_enabled: false,
            counter_enabled: false,
            popup_position: default_position(),
            popup_delay: DEFAULT_POPUP_DELAY_SECS,
            display_duration: DEFAULT_DISPLAY_DURATION_SECS,
            counter_label: None,
            page_type: None,
            product_id: None,
        }
    }
}

fn default_position() -> String {
    DEFAULT_POSITION.to_string()
}

fn default_popup_delay() -> f64 {
    DEFAULT_POPUP_DELAY_SECS
}

fn default_display_duration() -> f64 {
    DEFAULT_DISPLAY_DURATION_SECS
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient fields
// ─────────────────────────────────────────────────────────────────────────────

/// Non-string positions (e.g. `null` from an unset column) become the default.
fn lenient_position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(position) => position,
        _ => default_position(),
    })
}

/// Anything but a non-negative integer or a string reads as no product id.
fn lenient_product_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ProductId>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(ProductId::Text(text)),
        Value::Number(number) => number.as_u64().map(ProductId::Number),
        _ => None,
    })
}

/// Anything but a non-negative integer reads as no purchase count.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_u64(),
        _ => None,
    })
}

/// Shopify product ids show up as JSON numbers from the Admin API and as
/// strings from Liquid, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductId {
    Number(u64),
    Text(String),
}

impl ProductId {
    pub fn normalized(&self) -> Option<String> {
        match self {
            ProductId::Number(value) => Some(value.to_string()),
            ProductId::Text(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

/// One purchase event as sent by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    #[serde(default)]
    pub product_title: String,
    #[serde(default)]
    pub product_image: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub time_ago: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
}

impl ActivityPayload {
    /// Display string for "when": the server-computed `timeAgo` if present,
    /// otherwise derived from `createdAt` relative to `now`.
    pub fn resolve_time_ago(&self, now: DateTime<Utc>) -> String {
        if let Some(time_ago) = self.time_ago.as_deref() {
            if !time_ago.trim().is_empty() {
                return time_ago.to_string();
            }
        }

        self.created_at
            .as_deref()
            .and_then(parse_timestamp)
            .map(|created_at| format_time_ago(created_at, now))
            .unwrap_or_default()
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Coarse relative time, matching what the admin preview shows.
pub fn format_time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = now.signed_duration_since(created_at).num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

fn plural(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_camel_case_payload() {
        let payload: ConfigPayload = serde_json::from_str(
            r#"{
                "settings": {"popupEnabled": true, "popupPosition": "TOP_RIGHT", "popupDelay": 7},
                "activities": [{"productTitle": "Mug", "productImage": "https://x/y.png", "city": "Oslo", "timeAgo": "2 minutes ago"}],
                "pageType": "product",
                "productId": 42
            }"#,
        )
        .unwrap();

        let settings = payload.settings.as_ref().unwrap();
        assert!(settings.popup_enabled);
        assert!(!settings.counter_enabled);
        assert_eq!(settings.popup_position, "TOP_RIGHT");
        assert_eq!(settings.popup_delay, 7.0);
        assert_eq!(settings.display_duration, DEFAULT_DISPLAY_DURATION_SECS);
        assert_eq!(payload.activities.len(), 1);
        assert_eq!(payload.effective_product_id().as_deref(), Some("42"));
    }

    #[test]
    fn ignores_unknown_settings_fields() {
        let payload: ConfigPayload =
            serde_json::from_str(r#"{"settings": {"popupEnabled": true, "planTier": "pro"}}"#)
                .unwrap();
        assert!(payload.settings.unwrap().popup_enabled);
    }

    #[test]
    fn blank_product_id_is_absent() {
        let payload: ConfigPayload =
            serde_json::from_str(r#"{"settings": {}, "productId": "  "}"#).unwrap();
        assert_eq!(payload.effective_product_id(), None);
    }

    #[test]
    fn top_level_page_context_wins_over_settings_copy() {
        let payload: ConfigPayload = serde_json::from_str(
            r#"{"settings": {"pageType": "collection", "productId": "1"}, "pageType": "product", "productId": "2"}"#,
        )
        .unwrap();
        assert_eq!(payload.effective_page_type(), Some("product"));
        assert_eq!(payload.effective_product_id().as_deref(), Some("2"));
    }

    #[test]
    fn legacy_settings_page_context_is_used_when_top_level_absent() {
        let payload: ConfigPayload =
            serde_json::from_str(r#"{"settings": {"pageType": "product", "productId": 9}}"#)
                .unwrap();
        assert_eq!(payload.effective_page_type(), Some("product"));
        assert_eq!(payload.effective_product_id().as_deref(), Some("9"));
    }

    #[test]
    fn time_ago_prefers_server_string() {
        let activity = ActivityPayload {
            time_ago: Some("3 hours ago".to_string()),
            created_at: Some("2020-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert_eq!(activity.resolve_time_ago(Utc::now()), "3 hours ago");
    }

    #[test]
    fn time_ago_derived_from_created_at() {
        let now = Utc::now();
        let activity = ActivityPayload {
            created_at: Some((now - Duration::minutes(5)).to_rfc3339()),
            ..Default::default()
        };
        assert_eq!(activity.resolve_time_ago(now), "5 minutes ago");
    }

    #[test]
    fn time_ago_units() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now - Duration::seconds(20), now), "just now");
        assert_eq!(format_time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_time_ago(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(format_time_ago(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(format_time_ago(now - Duration::days(3), now), "3 days ago");
    }

    #[test]
    fn wrong_typed_presentation_fields_read_as_absent() {
        let payload: ConfigPayload = serde_json::from_str(
            r#"{
                "settings": {"popupEnabled": true, "popupPosition": null, "productId": 4.5},
                "productId": -3,
                "purchaseCount": -1
            }"#,
        )
        .unwrap();
        let settings = payload.settings.as_ref().unwrap();
        assert!(settings.popup_enabled);
        assert_eq!(settings.popup_position, DEFAULT_POSITION);
        assert_eq!(settings.product_id, None);
        assert_eq!(payload.product_id, None);
        assert_eq!(payload.purchase_count, None);
        assert_eq!(payload.effective_product_id(), None);
    }

    #[test]
    fn well_typed_presentation_fields_still_parse() {
        let payload: ConfigPayload = serde_json::from_str(
            r#"{"settings": {"popupPosition": "TOP_LEFT"}, "productId": "42", "purchaseCount": 9}"#,
        )
        .unwrap();
        assert_eq!(payload.settings.unwrap().popup_position, "TOP_LEFT");
        assert_eq!(payload.product_id, Some(ProductId::Text("42".to_string())));
        assert_eq!(payload.purchase_count, Some(9));
    }

    #[test]
    fn unparsable_created_at_yields_empty_string() {
        let activity = ActivityPayload {
            created_at: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert_eq!(activity.resolve_time_ago(Utc::now()), "");
    }
}
