//! Configuration loading.
//!
//! Two kinds of configuration live here:
//! - The per-page payload (settings + activity feed) delivered by the server,
//!   validated into [`LoadedConfig`].
//! - [`EngineOptions`], the engine's own tunables (thresholds, animation
//!   timings, storage key), which have sane defaults and are usually left alone.

use crate::error::{EngineError, Result};
use crate::types::{Activity, PageContext, PopupPosition, Settings};
use chrono::{DateTime, Utc};
use sales_popup_protocol::{ConfigPayload, MAX_PAYLOAD_BYTES};
use serde::Deserialize;
use std::time::Duration;

/// Explicit user closes after which popups stop for this browser.
pub const DISMISSAL_THRESHOLD: u32 = 3;

/// Key the dismissal counter is stored under. Nothing else uses it.
pub const DISMISSAL_STORAGE_KEY: &str = "salesPopupDismissCount";

pub const DEFAULT_COUNTER_LABEL: &str = "{count} people bought this recently";

/// A validated payload: typed settings plus the activity feed in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub settings: Settings,
    pub activities: Vec<Activity>,
    pub purchase_count: Option<u64>,
}

/// Parses and validates a raw JSON payload.
pub fn load_config(raw: &str) -> Result<LoadedConfig> {
    load_config_at(raw, Utc::now())
}

/// Same as [`load_config`], with an explicit clock for `timeAgo` derivation.
pub fn load_config_at(raw: &str, now: DateTime<Utc>) -> Result<LoadedConfig> {
    if raw.trim().is_empty() {
        return Err(EngineError::config("payload is empty"));
    }
    if raw.len() > MAX_PAYLOAD_BYTES {
        return Err(EngineError::config(format!(
            "payload is {} bytes (limit {})",
            raw.len(),
            MAX_PAYLOAD_BYTES
        )));
    }

    let payload: ConfigPayload = serde_json::from_str(raw)
        .map_err(|e| EngineError::config(format!("payload is not valid JSON: {}", e)))?;

    from_payload(&payload, now)
}

/// Validates an already-deserialized payload.
pub fn from_payload(payload: &ConfigPayload, now: DateTime<Utc>) -> Result<LoadedConfig> {
    let raw_settings = payload
        .settings
        .as_ref()
        .ok_or_else(|| EngineError::config("payload has no settings"))?;

    let popup_delay = seconds("popupDelay", raw_settings.popup_delay)?;
    let display_duration = seconds("displayDuration", raw_settings.display_duration)?;

    let settings = Settings {
        popup_enabled: raw_settings.popup_enabled,
        counter_enabled: raw_settings.counter_enabled,
        popup_position: PopupPosition::from_setting(&raw_settings.popup_position),
        popup_delay,
        display_duration,
        counter_label: raw_settings
            .counter_label
            .clone()
            .filter(|label| !label.trim().is_empty()),
        page: PageContext {
            page_type: payload.effective_page_type().unwrap_or_default().to_string(),
            product_id: payload.effective_product_id(),
        },
    };

    let activities = payload
        .activities
        .iter()
        .map(|activity| Activity {
            product_title: activity.product_title.clone(),
            product_image: activity.product_image.clone(),
            city: activity.city.clone(),
            time_ago: activity.resolve_time_ago(now),
            product_url: activity
                .product_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
        })
        .collect();

    Ok(LoadedConfig {
        settings,
        activities,
        purchase_count: payload.purchase_count,
    })
}

/// Timing values are used as given. Only values a `Duration` cannot hold
/// (negative, NaN, infinite) are rejected.
fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| EngineError::config(format!("{} is not a usable number of seconds: {}", field, value)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine tunables. Deserializable so embedders can load them from a file;
/// every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub dismissal_threshold: u32,
    pub storage_key: String,
    pub exit_animation_ms: u64,
    pub count_up_duration_ms: u64,
    pub frame_interval_ms: u64,
    pub visibility_threshold: f64,
    pub counter_label: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dismissal_threshold: DISMISSAL_THRESHOLD,
            storage_key: DISMISSAL_STORAGE_KEY.to_string(),
            exit_animation_ms: 300,
            count_up_duration_ms: 1500,
            frame_interval_ms: 16,
            visibility_threshold: 0.5,
            counter_label: DEFAULT_COUNTER_LABEL.to_string(),
        }
    }
}

impl EngineOptions {
    /// Never zero, so a hide always completes on a later tick.
    pub fn exit_animation(&self) -> Duration {
        Duration::from_millis(self.exit_animation_ms.max(1))
    }

    pub fn count_up_duration(&self) -> Duration {
        Duration::from_millis(self.count_up_duration_ms)
    }

    /// One paint frame. Never zero, so a frame is always a later turn.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}
