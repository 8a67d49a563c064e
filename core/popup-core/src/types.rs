//! Core types shared by every engine component.
//!
//! Everything here is produced once by the config loader and is immutable for
//! the rest of the page view.

use std::fmt;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Screen corner the popup is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PopupPosition {
    #[default]
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

impl PopupPosition {
    /// Parses the admin value. Anything unrecognized becomes `BottomLeft`.
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "BOTTOM_LEFT" => PopupPosition::BottomLeft,
            "BOTTOM_RIGHT" => PopupPosition::BottomRight,
            "TOP_LEFT" => PopupPosition::TopLeft,
            "TOP_RIGHT" => PopupPosition::TopRight,
            _ => PopupPosition::BottomLeft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PopupPosition::BottomLeft => "BOTTOM_LEFT",
            PopupPosition::BottomRight => "BOTTOM_RIGHT",
            PopupPosition::TopLeft => "TOP_LEFT",
            PopupPosition::TopRight => "TOP_RIGHT",
        }
    }

    /// CSS modifier class used by the storefront stylesheet.
    pub fn css_class(&self) -> &'static str {
        match self {
            PopupPosition::BottomLeft => "sp-popup--bottom-left",
            PopupPosition::BottomRight => "sp-popup--bottom-right",
            PopupPosition::TopLeft => "sp-popup--top-left",
            PopupPosition::TopRight => "sp-popup--top-right",
        }
    }
}

impl fmt::Display for PopupPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated per-page settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub popup_enabled: bool,
    pub counter_enabled: bool,
    pub popup_position: PopupPosition,
    pub popup_delay: Duration,
    pub display_duration: Duration,
    pub counter_label: Option<String>,
    pub page: PageContext,
}

/// Where the engine is running.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageContext {
    pub page_type: String,
    pub product_id: Option<String>,
}

impl PageContext {
    pub fn is_product_page(&self) -> bool {
        self.page_type.eq_ignore_ascii_case("product")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity Feed
// ═══════════════════════════════════════════════════════════════════════════════

/// One display-ready purchase event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub product_title: String,
    pub product_image: String,
    pub city: String,
    pub time_ago: String,
    pub product_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lifecycle States
// ═══════════════════════════════════════════════════════════════════════════════

/// Popup scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Idle,
    Waiting,
    Showing,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Waiting => "waiting",
            SchedulerState::Showing => "showing",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Visual sub-state of a mounted popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualState {
    Entering,
    Visible,
    Exiting,
    Removed,
}

impl VisualState {
    pub fn css_class(&self) -> &'static str {
        match self {
            VisualState::Entering => "sp-popup--entering",
            VisualState::Visible => "sp-popup--visible",
            VisualState::Exiting => "sp-popup--exiting",
            VisualState::Removed => "sp-popup--removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_positions_parse() {
        assert_eq!(PopupPosition::from_setting("TOP_RIGHT"), PopupPosition::TopRight);
        assert_eq!(PopupPosition::from_setting("top_left"), PopupPosition::TopLeft);
        assert_eq!(
            PopupPosition::from_setting(" BOTTOM_RIGHT "),
            PopupPosition::BottomRight
        );
    }

    #[test]
    fn unknown_position_falls_back_to_bottom_left() {
        assert_eq!(PopupPosition::from_setting("MIDDLE"), PopupPosition::BottomLeft);
        assert_eq!(PopupPosition::from_setting(""), PopupPosition::BottomLeft);
    }

    #[test]
    fn product_page_detection_is_case_insensitive() {
        let page = PageContext {
            page_type: "Product".to_string(),
            product_id: Some("1".to_string()),
        };
        assert!(page.is_product_page());
        assert!(!PageContext::default().is_product_page());
    }
}
