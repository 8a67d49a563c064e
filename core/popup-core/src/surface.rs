//! The host page seam.
//!
//! The engine never touches a DOM directly. Everything it needs from the page
//! (a popup container, an anchor for the badge, and somewhere to put elements)
//! goes through [`Surface`]. Browsers implement it over `web_sys`; tests and
//! the simulator use [`crate::page::VirtualPage`].

use crate::render::{BadgeView, PopupView};
use crate::selector::AnchorProbe;
use crate::types::VisualState;

/// Opaque handle to an element owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

pub trait Surface {
    /// Whether the designated popup container exists.
    fn has_popup_container(&self) -> bool;

    /// Inserts a popup into the container and returns its handle.
    fn mount_popup(&mut self, view: &PopupView, state: VisualState) -> ElementId;

    fn set_popup_state(&mut self, popup: ElementId, state: VisualState);

    /// Removes an element. Removing an unknown or already-removed element is
    /// a no-op.
    fn remove_element(&mut self, element: ElementId);

    /// First element in document order matching `probe`.
    fn find_element(&self, probe: &AnchorProbe) -> Option<ElementId>;

    /// Inserts the badge as the next sibling of `anchor`.
    fn insert_badge_after(&mut self, anchor: ElementId, view: &BadgeView, value: u64)
        -> ElementId;

    fn set_badge_text(&mut self, badge: ElementId, text: &str);

    fn set_badge_visible(&mut self, badge: ElementId, visible: bool);
}
