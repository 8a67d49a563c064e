//! In-memory host page.
//!
//! `VirtualPage` is a flat, document-ordered list of elements that implements
//! [`Surface`] and records every mutation the engine makes. It backs the test
//! suite and the `popup-sim` binary.
//!
//! Fixture format:
//!
//! ```json
//! {
//!   "popupContainer": true,
//!   "elements": [
//!     { "tag": "form", "attrs": { "action": "/cart/add" } },
//!     { "tag": "button", "attrs": { "name": "add" }, "text": "Add to cart" }
//!   ]
//! }
//! ```

use serde::Deserialize;

use crate::render::{BadgeView, PopupView};
use crate::selector::{AnchorProbe, ElementInfo};
use crate::surface::{ElementId, Surface};
use crate::types::VisualState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFixture {
    #[serde(default = "default_true")]
    pub popup_container: bool,
    #[serde(default)]
    pub elements: Vec<ElementInfo>,
}

impl Default for PageFixture {
    fn default() -> Self {
        Self {
            popup_container: true,
            elements: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One recorded DOM change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PopupMounted { popup: ElementId, html: String },
    PopupState { popup: ElementId, state: VisualState },
    Removed { element: ElementId },
    BadgeInserted { badge: ElementId, anchor: ElementId },
    BadgeText { badge: ElementId, text: String },
    BadgeVisible { badge: ElementId, visible: bool },
}

#[derive(Debug, Clone)]
enum NodeKind {
    Static(ElementInfo),
    Popup { view: PopupView, state: VisualState },
    Badge { text: String, visible: bool },
}

#[derive(Debug, Clone)]
struct Node {
    id: ElementId,
    kind: NodeKind,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualPage {
    has_container: bool,
    nodes: Vec<Node>,
    next_id: u64,
    mutations: Vec<Mutation>,
}

impl VirtualPage {
    pub fn new(fixture: PageFixture) -> Self {
        let mut page = VirtualPage {
            has_container: fixture.popup_container,
            ..Default::default()
        };
        for element in fixture.elements {
            page.push_static(element);
        }
        page
    }

    /// A page with a popup container and nothing else.
    pub fn blank() -> Self {
        Self::new(PageFixture::default())
    }

    pub fn without_container() -> Self {
        Self::new(PageFixture {
            popup_container: false,
            elements: Vec::new(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<PageFixture>(raw).map(Self::new)
    }

    pub fn push_static(&mut self, element: ElementInfo) -> ElementId {
        let id = self.allocate();
        self.nodes.push(Node {
            id,
            kind: NodeKind::Static(element),
        });
        id
    }

    fn allocate(&mut self) -> ElementId {
        self.next_id += 1;
        ElementId(self.next_id)
    }

    fn node_mut(&mut self, id: ElementId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    /// Mounted popups in document order, with their visual state.
    pub fn popups(&self) -> Vec<(ElementId, VisualState, &PopupView)> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Popup { view, state } => Some((node.id, *state, view)),
                _ => None,
            })
            .collect()
    }

    pub fn popup_count(&self) -> usize {
        self.popups().len()
    }

    /// The badge's handle, current text, and visibility, if one is mounted.
    pub fn badge(&self) -> Option<(ElementId, &str, bool)> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::Badge { text, visible } => Some((node.id, text.as_str(), *visible)),
            _ => None,
        })
    }

    pub fn badge_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Badge { .. }))
            .count()
    }

    /// The element immediately after `id` in document order.
    pub fn next_sibling(&self, id: ElementId) -> Option<ElementId> {
        let index = self.nodes.iter().position(|node| node.id == id)?;
        self.nodes.get(index + 1).map(|node| node.id)
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }
}

impl Surface for VirtualPage {
    fn has_popup_container(&self) -> bool {
        self.has_container
    }

    fn mount_popup(&mut self, view: &PopupView, state: VisualState) -> ElementId {
        let id = self.allocate();
        self.nodes.push(Node {
            id,
            kind: NodeKind::Popup {
                view: view.clone(),
                state,
            },
        });
        self.mutations.push(Mutation::PopupMounted {
            popup: id,
            html: view.to_html(state),
        });
        id
    }

    fn set_popup_state(&mut self, popup: ElementId, new_state: VisualState) {
        let updated = match self.node_mut(popup) {
            Some(Node {
                kind: NodeKind::Popup { state, .. },
                ..
            }) => {
                *state = new_state;
                true
            }
            _ => false,
        };
        if updated {
            self.mutations.push(Mutation::PopupState {
                popup,
                state: new_state,
            });
        }
    }

    fn remove_element(&mut self, element: ElementId) {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != element);
        if self.nodes.len() != before {
            self.mutations.push(Mutation::Removed { element });
        }
    }

    fn find_element(&self, probe: &AnchorProbe) -> Option<ElementId> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::Static(info) if probe.matches(info) => Some(node.id),
            _ => None,
        })
    }

    fn insert_badge_after(&mut self, anchor: ElementId, view: &BadgeView, value: u64) -> ElementId {
        let id = self.allocate();
        let node = Node {
            id,
            kind: NodeKind::Badge {
                text: view.text(value),
                visible: false,
            },
        };
        match self.nodes.iter().position(|n| n.id == anchor) {
            Some(index) => self.nodes.insert(index + 1, node),
            None => self.nodes.push(node),
        }
        self.mutations.push(Mutation::BadgeInserted { badge: id, anchor });
        id
    }

    fn set_badge_text(&mut self, badge: ElementId, new_text: &str) {
        let updated = match self.node_mut(badge) {
            Some(Node {
                kind: NodeKind::Badge { text, .. },
                ..
            }) => {
                *text = new_text.to_string();
                true
            }
            _ => false,
        };
        if updated {
            self.mutations.push(Mutation::BadgeText {
                badge,
                text: new_text.to_string(),
            });
        }
    }

    fn set_badge_visible(&mut self, badge: ElementId, is_visible: bool) {
        let updated = match self.node_mut(badge) {
            Some(Node {
                kind: NodeKind::Badge { visible, .. },
                ..
            }) => {
                *visible = is_visible;
                true
            }
            _ => false,
        };
        if updated {
            self.mutations.push(Mutation::BadgeVisible {
                badge,
                visible: is_visible,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{default_anchor_probes, Selector};
    use crate::types::{Activity, PopupPosition};

    fn view() -> PopupView {
        PopupView::from_activity(
            &Activity {
                product_title: "Tee".to_string(),
                product_image: String::new(),
                city: "Paris".to_string(),
                time_ago: "just now".to_string(),
                product_url: None,
            },
            PopupPosition::BottomLeft,
        )
    }

    #[test]
    fn loads_fixture_json() {
        let page = VirtualPage::from_json(
            r#"{"elements": [{"tag": "button", "attrs": {"name": "add"}, "text": "Add to cart"}]}"#,
        )
        .unwrap();
        assert!(page.has_popup_container());
        let probe = AnchorProbe::Selector(Selector::parse(r#"button[name="add"]"#).unwrap());
        assert!(page.find_element(&probe).is_some());
    }

    #[test]
    fn fixture_can_omit_container() {
        let page = VirtualPage::from_json(r#"{"popupContainer": false}"#).unwrap();
        assert!(!page.has_popup_container());
    }

    #[test]
    fn mount_and_remove_popup() {
        let mut page = VirtualPage::blank();
        let id = page.mount_popup(&view(), VisualState::Entering);
        page.set_popup_state(id, VisualState::Visible);
        assert_eq!(page.popups()[0].1, VisualState::Visible);

        page.remove_element(id);
        page.remove_element(id);
        assert_eq!(page.popup_count(), 0);
        let removals = page
            .mutations()
            .iter()
            .filter(|m| matches!(m, Mutation::Removed { .. }))
            .count();
        assert_eq!(removals, 1);
    }

    #[test]
    fn badge_is_inserted_after_anchor() {
        let mut page = VirtualPage::blank();
        page.push_static(ElementInfo::new("h1").with_text("Tee"));
        let anchor = page.push_static(ElementInfo::new("button").with_text("Add to cart"));
        let after = page.push_static(ElementInfo::new("p"));

        let found = default_anchor_probes()
            .iter()
            .find_map(|probe| page.find_element(probe));
        assert_eq!(found, Some(anchor));

        let badge = page.insert_badge_after(anchor, &BadgeView::new("{count} sold"), 0);
        assert_eq!(page.next_sibling(anchor), Some(badge));
        assert_eq!(page.next_sibling(badge), Some(after));
        assert_eq!(page.badge(), Some((badge, "0 sold", false)));
    }

    #[test]
    fn mutations_on_unknown_elements_are_ignored() {
        let mut page = VirtualPage::blank();
        page.set_popup_state(ElementId(99), VisualState::Visible);
        page.set_badge_text(ElementId(99), "x");
        assert!(page.mutations().is_empty());
    }
}
