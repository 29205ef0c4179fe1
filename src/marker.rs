//! The single "currently displayed" highlight of a document.
//!
//! A [`MarkerSlot`] owns the marker: at most one element holds it, acquiring
//! it for a new element releases the previous holder first, and releasing
//! puts back the `id` and `style` the element had before it was marked.

use crate::dom::{Document, NodeId};

pub const MARKER_ATTR: &str = "data-highlighted";
pub const MARKER_ID: &str = "currHighlight";
pub const DEFAULT_COLOR: &str = "yellow";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Restore {
    Snapshot {
        id: Option<String>,
        style: Option<String>,
    },
    /// Marked before the slot existed (e.g. a saved page); the prior state
    /// is unknown so only marker styling is removed.
    Strip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Held {
    node: NodeId,
    restore: Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    AlreadyHeld,
    Acquired { released: Option<NodeId> },
}

#[derive(Debug, Clone, Default)]
pub struct MarkerSlot {
    held: Option<Held>,
}

impl MarkerSlot {
    /// Takes over marker state already present in `doc`. The first marked
    /// element keeps the marker; other marked elements are stripped and any
    /// other element carrying the marker id loses it.
    pub fn adopt(doc: &mut Document) -> Self {
        let mut marked = doc.find_by_attr(MARKER_ATTR, "true").into_iter();
        let held = marked.next().map(|node| Held {
            node,
            restore: Restore::Strip,
        });
        for stray in marked {
            tracing::warn!(node = stray.index(), "stripping extra highlight marker");
            strip(doc, stray);
        }

        let holder = held.as_ref().map(|held| held.node);
        let stray_ids: Vec<NodeId> = doc
            .descendants(doc.root())
            .filter(|node| Some(*node) != holder && doc.attr(*node, "id") == Some(MARKER_ID))
            .collect();
        for stray in stray_ids {
            tracing::warn!(node = stray.index(), "removing stray marker id");
            doc.remove_attr(stray, "id");
        }
        Self { held }
    }

    pub fn holder(&self) -> Option<NodeId> {
        self.held.as_ref().map(|held| held.node)
    }

    pub fn acquire(&mut self, doc: &mut Document, node: NodeId, color: &str) -> Acquire {
        if self.holder() == Some(node) {
            return Acquire::AlreadyHeld;
        }

        let released = self.release(doc);
        let restore = Restore::Snapshot {
            id: doc.attr(node, "id").map(str::to_string),
            style: doc.attr(node, "style").map(str::to_string),
        };

        doc.set_style_property(node, "background-color", color);
        doc.set_style_property(node, "display", "block");
        doc.set_attr(node, MARKER_ATTR, "true");
        doc.set_attr(node, "id", MARKER_ID);

        self.held = Some(Held { node, restore });
        Acquire::Acquired { released }
    }

    pub fn release(&mut self, doc: &mut Document) -> Option<NodeId> {
        let held = self.held.take()?;
        match held.restore {
            Restore::Snapshot { id, style } => {
                doc.remove_attr(held.node, MARKER_ATTR);
                restore_attr(doc, held.node, "id", id);
                restore_attr(doc, held.node, "style", style);
            }
            Restore::Strip => strip(doc, held.node),
        }
        Some(held.node)
    }
}

fn restore_attr(doc: &mut Document, node: NodeId, name: &str, value: Option<String>) {
    match value {
        Some(value) => {
            doc.set_attr(node, name, &value);
        }
        None => {
            doc.remove_attr(node, name);
        }
    }
}

fn strip(doc: &mut Document, node: NodeId) {
    doc.remove_style_property(node, "background-color");
    doc.remove_style_property(node, "background");
    doc.remove_style_property(node, "display");
    doc.remove_attr(node, MARKER_ATTR);
    if doc.attr(node, "id") == Some(MARKER_ID) {
        doc.remove_attr(node, "id");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_paragraphs() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.append_element(doc.root(), "body");
        let first = doc.append_element(body, "p");
        let second = doc.append_element(body, "p");
        doc.set_attr(second, "id", "intro");
        doc.set_attr(second, "style", "color: red;");
        (doc, first, second)
    }

    #[test]
    fn acquire_marks_the_node() {
        let (mut doc, first, _) = two_paragraphs();
        let mut slot = MarkerSlot::default();

        assert_eq!(
            slot.acquire(&mut doc, first, DEFAULT_COLOR),
            Acquire::Acquired { released: None }
        );
        assert_eq!(doc.attr(first, MARKER_ATTR), Some("true"));
        assert_eq!(doc.attr(first, "id"), Some(MARKER_ID));
        assert_eq!(doc.style_property(first, "background-color").as_deref(), Some("yellow"));
        assert_eq!(doc.style_property(first, "display").as_deref(), Some("block"));
        assert_eq!(slot.acquire(&mut doc, first, DEFAULT_COLOR), Acquire::AlreadyHeld);
    }

    #[test]
    fn moving_the_marker_restores_the_previous_holder() {
        let (mut doc, first, second) = two_paragraphs();
        let before = doc.to_html();
        let mut slot = MarkerSlot::default();

        slot.acquire(&mut doc, second, "orange");
        assert_eq!(
            slot.acquire(&mut doc, first, DEFAULT_COLOR),
            Acquire::Acquired {
                released: Some(second)
            }
        );
        assert_eq!(doc.attr(second, "id"), Some("intro"));
        assert_eq!(doc.attr(second, "style"), Some("color: red;"));
        assert_eq!(doc.find_by_attr(MARKER_ATTR, "true"), vec![first]);

        assert_eq!(slot.release(&mut doc), Some(first));
        assert_eq!(slot.release(&mut doc), None);
        assert_eq!(doc.to_html(), before);
    }

    #[test]
    fn adopt_keeps_one_marker_and_strips_the_rest() {
        let mut doc = Document::parse_html(
            r#"<body><p id="currHighlight" data-highlighted="true" style="background-color: yellow; display: block;">a</p><p data-highlighted="true" style="display: block; color: blue;">b</p></body>"#,
        );
        let marked = doc.find_by_attr(MARKER_ATTR, "true");
        assert_eq!(marked.len(), 2);

        let mut slot = MarkerSlot::adopt(&mut doc);
        assert_eq!(slot.holder(), Some(marked[0]));
        assert_eq!(doc.find_by_attr(MARKER_ATTR, "true"), vec![marked[0]]);
        assert_eq!(doc.attr(marked[1], "style"), Some("color: blue;"));

        slot.release(&mut doc);
        assert!(doc.find_by_attr(MARKER_ATTR, "true").is_empty());
        assert_eq!(doc.attr(marked[0], "id"), None);
        assert_eq!(doc.attr(marked[0], "style"), None);
    }

    #[test]
    fn adopt_drops_a_stray_marker_id() {
        let mut doc = Document::parse_html(
            r#"<body><p id="currHighlight">a</p><p>b</p></body>"#,
        );
        let stray = doc.find_by_id(MARKER_ID).unwrap();
        let other = doc.element_children(doc.parent(stray).unwrap()).nth(1).unwrap();

        let mut slot = MarkerSlot::adopt(&mut doc);
        assert_eq!(slot.holder(), None);
        assert_eq!(doc.attr(stray, "id"), None);

        slot.acquire(&mut doc, other, DEFAULT_COLOR);
        let with_id: Vec<NodeId> = doc
            .descendants(doc.root())
            .filter(|node| doc.attr(*node, "id") == Some(MARKER_ID))
            .collect();
        assert_eq!(with_id, vec![other]);
    }
}
