//! DOM ranges over a [`Document`].
//!
//! A boundary point inside a text node counts its offset in bytes; a boundary
//! point on any other node counts child positions, as DOM ranges do.

use std::collections::HashMap;

use crate::dom::{Document, NodeId};

/// Text under these elements is never part of what a reader can select.
const UNSELECTABLE: &[&str] = &["head", "script", "style", "noscript", "template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Boundary,
    pub end: Boundary,
}

impl Selection {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Deepest node that contains both boundary points.
    pub fn common_ancestor_container(&self, doc: &Document) -> NodeId {
        let mut start_chain = Vec::new();
        let mut current = Some(self.start.node);
        while let Some(node) = current {
            start_chain.push(node);
            current = doc.parent(node);
        }

        let mut current = Some(self.end.node);
        while let Some(node) = current {
            if start_chain.contains(&node) {
                return node;
            }
            current = doc.parent(node);
        }
        doc.root()
    }

    /// The selected text, concatenated across text nodes in document order.
    pub fn text(&self, doc: &Document) -> String {
        let order: HashMap<NodeId, usize> = doc
            .descendants(doc.root())
            .enumerate()
            .map(|(pos, node)| (node, pos))
            .collect();

        let (Some(start), Some(end)) = (
            position(doc, &order, self.start),
            position(doc, &order, self.end),
        ) else {
            return String::new();
        };

        let mut out = String::new();
        for node in doc.descendants(doc.root()) {
            let Some(text) = doc.text(node) else {
                continue;
            };
            let pos = order[&node];
            if pos < start.0 || pos > end.0 {
                continue;
            }
            let from = if pos == start.0 { start.1.min(text.len()) } else { 0 };
            let to = if pos == end.0 { end.1.min(text.len()) } else { text.len() };
            if from < to {
                if let Some(slice) = text.get(from..to) {
                    out.push_str(slice);
                }
            }
        }
        out
    }

    /// Builds the selection a reader would make by dragging over the
    /// `occurrence`-th (1-based) appearance of `needle` in the visible text.
    pub fn find_text(doc: &Document, needle: &str, occurrence: usize) -> Option<Selection> {
        if needle.is_empty() || occurrence == 0 {
            return None;
        }

        let mut flat = String::new();
        let mut spans: Vec<(NodeId, usize)> = Vec::new();
        for node in doc.descendants(doc.root()) {
            let Some(text) = doc.text(node) else {
                continue;
            };
            if !is_selectable(doc, node) {
                continue;
            }
            spans.push((node, flat.len()));
            flat.push_str(text);
        }

        let (start, _) = flat.match_indices(needle).nth(occurrence - 1)?;
        let end = start + needle.len();

        let (start_node, start_base) = spans
            .iter()
            .rev()
            .find(|(node, base)| *base <= start && start < base + text_len(doc, *node))
            .copied()?;
        let (end_node, end_base) = spans
            .iter()
            .find(|(node, base)| *base < end && end <= base + text_len(doc, *node))
            .copied()?;

        Some(Selection::new(
            Boundary::new(start_node, start - start_base),
            Boundary::new(end_node, end - end_base),
        ))
    }
}

fn text_len(doc: &Document, node: NodeId) -> usize {
    doc.text(node).map_or(0, str::len)
}

fn is_selectable(doc: &Document, node: NodeId) -> bool {
    let mut current = doc.parent(node);
    while let Some(ancestor) = current {
        if doc
            .tag_name(ancestor)
            .is_some_and(|tag| UNSELECTABLE.contains(&tag))
        {
            return false;
        }
        current = doc.parent(ancestor);
    }
    true
}

/// Maps a boundary point onto (pre-order position, offset within that node).
fn position(
    doc: &Document,
    order: &HashMap<NodeId, usize>,
    boundary: Boundary,
) -> Option<(usize, usize)> {
    if doc.is_text(boundary.node) {
        return order.get(&boundary.node).map(|pos| (*pos, boundary.offset));
    }

    let children = doc.children(boundary.node);
    match children.get(boundary.offset) {
        Some(child) => order.get(child).map(|pos| (*pos, 0)),
        None => {
            // past the last child: just after the subtree's last node
            let last = doc.descendants(boundary.node).last()?;
            order.get(&last).map(|pos| (*pos + 1, 0))
        }
    }
}
