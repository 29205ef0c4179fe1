//! Arena-backed HTML document.
//!
//! Every node lives in one flat `Vec` and refers to its parent and children by
//! [`NodeId`]. Removing a node only detaches it from its parent, so a `NodeId`
//! handed out earlier stays valid but no longer resolves from the root.

use scraper::Html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text the parser keeps verbatim. `noscript` is included
/// because documents are parsed with scripting enabled.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(Doctype),
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    pub name: String,
    pub public_id: String,
    pub system_id: String,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parses a full HTML page. The HTML parser repairs the tree the way a
    /// browser would, so `<html>`, `<head>` and `<body>` are always present.
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Document::new();

        let mut pending = vec![(parsed.tree.root(), doc.root())];
        while let Some((source, target)) = pending.pop() {
            for child in source.children() {
                let kind = match child.value() {
                    scraper::Node::Element(el) => NodeKind::Element(Element {
                        tag: el.name().to_string(),
                        attrs: el
                            .attrs
                            .iter()
                            .map(|(name, value)| {
                                let local: &str = &name.local;
                                // foreign attributes such as xlink:href keep their prefix
                                let name = match &name.prefix {
                                    Some(prefix) => format!("{}:{}", &**prefix, local),
                                    None => local.to_string(),
                                };
                                (name, value.to_string())
                            })
                            .collect(),
                    }),
                    scraper::Node::Text(text) => NodeKind::Text(text.to_string()),
                    scraper::Node::Comment(comment) => NodeKind::Comment(comment.to_string()),
                    scraper::Node::Doctype(doctype) => NodeKind::Doctype(Doctype {
                        name: doctype.name().to_string(),
                        public_id: doctype.public_id().to_string(),
                        system_id: doctype.system_id().to_string(),
                    }),
                    _ => continue,
                };
                let id = doc.push(kind, target);
                pending.push((child, id));
            }
        }

        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn push(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.push(NodeKind::Element(Element::new(tag)), parent)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()), parent)
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(NodeKind::Comment(text.to_string()), parent)
    }

    /// Unlinks `node` (and its subtree) from the tree.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|child| *child != node);
        }
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.node(node).kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.node(node).kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.index()].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.node(node).kind, NodeKind::Element(_))
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.node(node).kind, NodeKind::Text(_))
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|el| el.attr(name))
    }

    /// Sets an attribute. Returns `false` when `node` is not an element.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        match self.element_mut(node) {
            Some(el) => {
                el.set_attr(name, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.element_mut(node).and_then(|el| el.remove_attr(name))
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root()
    }

    /// Pre-order walk of `node` and everything below it.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![node],
        }
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn title(&self) -> Option<String> {
        let title = self
            .descendants(self.root())
            .find(|n| self.tag_name(*n) == Some("title"))?;
        let text = self.text_content(title);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|n| self.attr(*n, "id") == Some(id))
    }

    pub fn find_by_attr(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|n| self.attr(*n, name) == Some(value))
            .collect()
    }

    pub fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attr(node, "style")?;
        parse_style(style)
            .into_iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    pub fn set_style_property(&mut self, node: NodeId, property: &str, value: &str) {
        let mut decls = self.attr(node, "style").map(parse_style).unwrap_or_default();
        match decls.iter_mut().find(|(name, _)| name == property) {
            Some((_, existing)) => *existing = value.to_string(),
            None => decls.push((property.to_string(), value.to_string())),
        }
        self.set_attr(node, "style", &render_style(&decls));
    }

    pub fn remove_style_property(&mut self, node: NodeId, property: &str) {
        let Some(style) = self.attr(node, "style") else {
            return;
        };
        let decls: Vec<_> = parse_style(style)
            .into_iter()
            .filter(|(name, _)| name != property)
            .collect();
        if decls.is_empty() {
            self.remove_attr(node, "style");
        } else {
            self.set_attr(node, "style", &render_style(&decls));
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(&doctype.name);
                if !doctype.public_id.is_empty() {
                    out.push_str(" PUBLIC \"");
                    out.push_str(&doctype.public_id);
                    out.push('"');
                    if !doctype.system_id.is_empty() {
                        out.push_str(" \"");
                        out.push_str(&doctype.system_id);
                        out.push('"');
                    }
                } else if !doctype.system_id.is_empty() {
                    out.push_str(" SYSTEM \"");
                    out.push_str(&doctype.system_id);
                    out.push('"');
                }
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                let raw = self
                    .parent(node)
                    .and_then(|p| self.tag_name(p))
                    .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for child in self.children(node) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(node).iter().rev().copied());
        Some(node)
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            (!name.is_empty()).then(|| (name, value.trim().to_string()))
        })
        .collect()
}

fn render_style(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(name, value)| format!("{}: {};", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repairs_missing_html_and_body() {
        let doc = Document::parse_html("<p>hello</p>");
        let html = doc.element_children(doc.root()).next().unwrap();
        assert_eq!(doc.tag_name(html), Some("html"));

        let tags: Vec<_> = doc
            .element_children(html)
            .map(|n| doc.tag_name(n).unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["head", "body"]);
    }

    #[test]
    fn parse_keeps_attributes_and_text() {
        let doc = Document::parse_html(
            r#"<html><head><title> Notes </title></head><body><div id="main" class="x">a &amp; b</div></body></html>"#,
        );
        let div = doc.find_by_id("main").unwrap();
        assert_eq!(doc.attr(div, "class"), Some("x"));
        assert_eq!(doc.text_content(div), "a & b");
        assert_eq!(doc.title().as_deref(), Some("Notes"));
    }

    #[test]
    fn serializes_with_escaping() {
        let doc = Document::parse_html(
            r#"<!DOCTYPE html><html><head></head><body><p title="say &quot;hi&quot;">1 &lt; 2</p><br></body></html>"#,
        );
        assert_eq!(
            doc.to_html(),
            r#"<!DOCTYPE html><html><head></head><body><p title="say &quot;hi&quot;">1 &lt; 2</p><br></body></html>"#
        );
    }

    #[test]
    fn reparsing_serialized_html_is_stable() {
        let source = r##"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"><html><head><noscript><link rel="stylesheet" href="a.css"></noscript></head><body><svg xml:lang="en"><use xlink:href="#icon"></use></svg><iframe><b>x</b></iframe><p>fish &amp; chips</p></body></html>"##;

        let once = Document::parse_html(source).to_html();
        assert!(once.starts_with(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#
        ));
        assert!(once.contains(r#"<noscript><link rel="stylesheet" href="a.css"></noscript>"#));
        assert!(once.contains(r##"xlink:href="#icon""##));
        assert!(once.contains(r#"xml:lang="en""#));
        assert!(once.contains("<iframe><b>x</b></iframe>"));
        assert!(once.contains("fish &amp; chips"));

        let twice = Document::parse_html(&once).to_html();
        assert_eq!(twice, once);
    }

    #[test]
    fn style_properties_are_edited_in_place() {
        let mut doc = Document::new();
        let p = doc.append_element(doc.root(), "p");
        doc.set_attr(p, "style", "color: red; display: inline");

        doc.set_style_property(p, "display", "block");
        doc.set_style_property(p, "background-color", "yellow");
        assert_eq!(
            doc.attr(p, "style"),
            Some("color: red; display: block; background-color: yellow;")
        );
        assert_eq!(doc.style_property(p, "display").as_deref(), Some("block"));

        doc.remove_style_property(p, "color");
        doc.remove_style_property(p, "display");
        doc.remove_style_property(p, "background-color");
        assert_eq!(doc.attr(p, "style"), None);
    }

    #[test]
    fn detached_nodes_are_unreachable_from_root() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div");
        let p = doc.append_element(div, "p");
        assert!(doc.is_attached(p));

        doc.detach(div);
        assert!(!doc.is_attached(p));
        assert!(doc.descendants(doc.root()).all(|n| n != p));
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let mut doc = Document::new();
        let a = doc.append_element(doc.root(), "a");
        let b = doc.append_element(a, "b");
        let c = doc.append_element(doc.root(), "c");
        let order: Vec<_> = doc.descendants(doc.root()).collect();
        assert_eq!(order, vec![doc.root(), a, b, c]);
    }
}
