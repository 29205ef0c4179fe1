//! Locator codec.
//!
//! A [`Locator`] is an XPath-like path that finds an element again on a later
//! visit. Encoding always targets an element: a text node is replaced by its
//! parent, so the exact selected span is not recoverable from a locator.
//!
//! The decoder understands the subset of XPath the encoder writes, plus `//`
//! steps and `*` name tests:
//!
//! ```text
//! path      := step+
//! step      := ("/" | "//") (name | "*") predicate*
//! predicate := "[" integer "]" | "[" "@" name "=" quoted "]"
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId, NodeKind};
use crate::error::{HiliteError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes the path to `node`, anchoring at the nearest ancestor-or-self that
/// carries a usable `id`.
pub fn encode(doc: &Document, node: NodeId) -> Result<Locator> {
    let mut current = match doc.kind(node) {
        NodeKind::Element(_) => node,
        NodeKind::Text(_) | NodeKind::Comment(_) => doc
            .parent(node)
            .filter(|parent| doc.is_element(*parent))
            .ok_or(HiliteError::Unlocatable("text outside of any element"))?,
        NodeKind::Document | NodeKind::Doctype(_) => {
            return Err(HiliteError::Unlocatable("not an element"));
        }
    };
    if !doc.is_attached(current) {
        return Err(HiliteError::Unlocatable("node is detached from the document"));
    }

    let mut segments = Vec::new();
    loop {
        if let Some(anchor) = doc.attr(current, "id").and_then(id_anchor) {
            segments.push(anchor);
            break;
        }

        let tag = doc.tag_name(current).unwrap_or_default();
        segments.push(format!("{}[{}]", tag, same_tag_ordinal(doc, current)));

        match doc.parent(current) {
            Some(parent) if doc.is_element(parent) => current = parent,
            Some(parent) if parent == doc.root() => {
                // empty leading segment makes the joined path absolute
                segments.push(String::new());
                break;
            }
            _ => return Err(HiliteError::Unlocatable("node is not under the document root")),
        }
    }

    segments.reverse();
    Ok(Locator(segments.join("/")))
}

/// Resolves `locator` to the first matching element in document order.
/// `Ok(None)` means the locator is well-formed but stale.
pub fn decode(locator: &Locator, doc: &Document) -> Result<Option<NodeId>> {
    let steps = parse(locator.as_str())?;

    let order: HashMap<NodeId, usize> = doc
        .descendants(doc.root())
        .enumerate()
        .map(|(pos, node)| (node, pos))
        .collect();

    let mut context = vec![doc.root()];
    for step in &steps {
        let mut matched = Vec::new();
        for ctx in &context {
            let bases: Vec<NodeId> = match step.axis {
                Axis::Child => vec![*ctx],
                Axis::Descendant => doc
                    .descendants(*ctx)
                    .filter(|n| *n == doc.root() || doc.is_element(*n))
                    .collect(),
            };
            for base in bases {
                matched.extend(step.select(doc, base));
            }
        }

        matched.sort_by_key(|node| order.get(node).copied().unwrap_or(usize::MAX));
        matched.dedup();
        context = matched;
        if context.is_empty() {
            return Ok(None);
        }
    }

    Ok(context.first().copied())
}

fn id_anchor(id: &str) -> Option<String> {
    if id.is_empty() {
        None
    } else if !id.contains('"') {
        Some(format!("//*[@id=\"{}\"]", id))
    } else if !id.contains('\'') {
        Some(format!("//*[@id='{}']", id))
    } else {
        None
    }
}

fn same_tag_ordinal(doc: &Document, node: NodeId) -> usize {
    let Some(parent) = doc.parent(node) else {
        return 1;
    };
    let tag = doc.tag_name(node);
    let preceding = doc
        .element_children(parent)
        .take_while(|sibling| *sibling != node)
        .filter(|sibling| doc.tag_name(*sibling) == tag)
        .count();
    preceding + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    AttrEquals { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

impl Step {
    fn select(&self, doc: &Document, base: NodeId) -> Vec<NodeId> {
        let mut candidates: Vec<NodeId> = doc
            .element_children(base)
            .filter(|child| match &self.test {
                NameTest::Any => true,
                NameTest::Tag(tag) => doc.tag_name(*child) == Some(tag.as_str()),
            })
            .collect();

        for predicate in &self.predicates {
            candidates = match predicate {
                Predicate::Position(pos) => candidates.get(pos - 1).copied().into_iter().collect(),
                Predicate::AttrEquals { name, value } => candidates
                    .into_iter()
                    .filter(|node| doc.attr(*node, name) == Some(value.as_str()))
                    .collect(),
            };
        }
        candidates
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

fn parse(path: &str) -> Result<Vec<Step>> {
    let mut parser = Parser { src: path, pos: 0 };
    let mut steps = Vec::new();

    if path.is_empty() {
        return Err(parser.error("empty path"));
    }

    while !parser.at_end() {
        let axis = if parser.eat("//") {
            Axis::Descendant
        } else if parser.eat("/") {
            Axis::Child
        } else {
            return Err(parser.error("expected '/'"));
        };

        let test = if parser.eat("*") {
            NameTest::Any
        } else {
            let name = parser.name();
            if name.is_empty() {
                return Err(parser.error("expected a tag name or '*'"));
            }
            NameTest::Tag(name.to_ascii_lowercase())
        };

        let mut predicates = Vec::new();
        while parser.eat("[") {
            parser.skip_ws();
            let predicate = if parser.eat("@") {
                let name = parser.name().to_string();
                if name.is_empty() {
                    return Err(parser.error("expected an attribute name"));
                }
                parser.skip_ws();
                if !parser.eat("=") {
                    return Err(parser.error("expected '='"));
                }
                parser.skip_ws();
                let value = parser.quoted()?;
                Predicate::AttrEquals { name, value }
            } else {
                let digits = parser.take_while(|c| c.is_ascii_digit());
                match digits.parse::<usize>() {
                    Ok(pos) if pos > 0 => Predicate::Position(pos),
                    _ => return Err(parser.error("expected a positive index")),
                }
            };
            parser.skip_ws();
            if !parser.eat("]") {
                return Err(parser.error("expected ']'"));
            }
            predicates.push(predicate);
        }

        steps.push(Step {
            axis,
            test,
            predicates,
        });
    }

    Ok(steps)
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn name(&mut self) -> &'a str {
        self.take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn quoted(&mut self) -> Result<String> {
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted value")),
        };
        self.pos += 1;
        let rest = self.rest();
        let Some(len) = rest.find(quote) else {
            return Err(self.error("unterminated quoted value"));
        };
        self.pos += len + 1;
        Ok(rest[..len].to_string())
    }

    fn error(&self, reason: &str) -> HiliteError {
        HiliteError::InvalidLocator {
            locator: self.src.to_string(),
            reason: format!("{} at offset {}", reason, self.pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs() -> Document {
        Document::parse_html(
            "<html><body><div><p>one</p><p>two</p><p>three <i>3</i></p></div><div id=\"side\"><p>aside</p></div></body></html>",
        )
    }

    fn third_paragraph(doc: &Document) -> NodeId {
        doc.descendants(doc.root())
            .filter(|n| doc.tag_name(*n) == Some("p"))
            .nth(2)
            .unwrap()
    }

    #[test]
    fn encodes_ordinal_path_for_third_paragraph() {
        let doc = paragraphs();
        let p = third_paragraph(&doc);
        let locator = encode(&doc, p).unwrap();
        assert_eq!(locator.as_str(), "/html[1]/body[1]/div[1]/p[3]");
        assert_eq!(decode(&locator, &doc).unwrap(), Some(p));
    }

    #[test]
    fn text_nodes_encode_as_their_parent_element() {
        let doc = paragraphs();
        let p = third_paragraph(&doc);
        let text = doc.children(p)[0];
        assert!(doc.is_text(text));
        assert_eq!(encode(&doc, text).unwrap(), encode(&doc, p).unwrap());
    }

    #[test]
    fn descendant_form_resolves_the_same_paragraph() {
        let doc = paragraphs();
        let locator = Locator::new("//div[1]/p[3]");
        assert_eq!(decode(&locator, &doc).unwrap(), Some(third_paragraph(&doc)));
    }

    #[test]
    fn prefers_id_anchor_over_ordinal_path() {
        let doc = paragraphs();
        let side = doc.find_by_id("side").unwrap();
        assert_eq!(encode(&doc, side).unwrap().as_str(), r#"//*[@id="side"]"#);

        let aside = doc.element_children(side).next().unwrap();
        let locator = encode(&doc, aside).unwrap();
        assert_eq!(locator.as_str(), r#"//*[@id="side"]/p[1]"#);
        assert_eq!(decode(&locator, &doc).unwrap(), Some(aside));
    }

    #[test]
    fn ids_with_double_quotes_use_single_quoted_anchor() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div");
        doc.set_attr(div, "id", r#"say "hi""#);
        let locator = encode(&doc, div).unwrap();
        assert_eq!(locator.as_str(), r#"//*[@id='say "hi"']"#);
        assert_eq!(decode(&locator, &doc).unwrap(), Some(div));

        doc.set_attr(div, "id", r#"both ' and ""#);
        assert_eq!(encode(&doc, div).unwrap().as_str(), "/div[1]");
    }

    #[test]
    fn round_trips_every_element_without_ids() {
        let doc = Document::parse_html(
            "<html><head><title>x</title></head><body><ul><li>a</li><li>b<ul><li>c</li></ul></li></ul><section><p>d</p><span>e</span><p>f</p></section></body></html>",
        );
        for node in doc.descendants(doc.root()).filter(|n| doc.is_element(*n)) {
            let locator = encode(&doc, node).unwrap();
            assert_eq!(decode(&locator, &doc).unwrap(), Some(node), "{}", locator);
        }
    }

    #[test]
    fn removed_node_makes_locator_stale() {
        let mut doc = paragraphs();
        let p = third_paragraph(&doc);
        let locator = encode(&doc, p).unwrap();
        doc.detach(p);
        assert_eq!(decode(&locator, &doc).unwrap(), None);
        assert!(matches!(
            encode(&doc, p),
            Err(HiliteError::Unlocatable(_))
        ));
    }

    #[test]
    fn document_node_cannot_be_encoded() {
        let doc = paragraphs();
        assert!(matches!(
            encode(&doc, doc.root()),
            Err(HiliteError::Unlocatable(_))
        ));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let doc = paragraphs();
        for bad in ["", "html[1]", "/p[0]", "/p[x]", "/p[1", "//*[@id=side]", "//*[@id=\"side]", "/"] {
            let err = decode(&Locator::new(bad), &doc).unwrap_err();
            assert_eq!(err.kind(), "invalidLocator", "{bad}");
        }
    }

    #[test]
    fn decoding_does_not_touch_the_document() {
        let doc = paragraphs();
        let before = doc.to_html();
        let _ = decode(&Locator::new("//p[2]"), &doc).unwrap();
        assert_eq!(doc.to_html(), before);
    }
}
