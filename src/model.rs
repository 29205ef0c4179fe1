use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HiliteError, Result};
use crate::locator::Locator;

/// Page identity: the page URL without its fragment, so in-page anchors
/// share one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageUrl(String);

impl PageUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw.trim()).map_err(|source| HiliteError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        url.set_fragment(None);
        Ok(Self(url.into()))
    }

    /// Wraps a URL that was normalized before it was stored.
    pub(crate) fn from_stored(url: String) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub text: String,
    pub locator: Locator,
}

impl Highlight {
    /// New highlight with a freshly generated id.
    pub fn new(text: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            locator,
        }
    }
}

/// Everything stored for one page. Highlights keep capture order so lists
/// render the way they were made; ids are unique within the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub active_highlight_id: Option<String>,
    pub highlights: Vec<Highlight>,
}

impl PageRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            active_highlight_id: None,
            highlights: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == id)
    }

    pub fn active(&self) -> Option<&Highlight> {
        self.active_highlight_id.as_deref().and_then(|id| self.get(id))
    }

    /// Adds `highlight` and makes it the active one.
    pub fn insert_active(&mut self, highlight: Highlight) {
        self.highlights.retain(|h| h.id != highlight.id);
        self.active_highlight_id = Some(highlight.id.clone());
        self.highlights.push(highlight);
    }

    /// Points the active slot at `id`; `None` clears it. Unknown ids are
    /// refused and leave the record untouched.
    pub fn set_active(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if self.get(id).is_none() => false,
            id => {
                self.active_highlight_id = id.map(str::to_string);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Highlight> {
        let pos = self.highlights.iter().position(|h| h.id == id)?;
        if self.active_highlight_id.as_deref() == Some(id) {
            self.active_highlight_id = None;
        }
        Some(self.highlights.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_drops_fragment() {
        let a = PageUrl::parse("https://example.com/post#section-2").unwrap();
        let b = PageUrl::parse("  https://example.com/post ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://example.com/post");
    }

    #[test]
    fn page_url_rejects_garbage() {
        let err = PageUrl::parse("not a url").unwrap_err();
        assert_eq!(err.kind(), "invalidUrl");
    }

    #[test]
    fn highlight_ids_are_fresh() {
        let a = Highlight::new("a", Locator::new("/p[1]"));
        let b = Highlight::new("a", Locator::new("/p[1]"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn active_slot_only_references_existing_highlights() {
        let mut record = PageRecord::new("Title");
        let first = Highlight::new("one", Locator::new("/p[1]"));
        let second = Highlight::new("two", Locator::new("/p[2]"));
        record.insert_active(first.clone());
        record.insert_active(second.clone());
        assert_eq!(record.active(), Some(&second));

        assert!(!record.set_active(Some("missing")));
        assert_eq!(record.active(), Some(&second));

        assert!(record.set_active(Some(&first.id)));
        record.remove(&first.id);
        assert_eq!(record.active_highlight_id, None);
        assert_eq!(record.highlights, vec![second]);
    }
}
