//! Applying stored highlights to an open page.
//!
//! [`Page`] holds the document and its marker slot and does the synchronous
//! DOM work. [`Highlighter`] pairs it with a [`HighlightStore`] for the
//! operations that also read or write persisted state.

use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::error::{HiliteError, Result};
use crate::locator::{self, Locator};
use crate::marker::{Acquire, DEFAULT_COLOR, MarkerSlot};
use crate::model::{Highlight, PageRecord, PageUrl};
use crate::selection::Selection;
use crate::store::{HighlightRemoval, HighlightStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplyOutcome {
    /// The resolved element now carries the marker.
    Marked,
    /// The resolved element already carried it; it was only scrolled to.
    AlreadyActive,
    /// Nothing in the page matches the locator any more.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollBehavior {
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollBlock {
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollIntoView {
    pub node: NodeId,
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
}

pub struct Page {
    url: PageUrl,
    document: Document,
    marker: MarkerSlot,
    color: String,
    scroll: Option<ScrollIntoView>,
}

impl Page {
    pub fn new(url: PageUrl, mut document: Document) -> Self {
        let marker = MarkerSlot::adopt(&mut document);
        Self {
            url,
            document,
            marker,
            color: DEFAULT_COLOR.to_string(),
            scroll: None,
        }
    }

    pub fn parse(url: PageUrl, html: &str) -> Self {
        Self::new(url, Document::parse_html(html))
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn url(&self) -> &PageUrl {
        &self.url
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The document title, or the URL when the page has none.
    pub fn title(&self) -> String {
        self.document
            .title()
            .unwrap_or_else(|| self.url.to_string())
    }

    pub fn marked(&self) -> Option<NodeId> {
        self.marker.holder()
    }

    pub fn last_scroll(&self) -> Option<ScrollIntoView> {
        self.scroll
    }

    pub fn to_html(&self) -> String {
        self.document.to_html()
    }

    pub fn apply(&mut self, locator: &Locator) -> ApplyOutcome {
        let node = match locator::decode(locator, &self.document) {
            Ok(Some(node)) => node,
            Ok(None) => {
                tracing::warn!(url = %self.url, locator = %locator, "target node not found, locator is stale");
                return ApplyOutcome::Stale;
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "failed to decode locator");
                return ApplyOutcome::Stale;
            }
        };

        let outcome = match self.marker.acquire(&mut self.document, node, &self.color) {
            Acquire::AlreadyHeld => ApplyOutcome::AlreadyActive,
            Acquire::Acquired { released } => {
                if let Some(previous) = released {
                    tracing::debug!(url = %self.url, node = previous.index(), "released previous marker");
                }
                ApplyOutcome::Marked
            }
        };

        self.scroll = Some(ScrollIntoView {
            node,
            behavior: ScrollBehavior::Smooth,
            block: ScrollBlock::Start,
        });
        outcome
    }

    /// Removes the marker if any element holds it.
    pub fn clear(&mut self) -> bool {
        self.release_marker().is_some()
    }

    fn release_marker(&mut self) -> Option<NodeId> {
        self.marker.release(&mut self.document)
    }

    /// Puts the marker back on `node` without scrolling.
    fn remark(&mut self, node: NodeId) {
        self.marker.acquire(&mut self.document, node, &self.color);
    }
}

pub struct Highlighter<'a, S> {
    store: &'a S,
}

impl<'a, S: HighlightStore> Highlighter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Stores the selection as the page's new active highlight and marks it.
    pub async fn capture(&self, page: &mut Page, selection: &Selection) -> Result<Highlight> {
        let text = selection.text(page.document()).trim().to_string();
        if selection.is_collapsed() || text.is_empty() {
            return Err(HiliteError::EmptySelection);
        }

        // the marker rewrites the element id, which must never end up in a locator
        let previous = page.release_marker();

        let highlight = match self.persist_capture(page, selection, text).await {
            Ok(highlight) => highlight,
            Err(e) => {
                if let Some(node) = previous {
                    page.remark(node);
                }
                return Err(e);
            }
        };

        tracing::info!(url = %page.url(), id = %highlight.id, locator = %highlight.locator, "captured highlight");
        page.apply(&highlight.locator);
        Ok(highlight)
    }

    async fn persist_capture(&self, page: &Page, selection: &Selection, text: String) -> Result<Highlight> {
        let container = selection.common_ancestor_container(page.document());
        let locator = locator::encode(page.document(), container)?;
        let highlight = Highlight::new(text, locator);

        let mut record = self
            .store
            .get(page.url())
            .await
            .map_err(HiliteError::storage)?
            .unwrap_or_else(|| PageRecord::new(page.title()));
        record.insert_active(highlight.clone());
        self.store
            .upsert(page.url(), &record)
            .await
            .map_err(HiliteError::storage)?;
        Ok(highlight)
    }

    /// Re-applies the page's active highlight after a load. `None` when the
    /// page has nothing active.
    pub async fn restore(&self, page: &mut Page) -> Result<Option<ApplyOutcome>> {
        let record = self
            .store
            .get(page.url())
            .await
            .map_err(HiliteError::storage)?;
        let Some(active) = record.as_ref().and_then(PageRecord::active) else {
            return Ok(None);
        };
        Ok(Some(page.apply(&active.locator)))
    }

    /// Makes `id` the active highlight and shows it.
    pub async fn select(&self, page: &mut Page, id: &str) -> Result<ApplyOutcome> {
        let record = self
            .store
            .get(page.url())
            .await
            .map_err(HiliteError::storage)?
            .ok_or_else(|| HiliteError::PageNotFound(page.url().to_string()))?;
        let highlight = record
            .get(id)
            .ok_or_else(|| HiliteError::HighlightNotFound(id.to_string()))?;

        self.store
            .set_active(page.url(), Some(id))
            .await
            .map_err(HiliteError::storage)?;
        Ok(page.apply(&highlight.locator))
    }

    /// Forgets which highlight is active and removes the marker.
    pub async fn clear_active(&self, page: &mut Page) -> Result<bool> {
        let updated = self
            .store
            .set_active(page.url(), None)
            .await
            .map_err(HiliteError::storage)?;
        if !updated {
            tracing::debug!(url = %page.url(), "no stored page to clear");
        }
        Ok(page.clear())
    }

    /// Deletes one highlight; the marker goes too when it was the active one.
    pub async fn delete_highlight(
        &self,
        url: &PageUrl,
        id: &str,
        page: Option<&mut Page>,
    ) -> Result<HighlightRemoval> {
        let removal = self
            .store
            .delete_highlight(url, id)
            .await
            .map_err(HiliteError::storage)?;

        match removal {
            HighlightRemoval::NotFound => {
                return Err(HiliteError::HighlightNotFound(id.to_string()));
            }
            HighlightRemoval::PageRemoved { .. } => {
                tracing::info!(url = %url, "deleted last highlight, page record removed");
            }
            HighlightRemoval::Removed { .. } => {
                tracing::info!(url = %url, id = %id, "deleted highlight");
            }
        }

        if removal.was_active() {
            if let Some(page) = page {
                page.clear();
            }
        }
        Ok(removal)
    }

    pub async fn delete_page(&self, url: &PageUrl) -> Result<()> {
        let deleted = self
            .store
            .delete(url)
            .await
            .map_err(HiliteError::storage)?;
        if !deleted {
            return Err(HiliteError::PageNotFound(url.to_string()));
        }
        tracing::info!(url = %url, "deleted page record");
        Ok(())
    }
}
