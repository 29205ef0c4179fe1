//! Read models for the page list and the dashboard.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{PageRecord, PageUrl};

pub const NO_PAGES: &str = "No Highlights added yet.";
pub const NO_HIGHLIGHTS: &str = "No Highlights for this page yet.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightItem {
    pub id: String,
    pub text: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageListView {
    pub url: PageUrl,
    pub title: Option<String>,
    pub items: Vec<HighlightItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardEntry {
    pub url: PageUrl,
    pub title: String,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub entries: Vec<DashboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

/// Case-insensitive substring match. An empty or blank query matches all.
pub fn matches_query(haystack: &str, query: &str) -> bool {
    let query = query.trim();
    query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
}

/// Highlights of one page whose text matches `query`, in capture order.
pub fn page_list(url: &PageUrl, record: Option<&PageRecord>, query: &str) -> PageListView {
    let items: Vec<HighlightItem> = record
        .map(|record| {
            record
                .highlights
                .iter()
                .filter(|h| matches_query(&h.text, query))
                .map(|h| HighlightItem {
                    id: h.id.clone(),
                    text: h.text.clone(),
                    active: record.active_highlight_id.as_deref() == Some(h.id.as_str()),
                })
                .collect()
        })
        .unwrap_or_default();

    PageListView {
        url: url.clone(),
        title: record.map(|r| r.title.clone()),
        empty_message: items.is_empty().then_some(NO_HIGHLIGHTS),
        items,
    }
}

/// Pages whose URL or title matches `query`, sorted by URL. `current` flags
/// the page the caller is looking at, if any.
pub fn dashboard(
    pages: &BTreeMap<PageUrl, PageRecord>,
    query: &str,
    current: Option<&PageUrl>,
) -> DashboardView {
    let entries: Vec<DashboardEntry> = pages
        .iter()
        .filter(|(url, record)| matches_query(url.as_str(), query) || matches_query(&record.title, query))
        .map(|(url, record)| DashboardEntry {
            url: url.clone(),
            title: record.title.clone(),
            current: current == Some(url),
        })
        .collect();

    DashboardView {
        empty_message: entries.is_empty().then_some(NO_PAGES),
        entries,
    }
}
