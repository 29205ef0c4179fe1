//! Persistence contract for highlights.
//!
//! Writes are last-writer-wins: `upsert` replaces the whole record and no
//! merge happens between concurrent writers. Callers hold what they read as
//! a snapshot.

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Result;

use crate::model::{PageRecord, PageUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightRemoval {
    NotFound,
    Removed { was_active: bool },
    /// The last highlight went away and took the page record with it.
    PageRemoved { was_active: bool },
}

impl HighlightRemoval {
    pub fn was_active(&self) -> bool {
        match self {
            HighlightRemoval::NotFound => false,
            HighlightRemoval::Removed { was_active } | HighlightRemoval::PageRemoved { was_active } => {
                *was_active
            }
        }
    }
}

pub trait HighlightStore: Send + Sync {
    fn get(&self, url: &PageUrl) -> impl Future<Output = Result<Option<PageRecord>>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<BTreeMap<PageUrl, PageRecord>>> + Send;

    /// Replaces the record for `url`. An empty record deletes the page.
    fn upsert(&self, url: &PageUrl, record: &PageRecord) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, url: &PageUrl) -> impl Future<Output = Result<bool>> + Send;

    fn delete_highlight(
        &self,
        url: &PageUrl,
        id: &str,
    ) -> impl Future<Output = Result<HighlightRemoval>> + Send;

    /// Moves the active slot. Returns `false` when the page or highlight is
    /// unknown.
    fn set_active(
        &self,
        url: &PageUrl,
        id: Option<&str>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Store whose every call fails, for exercising storage error paths.
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
impl HighlightStore for FailingStore {
    async fn get(&self, _url: &PageUrl) -> Result<Option<PageRecord>> {
        Err(anyhow::anyhow!("disk gone"))
    }

    async fn get_all(&self) -> Result<BTreeMap<PageUrl, PageRecord>> {
        Err(anyhow::anyhow!("disk gone"))
    }

    async fn upsert(&self, _url: &PageUrl, _record: &PageRecord) -> Result<()> {
        Err(anyhow::anyhow!("disk gone"))
    }

    async fn delete(&self, _url: &PageUrl) -> Result<bool> {
        Err(anyhow::anyhow!("disk gone"))
    }

    async fn delete_highlight(&self, _url: &PageUrl, _id: &str) -> Result<HighlightRemoval> {
        Err(anyhow::anyhow!("disk gone"))
    }

    async fn set_active(&self, _url: &PageUrl, _id: Option<&str>) -> Result<bool> {
        Err(anyhow::anyhow!("disk gone"))
    }
}
