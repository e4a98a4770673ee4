//! Per-document page text cache
//!
//! Holds the normalized text of each page (fragments joined with single
//! spaces). Each page is extracted at most once even when several readers ask
//! at the same time; a failed extraction is not remembered, so the next reader
//! tries again.

use crate::error::Result;
use crate::pdf::{join_text_items, DocumentHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Default)]
pub struct PageTextCache {
    pages: Mutex<HashMap<u32, Arc<OnceCell<Arc<str>>>>>,
}

impl PageTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, page_number: u32) -> Arc<OnceCell<Arc<str>>> {
        Arc::clone(self.pages.lock().entry(page_number).or_default())
    }

    /// Cached text of a page, if it has been extracted
    pub fn get(&self, page_number: u32) -> Option<Arc<str>> {
        self.pages
            .lock()
            .get(&page_number)
            .and_then(|cell| cell.get().cloned())
    }

    /// Store text for a page unless it is already cached
    pub fn insert(&self, page_number: u32, text: &str) {
        let _ = self.cell(page_number).set(Arc::from(text));
    }

    /// Cached text of a page, extracting it from `document` on first use
    pub async fn get_or_extract(
        &self,
        document: &dyn DocumentHandle,
        page_number: u32,
    ) -> Result<Arc<str>> {
        let cell = self.cell(page_number);
        let text = cell
            .get_or_try_init(|| async {
                let page = document.get_page(page_number).await?;
                let items = page.text_content().await?;
                Ok::<_, crate::error::Error>(Arc::from(join_text_items(&items)))
            })
            .await?;
        Ok(Arc::clone(text))
    }

    /// Number of pages with cached text
    pub fn len(&self) -> usize {
        self.pages
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.pages.lock().clear();
    }
}
