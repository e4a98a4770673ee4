//! In-memory document source
//!
//! Documents assembled from plain text and page sizes with no PDF parsing
//! involved. Pages paint as flat fills. Tests can also inject failures and
//! slow renders per page.

use crate::cancel::CancellationToken;
use crate::config::{DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};
use crate::error::{Error, Result};
use crate::pdf::document::{
    DocumentHandle, DocumentSource, PageAnnotation, PageHandle, PageViewport, TextItem,
};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One page of an in-memory document
#[derive(Debug, Clone)]
pub struct MemoryPage {
    pub width: f32,
    pub height: f32,
    pub text: Vec<String>,
    pub annotations: Vec<PageAnnotation>,
    /// Time a render takes before it produces pixels
    pub render_delay: Duration,
    pub fail_render: bool,
    pub fail_text: bool,
    pub fail_annotations: bool,
}

impl MemoryPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            text: Vec::new(),
            annotations: Vec::new(),
            render_delay: Duration::ZERO,
            fail_render: false,
            fail_text: false,
            fail_annotations: false,
        }
    }

    /// Page text, stored as whitespace-separated fragments
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_annotation(mut self, annotation: PageAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn failing_render(mut self) -> Self {
        self.fail_render = true;
        self
    }

    pub fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    pub fn failing_annotations(mut self) -> Self {
        self.fail_annotations = true;
        self
    }
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
    }
}

/// An in-memory document
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pub pages: Vec<MemoryPage>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self { pages }
    }

    /// Letter-sized pages with the given texts
    pub fn with_page_texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| MemoryPage::default().with_text(text))
                .collect(),
        )
    }

    /// `count` blank letter-sized pages
    pub fn blank(count: usize) -> Self {
        Self::new(vec![MemoryPage::default(); count])
    }
}

#[derive(Debug, Default)]
struct MemoryStats {
    loads: AtomicUsize,
    destroys: AtomicUsize,
    text_reads: AtomicUsize,
    renders: AtomicUsize,
}

/// Document source serving [`MemoryDocument`]s by URL
#[derive(Default)]
pub struct MemoryDocumentSource {
    documents: Mutex<HashMap<String, MemoryDocument>>,
    stats: Arc<MemoryStats>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the document served for `url`
    pub fn insert(&self, url: impl Into<String>, document: MemoryDocument) {
        self.documents.lock().insert(url.into(), document);
    }

    /// Number of successful `load_document` calls
    pub fn load_count(&self) -> usize {
        self.stats.loads.load(Ordering::SeqCst)
    }

    /// Number of handles destroyed
    pub fn destroy_count(&self) -> usize {
        self.stats.destroys.load(Ordering::SeqCst)
    }

    /// Number of `text_content` calls across all pages
    pub fn text_reads(&self) -> usize {
        self.stats.text_reads.load(Ordering::SeqCst)
    }

    /// Number of `render` calls across all pages
    pub fn render_count(&self) -> usize {
        self.stats.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn load_document(&self, url: &str) -> Result<Arc<dyn DocumentHandle>> {
        let document = self
            .documents
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::PdfNotFound {
                path: url.to_string(),
            })?;

        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryHandle {
            url: url.to_string(),
            fingerprint: uuid::Uuid::new_v4().to_string(),
            pages: Arc::new(document.pages),
            destroyed: AtomicBool::new(false),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MemoryHandle {
    url: String,
    fingerprint: String,
    pages: Arc<Vec<MemoryPage>>,
    destroyed: AtomicBool,
    stats: Arc<MemoryStats>,
}

#[async_trait]
impl DocumentHandle for MemoryHandle {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn get_page(&self, page_number: u32) -> Result<Arc<dyn PageHandle>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::DocumentClosed {
                url: self.url.clone(),
            });
        }
        let page = page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .ok_or(Error::PageOutOfBounds {
                page: page_number,
                total: self.page_count(),
            })?;

        Ok(Arc::new(MemoryPageHandle {
            page_number,
            page: page.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.stats.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MemoryPageHandle {
    page_number: u32,
    page: MemoryPage,
    stats: Arc<MemoryStats>,
}

#[async_trait]
impl PageHandle for MemoryPageHandle {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn viewport(&self, scale: f32) -> PageViewport {
        PageViewport::new(self.page.width, self.page.height, scale)
    }

    async fn text_content(&self) -> Result<Vec<TextItem>> {
        self.stats.text_reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.page.fail_text {
            return Err(Error::Pdfium {
                reason: format!("text layer unavailable on page {}", self.page_number),
            });
        }
        Ok(self.page.text.iter().map(TextItem::new).collect())
    }

    async fn annotations(&self) -> Result<Vec<PageAnnotation>> {
        tokio::task::yield_now().await;
        if self.page.fail_annotations {
            return Err(Error::Pdfium {
                reason: format!("annotations unavailable on page {}", self.page_number),
            });
        }
        Ok(self.page.annotations.clone())
    }

    async fn render(&self, viewport: PageViewport, token: CancellationToken) -> Result<RgbaImage> {
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        if !self.page.render_delay.is_zero() {
            tokio::time::sleep(self.page.render_delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        token.check()?;

        if self.page.fail_render {
            return Err(Error::Pdfium {
                reason: format!("page {} is corrupt", self.page_number),
            });
        }

        let (width, height) = viewport.pixel_size();
        let shade = (self.page_number % 256) as u8;
        Ok(RgbaImage::from_pixel(
            width,
            height,
            Rgba([shade, shade, shade, 255]),
        ))
    }
}
