//! Document session
//!
//! Ties one open document to its viewport scheduler and search engine, and
//! exposes the viewer surface: navigation, zoom, scrolling and search.

use crate::config::{ViewerConfig, MAX_SCALE, MIN_SCALE};
use crate::error::{Error, Result};
use crate::pdf::{DocumentHandle, DocumentSource};
use crate::render::PageRenderer;
use crate::search::{PageTextCache, SearchEngine, SearchState};
use crate::source::DocumentLoadCache;
use crate::viewport::{PageRenderState, ViewportScheduler};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub current_page: u32,
    pub total_pages: u32,
    pub scale: f32,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub scroll_offset: f32,
    pub container_height: f32,
    /// First and last page of the visible set, overscan included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_pages: Option<(u32, u32)>,
    /// Pages that are visible or hold a render
    pub pages: Vec<PageRenderState>,
    pub search: SearchState,
}

/// PNG of one rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub png: Arc<Vec<u8>>,
}

struct OpenDocument {
    handle: Arc<dyn DocumentHandle>,
    scheduler: ViewportScheduler,
    search: SearchEngine,
}

/// A viewer over at most one document at a time
pub struct DocumentSession {
    source: Arc<dyn DocumentSource>,
    load_cache: Arc<DocumentLoadCache>,
    renderer: Arc<PageRenderer>,
    config: ViewerConfig,
    open: Option<OpenDocument>,
    current_page: u32,
    scale: f32,
    container_height: f32,
    is_loading: bool,
    error: Option<String>,
}

impl DocumentSession {
    pub fn new(source: Arc<dyn DocumentSource>, config: ViewerConfig) -> Self {
        let load_cache = Arc::new(DocumentLoadCache::new(config.load_cache_entries));
        Self::with_load_cache(source, load_cache, config)
    }

    /// Create a session sharing `load_cache` with other sessions
    pub fn with_load_cache(
        source: Arc<dyn DocumentSource>,
        load_cache: Arc<DocumentLoadCache>,
        config: ViewerConfig,
    ) -> Self {
        Self {
            source,
            load_cache,
            renderer: Arc::new(PageRenderer::new()),
            config,
            open: None,
            current_page: 1,
            scale: 1.0,
            container_height: 0.0,
            is_loading: false,
            error: None,
        }
    }

    /// Open `url`, replacing the current document.
    ///
    /// Loading the URL that is already open is a no-op. Must be called from
    /// within a Tokio runtime.
    pub async fn load(&mut self, url: &str) -> Result<()> {
        if self.url() == Some(url) {
            debug!(url, "document already open");
            return Ok(());
        }

        self.cleanup();
        self.is_loading = true;
        self.error = None;

        let handle = match self
            .load_cache
            .acquire(url, self.source.as_ref())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(url, error = %e, "failed to load document");
                self.is_loading = false;
                self.current_page = 1;
                self.error = Some(e.client_message());
                return Err(e);
            }
        };

        let scheduler = ViewportScheduler::new(
            Arc::clone(&handle),
            Arc::clone(&self.renderer),
            self.config.scheduler.clone(),
            self.scale,
        );
        let search = SearchEngine::new(
            Arc::clone(&handle),
            Arc::new(PageTextCache::new()),
            self.config.search_debounce,
        );

        info!(url, pages = handle.page_count(), "document opened");
        scheduler.set_container_height(self.container_height);
        self.open = Some(OpenDocument {
            handle,
            scheduler,
            search,
        });
        self.current_page = 1;
        self.is_loading = false;
        Ok(())
    }

    /// Close the current document and release everything tied to it. The
    /// handle itself is destroyed once no other session sharing the load
    /// cache holds it. No-op when nothing is open.
    pub fn cleanup(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };

        open.search.clear_search();
        open.scheduler.teardown();
        let destroyed = self.load_cache.release(&open.handle);
        info!(url = open.handle.url(), destroyed, "document closed");

        self.current_page = 1;
        self.is_loading = false;
        self.error = None;
    }

    /// Jump to a page. Out-of-range pages are rejected and leave the
    /// current page unchanged.
    pub fn set_current_page(&mut self, page: u32) -> bool {
        let Some(open) = &self.open else {
            return false;
        };
        if page < 1 || page > open.handle.page_count() {
            debug!(page, total = open.handle.page_count(), "page out of range");
            return false;
        }

        open.scheduler.scroll_to_page(page);
        self.current_page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        let last = self.page_count().max(1);
        self.set_current_page((self.current_page + 1).min(last))
    }

    pub fn previous_page(&mut self) -> bool {
        self.set_current_page(self.current_page.saturating_sub(1).max(1))
    }

    /// Set the zoom factor, clamped to the supported range.
    /// Non-finite values are ignored. Returns the scale in effect.
    pub fn set_scale(&mut self, scale: f32) -> f32 {
        if !scale.is_finite() {
            warn!(scale, "ignoring non-finite scale");
            return self.scale;
        }

        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        if let Some(open) = &self.open {
            open.scheduler.set_scale(self.scale);
            self.current_page = open.scheduler.current_page();
        }
        self.scale
    }

    /// Forward a scroll event; returns the current page afterwards
    pub fn on_scroll(&mut self, scroll_offset: f32) -> u32 {
        if let Some(open) = &self.open {
            self.current_page = open.scheduler.on_scroll(scroll_offset);
        }
        self.current_page
    }

    pub fn set_container_height(&mut self, height: f32) {
        self.container_height = height;
        if let Some(open) = &self.open {
            open.scheduler.set_container_height(height);
            self.current_page = open.scheduler.current_page();
        }
    }

    pub fn search(&self, query: &str) {
        if let Some(open) = &self.open {
            open.search.search(query);
        }
    }

    pub fn next_match(&self) {
        if let Some(open) = &self.open {
            open.search.next_match();
        }
    }

    pub fn previous_match(&self) {
        if let Some(open) = &self.open {
            open.search.previous_match();
        }
    }

    pub fn clear_search(&self) {
        if let Some(open) = &self.open {
            open.search.clear_search();
        }
    }

    pub fn search_state(&self) -> SearchState {
        self.open
            .as_ref()
            .map(|open| open.search.state())
            .unwrap_or_default()
    }

    /// Receiver for search state updates of the open document. Lets a caller
    /// wait on the search without borrowing the session.
    pub fn subscribe_search(&self) -> Option<watch::Receiver<SearchState>> {
        self.open.as_ref().map(|open| open.search.subscribe())
    }

    /// Wait for a pending or running search to finish
    pub async fn wait_for_search(&self) -> SearchState {
        match &self.open {
            Some(open) => open.search.wait_idle().await,
            None => SearchState::default(),
        }
    }

    /// Bring `page` on screen, wait for its render and return it as PNG
    pub async fn render_page_png(&mut self, page: u32) -> Result<RenderedPage> {
        let total = self.page_count();
        if self.open.is_none() {
            return Err(Error::NoDocument);
        }
        if !self.set_current_page(page) {
            return Err(Error::PageOutOfBounds { page, total });
        }

        let open = self.open.as_ref().ok_or(Error::NoDocument)?;
        open.scheduler.settle().await;

        let png = open.scheduler.encoded_page(page).await?;
        let state = open.scheduler.page_state(page);
        let artifact = state.as_ref().and_then(|s| s.artifact.clone());
        match (png, artifact) {
            (Some(png), Some(artifact)) => Ok(RenderedPage {
                page,
                width: artifact.width,
                height: artifact.height,
                scale: artifact.scale,
                png,
            }),
            _ => Err(Error::Render {
                page,
                reason: state
                    .and_then(|s| s.error)
                    .unwrap_or_else(|| "page is not rendered".to_string()),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (scroll_offset, visible_pages, pages) = match &self.open {
            Some(open) => (
                open.scheduler.viewport().scroll_offset,
                open.scheduler
                    .visible_pages()
                    .map(|range| (*range.start(), *range.end())),
                open.scheduler
                    .page_states()
                    .into_iter()
                    .filter(|page| page.is_visible || page.artifact.is_some())
                    .collect(),
            ),
            None => (0.0, None, Vec::new()),
        };

        SessionSnapshot {
            url: self.url().map(str::to_string),
            fingerprint: self
                .open
                .as_ref()
                .map(|open| open.handle.fingerprint().to_string()),
            current_page: self.current_page,
            total_pages: self.page_count(),
            scale: self.scale,
            is_loading: self.is_loading,
            error: self.error.clone(),
            scroll_offset,
            container_height: self.container_height,
            visible_pages,
            pages,
            search: self.search_state(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.handle.url())
    }

    pub fn document(&self) -> Option<&Arc<dyn DocumentHandle>> {
        self.open.as_ref().map(|open| &open.handle)
    }

    pub fn scheduler(&self) -> Option<&ViewportScheduler> {
        self.open.as_ref().map(|open| &open.scheduler)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.open
            .as_ref()
            .map_or(0, |open| open.handle.page_count())
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}
