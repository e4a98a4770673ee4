//! Virtual viewport scheduler
//!
//! Decides from the scroll position which pages need pixels, drives their
//! renders through the [`PageRenderer`], tracks the current page, and frees
//! rendered pages that stay off-screen for longer than the reclaim delay.
//!
//! Per page the state machine is
//! `Unrendered -> Rendering -> Rendered -> Unrendered`, where the last step is
//! reclamation. A failed or cancelled render falls back to `Unrendered` and is
//! retried the next time the page is found visible.

use crate::cancel::{CancellationToken, Debouncer};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::pdf::{DocumentHandle, PageViewport};
use crate::render::{Canvas, PageRenderer, RenderOutcome, SharedCanvas};
use crate::viewport::layout::{PageGeometry, PageLayout, ViewportState};
use futures_util::future::join_all;
use image::DynamicImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A completed render of one page
#[derive(Debug, Clone, Serialize)]
pub struct RenderedArtifact {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    /// PNG of the canvas pixels, encoded on first request
    #[serde(skip)]
    encoded_png: Arc<OnceCell<Arc<Vec<u8>>>>,
}

impl RenderedArtifact {
    fn new(width: u32, height: u32, scale: f32) -> Self {
        Self {
            width,
            height,
            scale,
            encoded_png: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded_png.initialized()
    }
}

#[derive(Debug, Clone)]
struct RenderJob {
    id: u64,
    token: CancellationToken,
}

/// Render bookkeeping for one page
#[derive(Debug, Clone, Serialize)]
pub struct PageRenderState {
    pub page_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<RenderedArtifact>,
    pub is_rendering: bool,
    pub is_visible: bool,
    /// Layout width at the current scale
    pub width: f32,
    /// Layout height at the current scale
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    job: Option<RenderJob>,
}

impl PageRenderState {
    fn new(page_number: u32) -> Self {
        Self {
            page_number,
            artifact: None,
            is_rendering: false,
            is_visible: false,
            width: 0.0,
            height: 0.0,
            error: None,
            job: None,
        }
    }

    fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            job.token.cancel();
        }
        self.is_rendering = false;
    }
}

struct SchedulerState {
    geometries: Vec<PageGeometry>,
    fetched: Vec<bool>,
    pages: Vec<PageRenderState>,
    layout: PageLayout,
    viewport: ViewportState,
    scale: f32,
    visible: Option<RangeInclusive<u32>>,
    torn_down: bool,
}

impl SchedulerState {
    fn relayout(&mut self, margin: f32) {
        self.layout = PageLayout::new(&self.geometries, self.scale, margin);
        for page in &mut self.pages {
            if let Some((width, height)) = self.layout.page_size(page.page_number) {
                page.width = width;
                page.height = height;
            }
        }
    }

    fn is_visible(&self, page_number: u32) -> bool {
        self.visible
            .as_ref()
            .is_some_and(|range| range.contains(&page_number))
    }
}

struct SchedulerInner {
    document: Arc<dyn DocumentHandle>,
    renderer: Arc<PageRenderer>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    canvases: Vec<SharedCanvas>,
    /// Parent of every job token; replaced on scale change and teardown
    liveness: Mutex<CancellationToken>,
    current_page: watch::Sender<u32>,
    reclaimer: Debouncer,
    jobs: Mutex<Vec<JoinHandle<()>>>,
    permits: Semaphore,
    next_job_id: AtomicU64,
}

/// Schedules page renders for a scrolling, zoomable stack of pages
///
/// Must be used from within a Tokio runtime: scrolling spawns render jobs.
pub struct ViewportScheduler {
    inner: Arc<SchedulerInner>,
}

impl ViewportScheduler {
    pub fn new(
        document: Arc<dyn DocumentHandle>,
        renderer: Arc<PageRenderer>,
        config: SchedulerConfig,
        scale: f32,
    ) -> Self {
        let page_count = document.page_count();
        let geometries: Vec<PageGeometry> = (1..=page_count)
            .map(|n| PageGeometry::new(n, config.default_page_width, config.default_page_height))
            .collect();
        let mut state = SchedulerState {
            layout: PageLayout::new(&geometries, scale, config.page_margin),
            fetched: vec![false; geometries.len()],
            geometries,
            pages: (1..=page_count).map(PageRenderState::new).collect(),
            viewport: ViewportState::default(),
            scale,
            visible: None,
            torn_down: false,
        };
        state.relayout(config.page_margin);

        let (current_page, _) = watch::channel(1);
        Self {
            inner: Arc::new(SchedulerInner {
                canvases: (0..page_count).map(|_| Canvas::shared()).collect(),
                document,
                renderer,
                reclaimer: Debouncer::new(config.reclaim_delay),
                permits: Semaphore::new(config.max_concurrent_renders.max(1)),
                config,
                state: Mutex::new(state),
                liveness: Mutex::new(CancellationToken::new()),
                current_page,
                jobs: Mutex::new(Vec::new()),
                next_job_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn set_container_height(&self, height: f32) {
        self.inner.state.lock().viewport.container_height = height.max(0.0);
        self.inner.refresh();
    }

    /// Apply a scroll event; returns the current page afterwards
    pub fn on_scroll(&self, scroll_offset: f32) -> u32 {
        self.inner.state.lock().viewport.scroll_offset = scroll_offset.max(0.0);
        self.inner.refresh();
        self.current_page()
    }

    /// Scroll so `page_number` sits at the top of the viewport.
    ///
    /// Returns the new offset, or `None` when the page does not exist or the
    /// viewport is already there.
    pub fn scroll_to_page(&self, page_number: u32) -> Option<f32> {
        let offset = {
            let state = self.inner.state.lock();
            let offset = state.layout.scroll_offset_for_page(page_number)?;
            if offset == state.viewport.scroll_offset {
                return None;
            }
            offset
        };
        self.on_scroll(offset);
        Some(offset)
    }

    /// Change the zoom factor, dropping every rendered page and re-anchoring
    /// the scroll position on the current page
    pub fn set_scale(&self, scale: f32) {
        let anchor = self.current_page();
        {
            let mut state = self.inner.state.lock();
            if state.torn_down || state.scale == scale {
                return;
            }
            debug!(from = state.scale, to = scale, "rescaling pages");
            state.scale = scale;
            state.relayout(self.inner.config.page_margin);
            for page in &mut state.pages {
                page.cancel_job();
                page.artifact = None;
                page.error = None;
            }
            if let Some(offset) = state.layout.scroll_offset_for_page(anchor) {
                state.viewport.scroll_offset = offset;
            }

            let mut liveness = self.inner.liveness.lock();
            liveness.cancel();
            *liveness = CancellationToken::new();
        }

        for canvas in &self.inner.canvases {
            self.inner.renderer.teardown(canvas);
        }
        self.inner.refresh();
    }

    /// Re-run the visibility pass without moving the viewport
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// PNG of a rendered page. Encoded once per artifact; `None` while the
    /// page has no artifact.
    pub async fn encoded_page(&self, page_number: u32) -> Result<Option<Arc<Vec<u8>>>> {
        let index = match page_number.checked_sub(1) {
            Some(index) if (index as usize) < self.inner.canvases.len() => index as usize,
            _ => {
                return Err(Error::PageOutOfBounds {
                    page: page_number,
                    total: self.page_count(),
                })
            }
        };

        let cell = {
            let state = self.inner.state.lock();
            match &state.pages[index].artifact {
                Some(artifact) => Arc::clone(&artifact.encoded_png),
                None => return Ok(None),
            }
        };
        if let Some(png) = cell.get() {
            return Ok(Some(Arc::clone(png)));
        }

        let pixels = self.inner.canvases[index].lock().pixels.clone();
        let Some(pixels) = pixels else {
            return Ok(None);
        };
        let png = cell
            .get_or_try_init(|| async move {
                let bytes = tokio::task::spawn_blocking(move || encode_png(pixels)).await??;
                debug!(page = page_number, bytes = bytes.len(), "encoded page");
                Ok::<_, Error>(Arc::new(bytes))
            })
            .await?;
        Ok(Some(Arc::clone(png)))
    }

    /// Wait until no render job is in flight
    pub async fn settle(&self) {
        loop {
            let jobs = std::mem::take(&mut *self.inner.jobs.lock());
            if jobs.is_empty() {
                break;
            }
            join_all(jobs).await;
        }
    }

    /// Cancel all renders and the reclamation timer, and wipe every canvas
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn page_count(&self) -> u32 {
        self.inner.canvases.len() as u32
    }

    pub fn current_page(&self) -> u32 {
        *self.inner.current_page.borrow()
    }

    pub fn subscribe_current_page(&self) -> watch::Receiver<u32> {
        self.inner.current_page.subscribe()
    }

    pub fn page_states(&self) -> Vec<PageRenderState> {
        self.inner.state.lock().pages.clone()
    }

    pub fn page_state(&self, page_number: u32) -> Option<PageRenderState> {
        let state = self.inner.state.lock();
        page_number
            .checked_sub(1)
            .and_then(|index| state.pages.get(index as usize))
            .cloned()
    }

    pub fn visible_pages(&self) -> Option<RangeInclusive<u32>> {
        self.inner.state.lock().visible.clone()
    }

    pub fn scale(&self) -> f32 {
        self.inner.state.lock().scale
    }

    pub fn viewport(&self) -> ViewportState {
        self.inner.state.lock().viewport
    }

    pub fn total_height(&self) -> f32 {
        self.inner.state.lock().layout.total_height()
    }

    pub fn canvas(&self, page_number: u32) -> Option<SharedCanvas> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.inner.canvases.get(index as usize))
            .cloned()
    }
}

impl Drop for ViewportScheduler {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

fn encode_png(pixels: image::RgbaImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    DynamicImage::ImageRgba8(pixels).write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )?;
    Ok(png_bytes)
}

impl SchedulerInner {
    fn overscan(&self, scale: f32) -> f32 {
        self.config.overscan_pages * self.config.default_page_height * scale
    }

    /// Recompute the visible set, publish the current page, start renders for
    /// visible pages that need one, and re-arm reclamation
    fn refresh(self: &Arc<Self>) {
        let (to_render, scale, needs_reclaim) = {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }

            let overscan = self.overscan(state.scale);
            let visible = state.layout.visible_range(state.viewport, overscan);
            if visible != state.visible {
                debug!(?visible, "visible pages changed");
            }
            state.visible = visible;

            if let Some(page) = state.layout.current_page_from_scroll(state.viewport.scroll_offset) {
                self.current_page.send_if_modified(|current| {
                    if *current != page {
                        *current = page;
                        true
                    } else {
                        false
                    }
                });
            }

            let liveness = self.liveness.lock().clone();
            let mut to_render = Vec::new();
            let mut needs_reclaim = false;
            for index in 0..state.pages.len() {
                let visible = state.is_visible(index as u32 + 1);
                let page = &mut state.pages[index];
                page.is_visible = visible;

                if !visible {
                    needs_reclaim |= page.artifact.is_some() || page.is_rendering;
                    continue;
                }
                if page.artifact.is_none() && !page.is_rendering {
                    let job = RenderJob {
                        id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
                        token: liveness.child_token(),
                    };
                    page.is_rendering = true;
                    page.job = Some(job.clone());
                    to_render.push((page.page_number, job));
                }
            }
            (to_render, state.scale, needs_reclaim)
        };

        for (page_number, job) in to_render {
            self.spawn_render(page_number, job, scale);
        }

        if needs_reclaim {
            let weak: Weak<Self> = Arc::downgrade(self);
            self.reclaimer.schedule(move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.reclaim();
                }
            });
        }
    }

    fn spawn_render(self: &Arc<Self>, page_number: u32, job: RenderJob, scale: f32) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = inner.render_page(page_number, &job.token, scale).await;
            inner.finish_render(page_number, job.id, scale, result);
        });

        let mut jobs = self.jobs.lock();
        jobs.retain(|job| !job.is_finished());
        jobs.push(handle);
    }

    async fn render_page(
        self: &Arc<Self>,
        page_number: u32,
        token: &CancellationToken,
        scale: f32,
    ) -> Result<RenderOutcome> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        token.check()?;

        let page = self.document.get_page(page_number).await?;
        token.check()?;

        if self.record_geometry(page_number, page.viewport(1.0)) {
            self.refresh();
        }

        let canvas = &self.canvases[(page_number - 1) as usize];
        self.renderer.render(page, canvas, scale, token).await
    }

    /// Store a page's real size the first time it is seen. Returns whether
    /// the layout changed.
    fn record_geometry(&self, page_number: u32, natural: PageViewport) -> bool {
        let mut state = self.state.lock();
        let index = (page_number - 1) as usize;
        if state.torn_down || state.fetched[index] {
            return false;
        }
        state.fetched[index] = true;

        let geometry = &mut state.geometries[index];
        if geometry.width == natural.width && geometry.height == natural.height {
            return false;
        }
        geometry.width = natural.width;
        geometry.height = natural.height;
        state.relayout(self.config.page_margin);
        true
    }

    fn finish_render(&self, page_number: u32, job_id: u64, scale: f32, result: Result<RenderOutcome>) {
        let mut state = self.state.lock();
        let index = (page_number - 1) as usize;
        let page = &mut state.pages[index];
        if page.job.as_ref().map(|job| job.id) != Some(job_id) {
            // Superseded by a rescale, reclamation or teardown
            return;
        }
        page.job = None;
        page.is_rendering = false;

        match result {
            Ok(RenderOutcome::Rendered) => {
                let canvas = self.canvases[index].lock();
                page.artifact = Some(RenderedArtifact::new(canvas.width, canvas.height, scale));
                page.error = None;
                debug!(page = page_number, scale, "page rendered");
            }
            Ok(RenderOutcome::Skipped) | Ok(RenderOutcome::Cancelled) => {}
            Err(e) if e.is_cancellation() => {}
            Err(e) => {
                warn!(page = page_number, error = %e, "page render failed");
                page.error = Some(e.to_string());
            }
        }
    }

    /// Free pages that are outside the visible set now
    fn reclaim(&self) {
        let mut state = self.state.lock();
        if state.torn_down {
            return;
        }

        let mut reclaimed = 0;
        for index in 0..state.pages.len() {
            if state.is_visible(index as u32 + 1) {
                continue;
            }
            let page = &mut state.pages[index];
            if page.artifact.is_none() && !page.is_rendering {
                continue;
            }
            page.cancel_job();
            page.artifact = None;
            self.renderer.teardown(&self.canvases[index]);
            reclaimed += 1;
        }

        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed off-screen pages");
        }
    }

    fn teardown(&self) {
        {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            for page in &mut state.pages {
                page.cancel_job();
                page.artifact = None;
            }
        }

        self.liveness.lock().cancel();
        self.reclaimer.cancel();
        for job in self.jobs.lock().drain(..) {
            job.abort();
        }
        for canvas in &self.canvases {
            self.renderer.teardown(canvas);
            self.renderer.forget(canvas.lock().id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::memory::{MemoryDocument, MemoryDocumentSource, MemoryPage};
    use crate::pdf::DocumentSource;
    use std::time::Duration;

    async fn scheduler_for(document: MemoryDocument) -> (ViewportScheduler, Arc<MemoryDocumentSource>) {
        let source = Arc::new(MemoryDocumentSource::new());
        source.insert("mem://doc.pdf", document);
        let handle = source.load_document("mem://doc.pdf").await.unwrap();
        let scheduler = ViewportScheduler::new(
            handle,
            Arc::new(PageRenderer::new()),
            SchedulerConfig::default(),
            1.0,
        );
        (scheduler, source)
    }

    fn rendered_pages(scheduler: &ViewportScheduler) -> Vec<u32> {
        scheduler
            .page_states()
            .into_iter()
            .filter(|page| page.artifact.is_some())
            .map(|page| page.page_number)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_visible_pages_with_overscan() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(10)).await;

        scheduler.set_container_height(800.0);
        scheduler.settle().await;

        // overscan is two default page heights: [-1584, 2384]
        assert_eq!(scheduler.visible_pages(), Some(1..=3));
        assert_eq!(rendered_pages(&scheduler), vec![1, 2, 3]);
        assert!(scheduler.canvas(1).unwrap().lock().is_painted());
        assert!(!scheduler.canvas(4).unwrap().lock().is_painted());
        assert_eq!(scheduler.current_page(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_updates_current_page_signal() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(10)).await;
        let mut current = scheduler.subscribe_current_page();
        scheduler.set_container_height(800.0);

        assert_eq!(scheduler.on_scroll(802.0 * 4.0), 5);
        assert!(current.has_changed().unwrap());
        assert_eq!(*current.borrow_and_update(), 5);

        assert_eq!(scheduler.scroll_to_page(5), None);
        assert_eq!(scheduler.scroll_to_page(2), Some(802.0));
        assert_eq!(scheduler.current_page(), 2);
        assert_eq!(scheduler.scroll_to_page(11), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offscreen_pages_are_reclaimed_after_delay() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(20)).await;
        scheduler.set_container_height(800.0);
        scheduler.settle().await;
        assert_eq!(rendered_pages(&scheduler), vec![1, 2, 3]);

        scheduler.on_scroll(802.0 * 15.0);
        scheduler.settle().await;
        // Still held until the reclaim delay passes
        assert!(rendered_pages(&scheduler).contains(&1));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let rendered = rendered_pages(&scheduler);
        assert!(!rendered.contains(&1));
        assert!(rendered.contains(&16));
        assert!(!scheduler.canvas(1).unwrap().lock().is_painted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrolling_back_before_delay_keeps_pages() {
        let (scheduler, source) = scheduler_for(MemoryDocument::blank(20)).await;
        scheduler.set_container_height(800.0);
        scheduler.settle().await;
        let renders = source.render_count();

        scheduler.on_scroll(802.0 * 15.0);
        scheduler.settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.on_scroll(0.0);
        scheduler.settle().await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let rendered = rendered_pages(&scheduler);
        assert_eq!(rendered, vec![1, 2, 3]);
        // pages 1-3 were never rendered twice
        assert_eq!(source.render_count(), renders + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_scale_invalidates_and_rerenders() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(10)).await;
        scheduler.set_container_height(800.0);
        scheduler.settle().await;

        scheduler.set_scale(2.0);
        let page = scheduler.page_state(1).unwrap();
        assert!(page.artifact.is_none() || page.is_rendering);
        assert_eq!(page.width, 1224.0);

        scheduler.settle().await;
        let artifact = scheduler.page_state(1).unwrap().artifact.unwrap();
        assert_eq!((artifact.width, artifact.height, artifact.scale), (1224, 1584, 2.0));
        assert_eq!(scheduler.scale(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescale_keeps_current_page() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(10)).await;
        scheduler.set_container_height(800.0);
        scheduler.scroll_to_page(4);

        scheduler.set_scale(0.5);
        assert_eq!(scheduler.current_page(), 4);
        assert_eq!(scheduler.viewport().scroll_offset, 3.0 * (396.0 + 10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_does_not_block_others() {
        let mut document = MemoryDocument::blank(3);
        document.pages[1] = MemoryPage::default().failing_render();
        let (scheduler, source) = scheduler_for(document).await;

        scheduler.set_container_height(800.0);
        scheduler.settle().await;

        assert_eq!(rendered_pages(&scheduler), vec![1, 3]);
        let failed = scheduler.page_state(2).unwrap();
        assert!(failed.error.is_some());
        assert!(!failed.is_rendering);

        // Retried on the next visibility pass
        let renders = source.render_count();
        scheduler.refresh();
        scheduler.settle().await;
        assert_eq!(source.render_count(), renders + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_geometry_replaces_placeholder() {
        let document = MemoryDocument::new(vec![
            MemoryPage::new(300.0, 400.0),
            MemoryPage::default(),
        ]);
        let (scheduler, _source) = scheduler_for(document).await;

        assert_eq!(scheduler.page_state(1).unwrap().height, 792.0);
        scheduler.set_container_height(800.0);
        scheduler.settle().await;

        let page = scheduler.page_state(1).unwrap();
        assert_eq!((page.width, page.height), (300.0, 400.0));
        assert_eq!(scheduler.total_height(), 400.0 + 10.0 + 792.0 + 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoded_page_is_cached_per_artifact() {
        let (scheduler, _source) = scheduler_for(MemoryDocument::blank(2)).await;
        assert!(scheduler.encoded_page(1).await.unwrap().is_none());

        scheduler.set_container_height(800.0);
        scheduler.settle().await;

        let first = scheduler.encoded_page(1).await.unwrap().unwrap();
        let second = scheduler.encoded_page(1).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&first[1..4], b"PNG");
        assert!(scheduler.page_state(1).unwrap().artifact.unwrap().is_encoded());

        assert!(matches!(
            scheduler.encoded_page(3).await,
            Err(Error::PageOutOfBounds { page: 3, total: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_in_flight_renders() {
        let pages = vec![MemoryPage::default().with_render_delay(Duration::from_millis(500)); 3];
        let (scheduler, _source) = scheduler_for(MemoryDocument::new(pages)).await;

        scheduler.set_container_height(800.0);
        tokio::task::yield_now().await;
        scheduler.teardown();
        scheduler.settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(rendered_pages(&scheduler).is_empty());
        assert!(scheduler.page_states().iter().all(|page| !page.is_rendering));
        assert!(!scheduler.canvas(1).unwrap().lock().is_painted());

        // No effect after teardown
        scheduler.on_scroll(100.0);
        assert!(scheduler.page_states().iter().all(|page| !page.is_rendering));
    }
}
