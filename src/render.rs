//! Page render lifecycle
//!
//! [`PageRenderer`] paints pages into shared [`Canvas`]es. A canvas has at
//! most one writer: starting a render on a canvas that is busy with different
//! parameters cancels the old task and waits for it to let go of the canvas
//! before the new one touches it. The bookkeeping lives in a side-table keyed
//! by canvas id, so canvases themselves stay plain data.

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::pdf::{PageAnnotation, PageHandle, PageViewport, Rect, TextItem};
use image::RgbaImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Process-unique canvas identity
pub type CanvasId = u64;

static NEXT_CANVAS_ID: AtomicU64 = AtomicU64::new(1);

/// A positioned run of selectable text, in canvas pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpan {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

impl TextSpan {
    fn from_item(item: TextItem, scale: f32) -> Self {
        Self {
            text: item.text,
            bounds: item.bounds.map(|bounds| bounds.scaled(scale)),
        }
    }
}

/// An annotation overlay box, in canvas pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationBox {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

impl AnnotationBox {
    fn from_annotation(annotation: PageAnnotation, scale: f32) -> Self {
        Self {
            kind: annotation.kind,
            contents: annotation.contents,
            url: annotation.url,
            bounds: annotation.bounds.map(|bounds| bounds.scaled(scale)),
        }
    }
}

/// Drawing surface for one page: pixels plus the text and annotation layers
#[derive(Debug)]
pub struct Canvas {
    id: CanvasId,
    pub width: u32,
    pub height: u32,
    pub pixels: Option<RgbaImage>,
    pub text_layer: Vec<TextSpan>,
    pub annotation_layer: Vec<AnnotationBox>,
}

pub type SharedCanvas = Arc<Mutex<Canvas>>;

impl Canvas {
    pub fn new() -> Self {
        Self {
            id: NEXT_CANVAS_ID.fetch_add(1, Ordering::Relaxed),
            width: 0,
            height: 0,
            pixels: None,
            text_layer: Vec::new(),
            annotation_layer: Vec::new(),
        }
    }

    pub fn shared() -> SharedCanvas {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn id(&self) -> CanvasId {
        self.id
    }

    pub fn is_painted(&self) -> bool {
        self.pixels.is_some()
    }

    /// Drop pixels and both layers
    pub fn clear(&mut self) {
        self.pixels = None;
        self.text_layer.clear();
        self.annotation_layer.clear();
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

/// How a render call ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOutcome {
    /// Pixels and layers are on the canvas
    Rendered,
    /// An identical render was already in flight on the canvas
    Skipped,
    /// Superseded, torn down, or the caller went away
    Cancelled,
}

#[derive(Debug)]
struct ActiveRender {
    task_id: u64,
    page_number: u32,
    scale: f32,
    token: CancellationToken,
    abort: Option<AbortHandle>,
}

impl ActiveRender {
    fn cancel(self) {
        self.token.cancel();
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

#[derive(Debug, Default)]
struct CanvasSlot {
    /// Held by the task painting the canvas
    write_lock: Arc<tokio::sync::Mutex<()>>,
    active: Option<ActiveRender>,
}

type Slots = Arc<Mutex<HashMap<CanvasId, CanvasSlot>>>;

/// Removes a task's side-table record when the task ends, however it ends
struct RecordGuard {
    slots: Slots,
    canvas_id: CanvasId,
    task_id: u64,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        release(&self.slots, self.canvas_id, self.task_id);
    }
}

fn release(slots: &Slots, canvas_id: CanvasId, task_id: u64) {
    let mut slots = slots.lock();
    if let Some(slot) = slots.get_mut(&canvas_id) {
        if slot
            .active
            .as_ref()
            .is_some_and(|active| active.task_id == task_id)
        {
            slot.active = None;
        }
    }
}

/// Drives page renders into canvases
#[derive(Debug, Default)]
pub struct PageRenderer {
    slots: Slots,
    next_task: AtomicU64,
}

impl PageRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `page` at `scale` into `canvas`.
    ///
    /// `liveness` belongs to the caller; once it is cancelled the render stops
    /// at its next suspension point and resolves to
    /// [`RenderOutcome::Cancelled`]. Text and annotation layer failures are
    /// logged and do not fail the render.
    pub async fn render(
        &self,
        page: Arc<dyn PageHandle>,
        canvas: &SharedCanvas,
        scale: f32,
        liveness: &CancellationToken,
    ) -> Result<RenderOutcome> {
        let page_number = page.page_number();
        let canvas_id = canvas.lock().id();
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let token = liveness.child_token();

        let write_lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(canvas_id).or_default();

            if let Some(active) = &slot.active {
                if active.page_number == page_number
                    && active.scale == scale
                    && !active.token.is_cancelled()
                {
                    debug!(page = page_number, scale, "render already in flight");
                    return Ok(RenderOutcome::Skipped);
                }
            }

            let previous = slot.active.replace(ActiveRender {
                task_id,
                page_number,
                scale,
                token: token.clone(),
                abort: None,
            });
            if let Some(previous) = previous {
                debug!(
                    page = previous.page_number,
                    scale = previous.scale,
                    "superseding in-flight render"
                );
                previous.cancel();
            }
            Arc::clone(&slot.write_lock)
        };
        // Owns the record from here on, so a caller that stops polling
        // while waiting for the canvas still clears it
        let record = RecordGuard {
            slots: Arc::clone(&self.slots),
            canvas_id,
            task_id,
        };

        // Wait for the superseded task to let go of the canvas
        let write_guard = write_lock.lock_owned().await;
        if token.is_cancelled() {
            return Ok(RenderOutcome::Cancelled);
        }

        let viewport = page.viewport(scale);
        {
            let mut canvas = canvas.lock();
            canvas.clear();
            (canvas.width, canvas.height) = viewport.pixel_size();
        }

        let task = tokio::spawn(paint(
            page,
            Arc::clone(canvas),
            viewport,
            token,
            write_guard,
            record,
        ));

        {
            let mut slots = self.slots.lock();
            let active = slots
                .get_mut(&canvas_id)
                .and_then(|slot| slot.active.as_mut())
                .filter(|active| active.task_id == task_id);
            match active {
                Some(active) => active.abort = Some(task.abort_handle()),
                // Superseded or finished before the handle was recorded
                None => task.abort(),
            }
        }

        match task.await {
            Ok(Ok(())) => Ok(RenderOutcome::Rendered),
            Ok(Err(e)) if e.is_cancellation() => Ok(RenderOutcome::Cancelled),
            Ok(Err(e @ Error::Render { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::Render {
                page: page_number,
                reason: e.to_string(),
            }),
            Err(e) if e.is_cancelled() => Ok(RenderOutcome::Cancelled),
            Err(e) => Err(Error::TaskJoin(e)),
        }
    }

    /// Cancel whatever is painting `canvas` and wipe it
    pub fn teardown(&self, canvas: &SharedCanvas) {
        let canvas_id = canvas.lock().id();
        let active = self
            .slots
            .lock()
            .get_mut(&canvas_id)
            .and_then(|slot| slot.active.take());
        if let Some(active) = active {
            debug!(page = active.page_number, "tearing down in-flight render");
            active.cancel();
        }
        canvas.lock().clear();
    }

    /// Drop the side-table entry of a canvas that will not be drawn again
    pub fn forget(&self, canvas_id: CanvasId) {
        if let Some(slot) = self.slots.lock().remove(&canvas_id) {
            if let Some(active) = slot.active {
                active.cancel();
            }
        }
    }

    pub fn is_rendering(&self, canvas_id: CanvasId) -> bool {
        self.slots
            .lock()
            .get(&canvas_id)
            .is_some_and(|slot| slot.active.is_some())
    }

    /// Number of canvases with a render in flight
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.active.is_some())
            .count()
    }
}

async fn paint(
    page: Arc<dyn PageHandle>,
    canvas: SharedCanvas,
    viewport: PageViewport,
    token: CancellationToken,
    _write_guard: OwnedMutexGuard<()>,
    _record: RecordGuard,
) -> Result<()> {
    let page_number = page.page_number();
    let bitmap = page.render(viewport, token.clone()).await?;
    {
        let mut canvas = canvas.lock();
        token.check()?;
        canvas.pixels = Some(bitmap);
    }

    let text = page.text_content().await;
    token.check()?;
    match text {
        Ok(items) => {
            canvas.lock().text_layer = items
                .into_iter()
                .map(|item| TextSpan::from_item(item, viewport.scale))
                .collect();
        }
        Err(e) => warn!(page = page_number, error = %e, "text layer failed"),
    }

    let annotations = page.annotations().await;
    token.check()?;
    match annotations {
        Ok(annotations) => {
            canvas.lock().annotation_layer = annotations
                .into_iter()
                .map(|annotation| AnnotationBox::from_annotation(annotation, viewport.scale))
                .collect();
        }
        Err(e) => warn!(page = page_number, error = %e, "annotation layer failed"),
    }

    Ok(())
}
