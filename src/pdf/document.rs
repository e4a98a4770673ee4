//! Document source interface
//!
//! The viewer never talks to a PDF library directly. It loads documents
//! through a [`DocumentSource`], fetches pages from the resulting
//! [`DocumentHandle`] and renders/extracts through [`PageHandle`].

use crate::cancel::CancellationToken;
use crate::error::Result;
use async_trait::async_trait;
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;

/// Axis-aligned rectangle, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Multiply every coordinate by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
        }
    }
}

/// Page dimensions at a given scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageViewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl PageViewport {
    /// Viewport of a page whose natural size is `width` x `height` points
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width: width * scale,
            height: height * scale,
            scale,
        }
    }

    /// Whole-pixel size of a bitmap covering this viewport (at least 1x1)
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.ceil().max(1.0) as u32,
            self.height.ceil().max(1.0) as u32,
        )
    }
}

/// A fragment of page text in reading order
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Bounds in page points
    pub bounds: Option<Rect>,
}

impl TextItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounds: None,
        }
    }
}

/// Read-only page annotation (links, notes, markup)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnnotation {
    /// Annotation type (e.g., "link", "highlight", "text")
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bounds in page points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

/// Concatenate text fragments with single spaces, the form search runs over
pub fn join_text_items(items: &[TextItem]) -> String {
    items
        .iter()
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Loads documents by URL
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load_document(&self, url: &str) -> Result<Arc<dyn DocumentHandle>>;
}

/// A loaded document
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    /// Identifier that is stable for the lifetime of the handle
    fn fingerprint(&self) -> &str;

    /// URL the document was loaded from
    fn url(&self) -> &str;

    fn page_count(&self) -> u32;

    /// Fetch a page (1-indexed)
    async fn get_page(&self, page_number: u32) -> Result<Arc<dyn PageHandle>>;

    /// Release the document. Later `get_page` calls fail.
    fn destroy(&self);
}

/// One page of a loaded document
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// 1-indexed page number
    fn page_number(&self) -> u32;

    fn viewport(&self, scale: f32) -> PageViewport;

    async fn text_content(&self) -> Result<Vec<TextItem>>;

    async fn annotations(&self) -> Result<Vec<PageAnnotation>>;

    /// Paint the page at `viewport` into a new bitmap.
    ///
    /// Implementations check `token` at their own suspension points and
    /// return `Error::Cancelled` once it fires.
    async fn render(&self, viewport: PageViewport, token: CancellationToken) -> Result<RgbaImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_scaling() {
        let viewport = PageViewport::new(612.0, 792.0, 1.5);
        assert_eq!(viewport.width, 918.0);
        assert_eq!(viewport.height, 1188.0);
        assert_eq!(viewport.pixel_size(), (918, 1188));
    }

    #[test]
    fn test_viewport_pixel_size_rounds_up() {
        let viewport = PageViewport::new(100.3, 0.0, 1.0);
        assert_eq!(viewport.pixel_size(), (101, 1));
    }

    #[test]
    fn test_join_text_items() {
        let items = vec![TextItem::new("alpha"), TextItem::new("beta")];
        assert_eq!(join_text_items(&items), "alpha beta");
        assert_eq!(join_text_items(&[]), "");
    }

    #[test]
    fn test_rect_scaled() {
        let rect = Rect::new(10.0, 20.0, 30.0, 60.0).scaled(2.0);
        assert_eq!(rect, Rect::new(20.0, 40.0, 60.0, 120.0));
        assert_eq!(rect.width(), 40.0);
        assert_eq!(rect.height(), 80.0);
    }
}
