//! PDFium-backed document source
//!
//! PDFium is not thread-safe, so every page operation binds a fresh library
//! instance and reopens the document bytes on a blocking thread.

use crate::cancel::CancellationToken;
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::pdf::document::{
    DocumentHandle, DocumentSource, PageAnnotation, PageHandle, PageViewport, Rect, TextItem,
};
use crate::source::resolve;
use async_trait::async_trait;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Map PDFium errors to our error type
fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

/// Open `data` and run `f` against one of its pages (1-indexed)
fn with_page<T>(data: &[u8], page_number: u32, f: impl FnOnce(&PdfPage) -> Result<T>) -> Result<T> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_pdfium_error)?;

    let page = document
        .pages()
        .get((page_number - 1) as u16)
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", page_number, e),
        })?;

    f(&page)
}

fn read_page_sizes(data: &[u8]) -> Result<Vec<(f32, f32)>> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_pdfium_error)?;

    Ok(document
        .pages()
        .iter()
        .map(|page| (page.width().value, page.height().value))
        .collect())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Convert a PDF-space rectangle (bottom-left origin) to top-left page coordinates
fn to_page_rect(rect: &PdfRect, page_height: f32) -> Rect {
    Rect::new(
        rect.left().value,
        page_height - rect.top().value,
        rect.right().value,
        page_height - rect.bottom().value,
    )
}

fn annotation_kind(ann_type: PdfPageAnnotationType) -> &'static str {
    match ann_type {
        PdfPageAnnotationType::Text => "text",
        PdfPageAnnotationType::Link => "link",
        PdfPageAnnotationType::FreeText => "freetext",
        PdfPageAnnotationType::Highlight => "highlight",
        PdfPageAnnotationType::Underline => "underline",
        PdfPageAnnotationType::Squiggly => "squiggly",
        PdfPageAnnotationType::Strikeout => "strikeout",
        PdfPageAnnotationType::Stamp => "stamp",
        PdfPageAnnotationType::Ink => "ink",
        PdfPageAnnotationType::Square => "square",
        PdfPageAnnotationType::Circle => "circle",
        PdfPageAnnotationType::Line => "line",
        PdfPageAnnotationType::Widget => "widget",
        _ => "other",
    }
}

fn extract_text_items(page: &PdfPage) -> Result<Vec<TextItem>> {
    let page_height = page.height().value;
    let text = page.text().map_err(map_pdfium_error)?;

    Ok(text
        .segments()
        .iter()
        .filter_map(|segment| {
            let content = segment.text();
            let content = content.trim();
            if content.is_empty() {
                return None;
            }
            Some(TextItem {
                text: content.to_string(),
                bounds: Some(to_page_rect(&segment.bounds(), page_height)),
            })
        })
        .collect())
}

fn extract_page_annotations(page: &PdfPage) -> Vec<PageAnnotation> {
    let page_height = page.height().value;

    page.annotations()
        .iter()
        .filter(|annotation| annotation.annotation_type() != PdfPageAnnotationType::Popup)
        .map(|annotation| {
            let url = annotation
                .as_link_annotation()
                .and_then(|link_annotation| link_annotation.link().ok())
                .and_then(|link| link.action())
                .and_then(|action| {
                    action
                        .as_uri_action()
                        .and_then(|uri_action| uri_action.uri().ok())
                });

            PageAnnotation {
                kind: annotation_kind(annotation.annotation_type()).to_string(),
                contents: annotation.contents().filter(|s| !s.is_empty()),
                url,
                bounds: annotation
                    .bounds()
                    .ok()
                    .map(|rect| to_page_rect(&rect, page_height)),
            }
        })
        .collect()
}

/// Loads documents from paths, URLs and data URLs through PDFium
pub struct PdfiumSource {
    config: SourceConfig,
}

impl PdfiumSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DocumentSource for PdfiumSource {
    async fn load_document(&self, url: &str) -> Result<Arc<dyn DocumentHandle>> {
        let data = Arc::new(resolve(url, &self.config).await?);

        let sizes = {
            let data = Arc::clone(&data);
            blocking(move || read_page_sizes(&data)).await?
        };

        info!(url, pages = sizes.len(), "document loaded");

        Ok(Arc::new(PdfiumDocument {
            url: url.to_string(),
            fingerprint: uuid::Uuid::new_v4().to_string(),
            shared: Arc::new(SharedDocument {
                data,
                destroyed: AtomicBool::new(false),
            }),
            sizes,
        }))
    }
}

struct SharedDocument {
    data: Arc<Vec<u8>>,
    destroyed: AtomicBool,
}

impl SharedDocument {
    fn ensure_open(&self, url: &str) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::DocumentClosed {
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

struct PdfiumDocument {
    url: String,
    fingerprint: String,
    shared: Arc<SharedDocument>,
    sizes: Vec<(f32, f32)>,
}

#[async_trait]
impl DocumentHandle for PdfiumDocument {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn page_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    async fn get_page(&self, page_number: u32) -> Result<Arc<dyn PageHandle>> {
        self.shared.ensure_open(&self.url)?;

        let (width, height) = page_number
            .checked_sub(1)
            .and_then(|index| self.sizes.get(index as usize))
            .copied()
            .ok_or(Error::PageOutOfBounds {
                page: page_number,
                total: self.page_count(),
            })?;

        Ok(Arc::new(PdfiumPage {
            url: self.url.clone(),
            page_number,
            width,
            height,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn destroy(&self) {
        if !self.shared.destroyed.swap(true, Ordering::AcqRel) {
            debug!(url = %self.url, "document destroyed");
        }
    }
}

struct PdfiumPage {
    url: String,
    page_number: u32,
    width: f32,
    height: f32,
    shared: Arc<SharedDocument>,
}

#[async_trait]
impl PageHandle for PdfiumPage {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn viewport(&self, scale: f32) -> PageViewport {
        PageViewport::new(self.width, self.height, scale)
    }

    async fn text_content(&self) -> Result<Vec<TextItem>> {
        self.shared.ensure_open(&self.url)?;
        let data = Arc::clone(&self.shared.data);
        let page_number = self.page_number;
        blocking(move || with_page(&data, page_number, extract_text_items)).await
    }

    async fn annotations(&self) -> Result<Vec<PageAnnotation>> {
        self.shared.ensure_open(&self.url)?;
        let data = Arc::clone(&self.shared.data);
        let page_number = self.page_number;
        blocking(move || with_page(&data, page_number, |page| Ok(extract_page_annotations(page))))
            .await
    }

    async fn render(&self, viewport: PageViewport, token: CancellationToken) -> Result<RgbaImage> {
        self.shared.ensure_open(&self.url)?;
        token.check()?;

        let data = Arc::clone(&self.shared.data);
        let page_number = self.page_number;
        let render_token = token.clone();
        let bitmap = blocking(move || {
            render_token.check()?;
            with_page(&data, page_number, |page| {
                let config = PdfRenderConfig::new()
                    .scale_page_by_factor(viewport.scale)
                    .render_form_data(true)
                    .render_annotations(true);

                let bitmap = page
                    .render_with_config(&config)
                    .map_err(|e| Error::Render {
                        page: page_number,
                        reason: e.to_string(),
                    })?;
                Ok(bitmap.as_image().to_rgba8())
            })
        })
        .await?;

        token.check()?;
        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_page_rect_flips_y_axis() {
        let rect = PdfRect::new_from_values(700.0, 72.0, 720.0, 300.0);
        let converted = to_page_rect(&rect, 792.0);
        assert_eq!(converted, Rect::new(72.0, 72.0, 300.0, 92.0));
    }

    #[test]
    fn test_annotation_kind() {
        assert_eq!(annotation_kind(PdfPageAnnotationType::Link), "link");
        assert_eq!(annotation_kind(PdfPageAnnotationType::Highlight), "highlight");
        assert_eq!(annotation_kind(PdfPageAnnotationType::Sound), "other");
    }

    #[tokio::test]
    async fn test_load_rejects_non_pdf_data() {
        let source = PdfiumSource::new(SourceConfig::default());
        // "Hello World"
        let result = source
            .load_document("data:application/pdf;base64,SGVsbG8gV29ybGQ=")
            .await;
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }
}
