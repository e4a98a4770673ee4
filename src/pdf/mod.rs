//! PDF document layer
//!
//! This module defines the document/page interface the viewer works against,
//! with a PDFium implementation. An in-memory implementation is available to
//! tests and behind the `test-util` feature.

mod document;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod pdfium;

pub use document::{
    join_text_items, DocumentHandle, DocumentSource, PageAnnotation, PageHandle, PageViewport,
    Rect, TextItem,
};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryDocument, MemoryDocumentSource, MemoryPage};
pub use pdfium::PdfiumSource;
