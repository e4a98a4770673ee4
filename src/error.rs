//! Error types for the PDF viewport engine

use thiserror::Error;

/// Result type alias for the PDF viewport engine
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the PDF viewport engine
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDF is password protected
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Page out of bounds
    #[error("Page {page} out of bounds (total: {total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Page render failed for a reason other than cancellation
    #[error("Failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    /// Operation was superseded or its caller stopped waiting for it
    #[error("Operation cancelled")]
    Cancelled,

    /// Image encoding error
    #[error("Image encoding failed: {0}")]
    ImageEncode(#[from] image::ImageError),

    /// Operation needs a loaded document
    #[error("No document loaded")]
    NoDocument,

    /// Document handle was destroyed while still in use
    #[error("Document closed: {url}")]
    DocumentClosed { url: String },

    /// Background task panicked or was aborted
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether this error is the expected outcome of a superseded or
    /// abandoned operation rather than a real failure.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::TaskJoin(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::PasswordRequired => "PDF is password protected".to_string(),
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} out of bounds (total: {})", page, total)
            }
            Error::SourceResolution { .. } => "Failed to resolve PDF source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Pdfium { .. } => "PDF processing error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::Render { page, .. } => format!("Failed to render page {}", page),
            Error::Cancelled => "Operation cancelled".to_string(),
            Error::ImageEncode(_) => "Image encoding failed".to_string(),
            Error::NoDocument => "No document loaded".to_string(),
            Error::DocumentClosed { .. } => "Document closed".to_string(),
            Error::TaskJoin(_) => "Internal task failure".to_string(),
        }
    }
}
