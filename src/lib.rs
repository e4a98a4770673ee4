//! Virtualized PDF viewer engine
//!
//! This crate keeps a PDF on screen the way a scrolling viewer does:
//! - `viewport`: lay pages out vertically, render only those near the
//!   scroll position and reclaim the rest after a delay
//! - `render`: one render per canvas at a time, superseded renders are
//!   cancelled
//! - `search`: debounced, cancellable full-text search over cached page text
//! - `session`: one open document with navigation, zoom and search
//! - `server`: the session exposed as MCP tools

pub mod cancel;
pub mod config;
pub mod error;
pub mod pdf;
pub mod render;
pub mod search;
pub mod server;
pub mod session;
pub mod source;
pub mod viewport;

pub use cancel::{CancellationToken, Debouncer};
pub use config::{SchedulerConfig, SourceConfig, ViewerConfig};
pub use error::{Error, Result};
pub use render::{Canvas, PageRenderer, RenderOutcome, SharedCanvas};
pub use search::{PageTextCache, SearchEngine, SearchMatch, SearchState};
pub use server::{run_server, run_server_with_config, PdfSource, PdfViewerServer};
pub use session::{DocumentSession, RenderedPage, SessionSnapshot};
pub use source::DocumentLoadCache;
pub use viewport::{PageRenderState, ViewportScheduler};
