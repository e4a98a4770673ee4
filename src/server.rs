//! MCP Server implementation using rmcp
//!
//! Exposes one viewer session as tools: open a document, navigate, zoom,
//! scroll, search, and fetch rendered pages as PNG.

use crate::config::ViewerConfig;
use crate::pdf::{DocumentSource, PdfiumSource};
use crate::session::{DocumentSession, SessionSnapshot};
use crate::search::{wait_until_idle, SearchState};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where to load a PDF from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// URL to download PDF from
    Url {
        /// URL of the PDF file
        url: String,
    },
}

impl PdfSource {
    /// The document URL this source loads from
    pub fn to_url(&self) -> String {
        match self {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Url { url } => url.clone(),
            PdfSource::Base64 { base64 } => format!("data:application/pdf;base64,{}", base64),
        }
    }
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(
                "Invalid source: expected an object with one of \"path\", \"base64\" or \"url\"",
            ));
        };

        for key in ["path", "base64", "url"] {
            let Some(v) = obj.get(key) else {
                continue;
            };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => PdfSource::Path { path: s },
                "base64" => PdfSource::Base64 { base64: s },
                _ => PdfSource::Url { url: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\" or \"url\", but got keys: {:?}",
            keys
        )))
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OpenDocumentParams {
    /// Document to open
    pub source: PdfSource,
    /// Height of the viewing area in pixels
    #[serde(default)]
    pub container_height: Option<f32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GoToPageParams {
    /// Page number (1-indexed)
    pub page: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetZoomParams {
    /// Zoom factor, clamped to 0.1-5.0
    pub scale: f32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScrollParams {
    /// Vertical scroll offset in pixels
    pub offset: f32,
    /// Height of the viewing area in pixels
    #[serde(default)]
    pub container_height: Option<f32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Text to search for (case-insensitive)
    pub query: String,
    /// Wait for the search to finish before responding (default: true)
    #[serde(default = "default_true")]
    pub wait: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderPageParams {
    /// Page number (1-indexed, default: current page)
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RenderedPageInfo {
    /// Page number (1-indexed)
    pub page: u32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Zoom factor the page was rendered at
    pub scale: f32,
    /// Base64 encoded image data (PNG format)
    pub data_base64: String,
    /// MIME type (always "image/png")
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
struct NavigationResult {
    changed: bool,
    state: SessionSnapshot,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn error_json(message: String) -> String {
    to_json(&serde_json::json!({ "error": message }))
}

/// MCP server wrapping a single viewer session
#[derive(Clone)]
pub struct PdfViewerServer {
    session: Arc<Mutex<DocumentSession>>,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfViewerServer {
    pub fn new() -> Self {
        Self::with_config(ViewerConfig::default())
    }

    /// Create a server that loads documents through PDFium
    pub fn with_config(config: ViewerConfig) -> Self {
        let source = Arc::new(PdfiumSource::new(config.source.clone()));
        Self::with_source(source, config)
    }

    /// Create a server over any document source
    pub fn with_source(source: Arc<dyn DocumentSource>, config: ViewerConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(DocumentSession::new(source, config))),
            tool_router: Self::tool_router(),
        }
    }

    /// Open a document
    #[tool(
        description = "Open a PDF in the viewer, replacing any open document. Renders the first visible pages.

Source format: one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"} or {\"base64\": \"...\"}"
    )]
    async fn open_document(&self, Parameters(params): Parameters<OpenDocumentParams>) -> String {
        let mut session = self.session.lock().await;
        if let Some(height) = params.container_height {
            session.set_container_height(height);
        }

        match session.load(&params.source.to_url()).await {
            Ok(()) => to_json(&session.snapshot()),
            Err(e) => {
                tracing::warn!(error = %e, "open_document failed");
                error_json(e.client_message())
            }
        }
    }

    #[tool(description = "Close the open document and release its resources")]
    async fn close_document(&self) -> String {
        let mut session = self.session.lock().await;
        let was_open = session.document().is_some();
        session.cleanup();
        to_json(&serde_json::json!({ "closed": was_open }))
    }

    #[tool(
        description = "Get the viewer state: current page, page count, zoom, scroll position, rendered pages and search results"
    )]
    async fn viewer_state(&self) -> String {
        to_json(&self.session.lock().await.snapshot())
    }

    #[tool(description = "Go to a page (1-indexed). Out-of-range pages leave the viewer unchanged.")]
    async fn go_to_page(&self, Parameters(params): Parameters<GoToPageParams>) -> String {
        let mut session = self.session.lock().await;
        let changed = session.set_current_page(params.page);
        to_json(&NavigationResult {
            changed,
            state: session.snapshot(),
        })
    }

    #[tool(description = "Go to the next page")]
    async fn next_page(&self) -> String {
        let mut session = self.session.lock().await;
        let before = session.current_page();
        session.next_page();
        to_json(&NavigationResult {
            changed: session.current_page() != before,
            state: session.snapshot(),
        })
    }

    #[tool(description = "Go to the previous page")]
    async fn previous_page(&self) -> String {
        let mut session = self.session.lock().await;
        let before = session.current_page();
        session.previous_page();
        to_json(&NavigationResult {
            changed: session.current_page() != before,
            state: session.snapshot(),
        })
    }

    #[tool(description = "Set the zoom factor (0.1 to 5.0). Rendered pages are re-rendered at the new zoom.")]
    async fn set_zoom(&self, Parameters(params): Parameters<SetZoomParams>) -> String {
        let mut session = self.session.lock().await;
        session.set_scale(params.scale);
        to_json(&session.snapshot())
    }

    #[tool(description = "Scroll the viewer to a vertical offset in pixels")]
    async fn scroll(&self, Parameters(params): Parameters<ScrollParams>) -> String {
        let mut session = self.session.lock().await;
        if let Some(height) = params.container_height {
            session.set_container_height(height);
        }
        session.on_scroll(params.offset);
        to_json(&session.snapshot())
    }

    #[tool(
        description = "Search the open document for text (case-insensitive). An empty query clears the search."
    )]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> String {
        let receiver = {
            let session = self.session.lock().await;
            let Some(receiver) = session.subscribe_search() else {
                return error_json(crate::error::Error::NoDocument.client_message());
            };
            session.search(&params.query);
            receiver
        };

        // Other tools keep running while the search does
        let state = if params.wait {
            wait_until_idle(receiver).await
        } else {
            receiver.borrow().clone()
        };
        to_json(&state)
    }

    #[tool(description = "Move to the next search match, wrapping around")]
    async fn next_match(&self) -> String {
        let session = self.session.lock().await;
        session.next_match();
        to_json(&session.search_state())
    }

    #[tool(description = "Move to the previous search match, wrapping around")]
    async fn previous_match(&self) -> String {
        let session = self.session.lock().await;
        session.previous_match();
        to_json(&session.search_state())
    }

    #[tool(description = "Clear the current search")]
    async fn clear_search(&self) -> String {
        let session = self.session.lock().await;
        session.clear_search();
        to_json(&SearchState::default())
    }

    #[tool(
        description = "Render a page as a PNG image (base64). Navigates the viewer to the page and waits for its render."
    )]
    async fn render_page(&self, Parameters(params): Parameters<RenderPageParams>) -> String {
        let mut session = self.session.lock().await;
        let page = params.page.unwrap_or_else(|| session.current_page());

        match session.render_page_png(page).await {
            Ok(rendered) => to_json(&RenderedPageInfo {
                page: rendered.page,
                width: rendered.width,
                height: rendered.height,
                scale: rendered.scale,
                data_base64: base64::engine::general_purpose::STANDARD.encode(rendered.png.as_slice()),
                mime_type: "image/png".to_string(),
            }),
            Err(e) => {
                tracing::warn!(page, error = %e, "render_page failed");
                error_json(e.client_message())
            }
        }
    }
}

impl Default for PdfViewerServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfViewerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF viewer: open a document, then navigate, zoom, scroll and search it. \
                 Pages are rendered on demand around the scroll position; use render_page \
                 to fetch a page as PNG."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ViewerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ViewerConfig) -> Result<()> {
    let server = PdfViewerServer::with_config(config);

    tracing::info!("PDF viewer MCP server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::memory::{MemoryDocument, MemoryDocumentSource};
    use serde_json::Value;
    use std::time::Duration;

    fn server_with(documents: &[(&str, MemoryDocument)]) -> PdfViewerServer {
        let source = Arc::new(MemoryDocumentSource::new());
        for (url, document) in documents {
            source.insert(*url, document.clone());
        }
        PdfViewerServer::with_source(source, ViewerConfig::default())
    }

    fn parse(response: String) -> Value {
        serde_json::from_str(&response).unwrap()
    }

    async fn open(server: &PdfViewerServer, path: &str) -> Value {
        parse(
            server
                .open_document(Parameters(OpenDocumentParams {
                    source: PdfSource::Path {
                        path: path.to_string(),
                    },
                    container_height: Some(800.0),
                }))
                .await,
        )
    }

    #[test]
    fn test_pdf_source_deserialization() {
        let source: PdfSource = serde_json::from_str(r#"{"path": "/test.pdf"}"#).unwrap();
        assert_eq!(source.to_url(), "/test.pdf");

        let source: PdfSource = serde_json::from_str(r#"{"base64": "JVBERi0xLjQ="}"#).unwrap();
        assert_eq!(source.to_url(), "data:application/pdf;base64,JVBERi0xLjQ=");

        let source: PdfSource =
            serde_json::from_str(r#"{"url": "https://example.com/test.pdf"}"#).unwrap();
        assert!(matches!(source, PdfSource::Url { .. }));

        let err = serde_json::from_str::<PdfSource>(r#"{"path": 42}"#).unwrap_err();
        assert!(err.to_string().contains("\"path\" must be a string"));

        let err = serde_json::from_str::<PdfSource>(r#"{"file": "x.pdf"}"#).unwrap_err();
        assert!(err.to_string().contains("but got keys"));

        assert!(serde_json::from_str::<PdfSource>(r#""x.pdf""#).is_err());
    }

    #[test]
    fn test_params_defaults() {
        let params: SearchParams = serde_json::from_str(r#"{"query": "alpha"}"#).unwrap();
        assert!(params.wait);

        let params: RenderPageParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.page, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_and_navigate() {
        let server = server_with(&[("mem://doc.pdf", MemoryDocument::blank(10))]);

        let state = open(&server, "mem://doc.pdf").await;
        assert_eq!(state["total_pages"], 10);
        assert_eq!(state["current_page"], 1);

        let result = parse(
            server
                .go_to_page(Parameters(GoToPageParams { page: 4 }))
                .await,
        );
        assert_eq!(result["changed"], true);
        assert_eq!(result["state"]["current_page"], 4);

        let result = parse(
            server
                .go_to_page(Parameters(GoToPageParams { page: 11 }))
                .await,
        );
        assert_eq!(result["changed"], false);
        assert_eq!(result["state"]["current_page"], 4);

        let result = parse(server.next_page().await);
        assert_eq!(result["state"]["current_page"], 5);
        let result = parse(server.previous_page().await);
        assert_eq!(result["state"]["current_page"], 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_missing_document_reports_error() {
        let server = server_with(&[]);
        let state = open(&server, "mem://missing.pdf").await;
        assert_eq!(state["error"], "PDF not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_tools() {
        let server = server_with(&[(
            "mem://doc.pdf",
            MemoryDocument::with_page_texts(&["alpha beta", "beta gamma", "gamma alpha"]),
        )]);
        open(&server, "mem://doc.pdf").await;

        let state = parse(
            server
                .search(Parameters(SearchParams {
                    query: "alpha".to_string(),
                    wait: true,
                }))
                .await,
        );
        assert_eq!(state["matches"].as_array().unwrap().len(), 2);
        assert_eq!(state["matches"][1]["page_index"], 2);
        assert_eq!(state["current_match_index"], 0);

        let state = parse(server.next_match().await);
        assert_eq!(state["current_match_index"], 1);
        let state = parse(server.next_match().await);
        assert_eq!(state["current_match_index"], 0);

        let state = parse(server.clear_search().await);
        assert_eq!(state["current_match_index"], -1);
        let state = parse(server.viewer_state().await);
        assert_eq!(state["search"]["query"], "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tools_run_while_search_waits() {
        let server = server_with(&[(
            "mem://doc.pdf",
            MemoryDocument::with_page_texts(&["alpha beta", "beta gamma", "gamma alpha"]),
        )]);
        open(&server, "mem://doc.pdf").await;

        let (searched, viewed) = tokio::join!(
            server.search(Parameters(SearchParams {
                query: "alpha".to_string(),
                wait: true,
            })),
            // Must not queue behind the search for the session lock
            tokio::time::timeout(Duration::ZERO, server.viewer_state())
        );

        let viewed = parse(viewed.expect("viewer_state blocked behind search"));
        assert_eq!(viewed["search"]["query"], "alpha");
        assert_eq!(viewed["search"]["is_searching"], true);

        let searched = parse(searched);
        assert_eq!(searched["matches"].as_array().unwrap().len(), 2);
        assert_eq!(searched["is_searching"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_without_document() {
        let server = server_with(&[]);
        let result = parse(
            server
                .search(Parameters(SearchParams {
                    query: "alpha".to_string(),
                    wait: true,
                }))
                .await,
        );
        assert_eq!(result["error"], "No document loaded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_scroll_and_render() {
        let server = server_with(&[("mem://doc.pdf", MemoryDocument::blank(10))]);
        open(&server, "mem://doc.pdf").await;

        let state = parse(
            server
                .set_zoom(Parameters(SetZoomParams { scale: 0.01 }))
                .await,
        );
        assert_eq!(state["scale"].as_f64().unwrap() as f32, 0.1);
        server
            .set_zoom(Parameters(SetZoomParams { scale: 2.0 }))
            .await;

        // Each page is 1584px tall at 2x, plus a 10px gap
        let state = parse(
            server
                .scroll(Parameters(ScrollParams {
                    offset: 1594.0 * 2.0,
                    container_height: None,
                }))
                .await,
        );
        assert_eq!(state["current_page"], 3);

        let rendered = parse(
            server
                .render_page(Parameters(RenderPageParams { page: Some(2) }))
                .await,
        );
        assert_eq!(rendered["page"], 2);
        assert_eq!(rendered["width"], 1224);
        assert_eq!(rendered["mime_type"], "image/png");
        let png = base64::engine::general_purpose::STANDARD
            .decode(rendered["data_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_document() {
        let server = server_with(&[("mem://doc.pdf", MemoryDocument::blank(2))]);
        open(&server, "mem://doc.pdf").await;

        let result = parse(server.close_document().await);
        assert_eq!(result["closed"], true);
        let result = parse(server.close_document().await);
        assert_eq!(result["closed"], false);

        let state = parse(server.viewer_state().await);
        assert_eq!(state["total_pages"], 0);
    }
}
