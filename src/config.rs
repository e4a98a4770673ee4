//! Viewer configuration

use std::time::Duration;

/// Natural page width used before a page's real geometry is known (US Letter, points)
pub const DEFAULT_PAGE_WIDTH: f32 = 612.0;
/// Natural page height used before a page's real geometry is known (US Letter, points)
pub const DEFAULT_PAGE_HEIGHT: f32 = 792.0;

/// Smallest accepted zoom factor
pub const MIN_SCALE: f32 = 0.1;
/// Largest accepted zoom factor
pub const MAX_SCALE: f32 = 5.0;

/// Tunables for the virtual viewport scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Overscan above and below the viewport, in default page heights (default: 2.0)
    pub overscan_pages: f32,
    /// Vertical gap between stacked pages at any scale (default: 10.0)
    pub page_margin: f32,
    /// Delay before off-screen rendered pages are reclaimed (default: 2s)
    pub reclaim_delay: Duration,
    /// Placeholder width until a page's geometry is fetched
    pub default_page_width: f32,
    /// Placeholder height until a page's geometry is fetched
    pub default_page_height: f32,
    /// Maximum number of page renders in flight at once (default: 4)
    pub max_concurrent_renders: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            overscan_pages: 2.0,
            page_margin: 10.0,
            reclaim_delay: Duration::from_secs(2),
            default_page_width: DEFAULT_PAGE_WIDTH,
            default_page_height: DEFAULT_PAGE_HEIGHT,
            max_concurrent_renders: 4,
        }
    }
}

/// Source resolution and security limits
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Directories local paths must live in (empty: any path is allowed)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Top-level configuration for a viewer session and the server wrapping it
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
    /// Quiet period before a search query executes (default: 300ms)
    pub search_debounce: Duration,
    /// Maximum number of loaded documents kept by the load cache (default: 16)
    pub load_cache_entries: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            source: SourceConfig::default(),
            search_debounce: Duration::from_millis(300),
            load_cache_entries: 16,
        }
    }
}
