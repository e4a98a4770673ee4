//! Vertical page layout
//!
//! Pages are stacked top to bottom in page-number order, each followed by a
//! fixed margin. Everything here is pure arithmetic over scaled page sizes.

use serde::Serialize;
use std::ops::RangeInclusive;

/// Natural page size at scale 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    /// 1-based
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    pub fn new(page_number: u32, width: f32, height: f32) -> Self {
        Self {
            page_number,
            width,
            height,
        }
    }
}

/// Scroll position and visible height of the scroll container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ViewportState {
    pub scroll_offset: f32,
    pub container_height: f32,
}

#[derive(Debug, Clone, Copy)]
struct PlacedPage {
    top: f32,
    width: f32,
    height: f32,
}

impl PlacedPage {
    fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Page positions for one scale
#[derive(Debug, Clone)]
pub struct PageLayout {
    pages: Vec<PlacedPage>,
    margin: f32,
}

impl PageLayout {
    /// Lay out `geometries` (in page-number order) at `scale`
    pub fn new(geometries: &[PageGeometry], scale: f32, margin: f32) -> Self {
        let mut top = 0.0;
        let pages = geometries
            .iter()
            .map(|geometry| {
                let page = PlacedPage {
                    top,
                    width: geometry.width * scale,
                    height: geometry.height * scale,
                };
                top += page.height + margin;
                page
            })
            .collect();

        Self { pages, margin }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn placed(&self, page_number: u32) -> Option<&PlacedPage> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
    }

    /// Top edge of a page
    pub fn page_top(&self, page_number: u32) -> Option<f32> {
        self.placed(page_number).map(|page| page.top)
    }

    /// Scaled `(width, height)` of a page
    pub fn page_size(&self, page_number: u32) -> Option<(f32, f32)> {
        self.placed(page_number)
            .map(|page| (page.width, page.height))
    }

    /// Height of the whole stack, trailing margin included
    pub fn total_height(&self) -> f32 {
        self.pages
            .last()
            .map_or(0.0, |page| page.bottom() + self.margin)
    }

    /// Pages intersecting `[scroll_offset - overscan, scroll_offset + container_height + overscan]`.
    ///
    /// `None` when no page intersects the window (empty document, or a
    /// window entirely past the end or inside a margin).
    pub fn visible_range(
        &self,
        viewport: ViewportState,
        overscan: f32,
    ) -> Option<RangeInclusive<u32>> {
        let start = viewport.scroll_offset - overscan;
        let end = viewport.scroll_offset + viewport.container_height + overscan;

        let first = self.pages.partition_point(|page| page.bottom() < start);
        let last = self.pages.partition_point(|page| page.top <= end);
        if first >= last {
            return None;
        }
        Some(first as u32 + 1..=last as u32)
    }

    /// The first page whose bottom lies at least half its height below
    /// `scroll_offset`, or the last page when there is none
    pub fn current_page_from_scroll(&self, scroll_offset: f32) -> Option<u32> {
        if self.pages.is_empty() {
            return None;
        }
        let index = self
            .pages
            .partition_point(|page| page.bottom() - scroll_offset < page.height / 2.0);
        Some((index.min(self.pages.len() - 1) + 1) as u32)
    }

    /// Scroll offset that puts the top of `page_number` at the top of the viewport
    pub fn scroll_offset_for_page(&self, page_number: u32) -> Option<f32> {
        self.page_top(page_number)
    }
}
