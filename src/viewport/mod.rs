//! Virtualized page viewport: layout math and render scheduling

pub mod layout;
mod scheduler;

pub use layout::{PageGeometry, PageLayout, ViewportState};
pub use scheduler::{PageRenderState, RenderedArtifact, ViewportScheduler};
