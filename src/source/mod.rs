//! Source resolution and document load caching

pub mod cache;
pub mod resolver;

pub use cache::DocumentLoadCache;
pub use resolver::resolve;
