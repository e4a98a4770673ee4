//! Debounced full-text search over a loaded document
//!
//! A query runs after a quiet period, scanning pages in order through the
//! [`PageTextCache`]. Results are published on a `watch` channel. A run that
//! has been superseded by a newer query, or cleared, publishes nothing.

mod matcher;
mod text_cache;

pub use matcher::{find_matches, TextMatch};
pub use text_cache::PageTextCache;

use crate::cancel::{CancellationToken, Debouncer};
use crate::pdf::DocumentHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// One occurrence of the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// 0-based page index
    pub page_index: u32,
    /// Position in the overall match sequence
    pub match_index: usize,
    /// Byte offset within the page text
    pub position: usize,
    /// Matched text in its original case
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchState {
    pub query: String,
    /// Sorted by page, then position
    pub matches: Vec<SearchMatch>,
    /// `-1` when there is no current match
    pub current_match_index: i32,
    pub is_searching: bool,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            query: String::new(),
            matches: Vec::new(),
            current_match_index: -1,
            is_searching: false,
        }
    }
}

impl SearchState {
    pub fn current_match(&self) -> Option<&SearchMatch> {
        usize::try_from(self.current_match_index)
            .ok()
            .and_then(|index| self.matches.get(index))
    }
}

struct SearchInner {
    document: Arc<dyn DocumentHandle>,
    cache: Arc<PageTextCache>,
    state: watch::Sender<SearchState>,
    generation: AtomicU64,
    abort: Mutex<CancellationToken>,
    debouncer: Debouncer,
}

impl SearchInner {
    /// Retire the current run and hand out a token for the next one
    fn next_run(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.abort.lock(), token.clone());
        previous.cancel();
        (generation, token)
    }

    async fn run(&self, query: String, generation: u64, token: CancellationToken) {
        let page_count = self.document.page_count();
        debug!(query = %query, page_count, "search started");

        let mut matches = Vec::new();
        for page_number in 1..=page_count {
            if token.is_cancelled() {
                debug!(query = %query, "search aborted");
                return;
            }

            let text = self
                .cache
                .get_or_extract(self.document.as_ref(), page_number)
                .await;
            if token.is_cancelled() {
                debug!(query = %query, "search aborted");
                return;
            }

            match text {
                Ok(text) => {
                    for found in find_matches(&text, &query) {
                        matches.push(SearchMatch {
                            page_index: page_number - 1,
                            match_index: matches.len(),
                            position: found.position,
                            text: found.text.to_string(),
                        });
                    }
                }
                Err(e) => warn!(page = page_number, error = %e, "search skipped unreadable page"),
            }
        }

        let match_count = matches.len();
        let published = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::Acquire) != generation || token.is_cancelled() {
                return false;
            }
            state.current_match_index = if matches.is_empty() { -1 } else { 0 };
            state.matches = matches;
            state.is_searching = false;
            true
        });
        if published {
            debug!(query = %query, matches = match_count, "search finished");
        }
    }
}

/// Wait on `receiver` until no search is pending or running
pub async fn wait_until_idle(mut receiver: watch::Receiver<SearchState>) -> SearchState {
    let idle = receiver
        .wait_for(|state| !state.is_searching)
        .await
        .map(|state| state.clone());
    let state = match idle {
        Ok(state) => state,
        // Engine dropped: report whatever was last published
        Err(_) => receiver.borrow().clone(),
    };
    state
}

/// Full-text search for one document
pub struct SearchEngine {
    inner: Arc<SearchInner>,
}

impl SearchEngine {
    pub fn new(
        document: Arc<dyn DocumentHandle>,
        cache: Arc<PageTextCache>,
        debounce: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            inner: Arc::new(SearchInner {
                document,
                cache,
                state,
                generation: AtomicU64::new(0),
                abort: Mutex::new(CancellationToken::new()),
                debouncer: Debouncer::new(debounce),
            }),
        }
    }

    /// Start (or restart) a debounced search.
    ///
    /// A whitespace-only query clears the search instead. Must be called from
    /// within a Tokio runtime.
    pub fn search(&self, query: &str) {
        if query.trim().is_empty() {
            self.clear_search();
            return;
        }

        let (generation, token) = self.inner.next_run();
        self.inner.state.send_modify(|state| {
            state.query = query.to_string();
            state.is_searching = true;
        });

        let weak: Weak<SearchInner> = Arc::downgrade(&self.inner);
        let query = query.to_string();
        self.inner.debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.run(query, generation, token).await;
            }
        });
    }

    /// Move to the next match, wrapping around
    pub fn next_match(&self) {
        self.step(1);
    }

    /// Move to the previous match, wrapping around
    pub fn previous_match(&self) {
        self.step(-1);
    }

    fn step(&self, delta: i32) {
        self.inner.state.send_if_modified(|state| {
            let count = state.matches.len() as i32;
            if count == 0 {
                return false;
            }
            state.current_match_index = (state.current_match_index + delta).rem_euclid(count);
            true
        });
    }

    /// Abort pending and running work and reset to the empty state
    pub fn clear_search(&self) {
        self.inner.next_run();
        self.inner.debouncer.cancel();
        self.inner.state.send_replace(SearchState::default());
    }

    pub fn state(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn current_match(&self) -> Option<SearchMatch> {
        self.inner.state.borrow().current_match().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    /// Wait until no search is pending or running, then return the state
    pub async fn wait_idle(&self) -> SearchState {
        let receiver = self.inner.state.subscribe();
        wait_until_idle(receiver).await
    }
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        self.inner.next_run();
        self.inner.debouncer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::memory::{MemoryDocument, MemoryDocumentSource, MemoryPage};
    use crate::pdf::DocumentSource;
    use pretty_assertions::assert_eq;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    async fn engine_for(document: MemoryDocument) -> (SearchEngine, Arc<MemoryDocumentSource>) {
        let source = Arc::new(MemoryDocumentSource::new());
        source.insert("mem://doc.pdf", document);
        let handle = source.load_document("mem://doc.pdf").await.unwrap();
        let engine = SearchEngine::new(handle, Arc::new(PageTextCache::new()), DEBOUNCE);
        (engine, source)
    }

    fn greek_pages() -> MemoryDocument {
        MemoryDocument::with_page_texts(&["alpha beta", "beta gamma", "gamma alpha"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_finds_matches_in_page_order() {
        let (engine, _source) = engine_for(greek_pages()).await;

        engine.search("alpha");
        assert!(engine.state().is_searching);
        let state = engine.wait_idle().await;

        assert_eq!(state.query, "alpha");
        assert_eq!(
            state.matches,
            vec![
                SearchMatch {
                    page_index: 0,
                    match_index: 0,
                    position: 0,
                    text: "alpha".to_string(),
                },
                SearchMatch {
                    page_index: 2,
                    match_index: 1,
                    position: 6,
                    text: "alpha".to_string(),
                },
            ]
        );
        assert_eq!(state.current_match_index, 0);
        assert!(!state.is_searching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_is_case_insensitive() {
        let (engine, _source) = engine_for(MemoryDocument::with_page_texts(&["Alpha BETA"])).await;

        engine.search("beta");
        let state = engine.wait_idle().await;

        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.matches[0].text, "BETA");
        assert_eq!(state.matches[0].position, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_queries_run_once() {
        let (engine, source) = engine_for(greek_pages()).await;
        let mut updates = engine.subscribe();

        for query in ["g", "ga", "gam", "gamma"] {
            engine.search(query);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(source.text_reads(), 0);

        let state = engine.wait_idle().await;
        assert_eq!(state.query, "gamma");
        assert_eq!(state.matches.len(), 2);
        assert_eq!(source.text_reads(), 3);

        // Only the final run published results
        updates.borrow_and_update();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_is_cached_between_searches() {
        let (engine, source) = engine_for(greek_pages()).await;

        engine.search("alpha");
        engine.wait_idle().await;
        engine.search("beta");
        let state = engine.wait_idle().await;

        assert_eq!(state.matches.len(), 2);
        assert_eq!(source.text_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_query_gives_identical_matches() {
        let (engine, source) = engine_for(greek_pages()).await;

        engine.search("beta");
        let first = engine.wait_idle().await;
        engine.search("beta");
        let second = engine.wait_idle().await;

        assert_eq!(first.matches.len(), 2);
        assert_eq!(first.matches, second.matches);
        assert_eq!(source.text_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_survives_engine_drop() {
        let (engine, _source) = engine_for(greek_pages()).await;
        let receiver = engine.subscribe();

        engine.search("alpha");
        drop(engine);

        let state = wait_until_idle(receiver).await;
        assert_eq!(state.query, "alpha");
        assert!(state.matches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_matches() {
        let (engine, _source) = engine_for(greek_pages()).await;

        engine.search("delta");
        let state = engine.wait_idle().await;

        assert!(state.matches.is_empty());
        assert_eq!(state.current_match_index, -1);
        assert_eq!(engine.current_match(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_query_clears_immediately() {
        let (engine, source) = engine_for(greek_pages()).await;
        engine.search("alpha");
        engine.wait_idle().await;

        engine.search("   ");
        assert_eq!(engine.state(), SearchState::default());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.state(), SearchState::default());
        assert_eq!(source.text_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_and_previous_cycle() {
        let (engine, _source) = engine_for(greek_pages()).await;
        engine.search("a");
        let state = engine.wait_idle().await;
        let count = state.matches.len() as i32;
        assert!(count > 2);

        engine.previous_match();
        assert_eq!(engine.state().current_match_index, count - 1);
        engine.next_match();
        assert_eq!(engine.state().current_match_index, 0);
        engine.next_match();
        assert_eq!(engine.current_match().unwrap().match_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_without_matches_is_noop() {
        let (engine, _source) = engine_for(greek_pages()).await;
        engine.next_match();
        engine.previous_match();
        assert_eq!(engine.state().current_match_index, -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_search() {
        let (engine, source) = engine_for(greek_pages()).await;

        engine.search("alpha");
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.clear_search();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(engine.state(), SearchState::default());
        assert_eq!(source.text_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_page_contributes_nothing() {
        let document = MemoryDocument::new(vec![
            MemoryPage::default().with_text("alpha"),
            MemoryPage::default().with_text("alpha").failing_text(),
            MemoryPage::default().with_text("alpha"),
        ]);
        let (engine, _source) = engine_for(document).await;

        engine.search("alpha");
        let state = engine.wait_idle().await;

        let pages: Vec<u32> = state.matches.iter().map(|m| m.page_index).collect();
        assert_eq!(pages, vec![0, 2]);
    }
}
