//! Document load cache
//!
//! Deduplicates document loads by URL: a URL that is already loaded resolves
//! to the same handle instead of being fetched and parsed again. Sessions
//! [`acquire`](DocumentLoadCache::acquire) a handle and
//! [`release`](DocumentLoadCache::release) it when they close; the handle is
//! destroyed when its last holder lets go.

use crate::error::Result;
use crate::pdf::{DocumentHandle, DocumentSource};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct CachedDocument {
    handle: Arc<dyn DocumentHandle>,
    /// Sessions currently viewing the document
    holders: usize,
}

/// URL to loaded-document cache with an entry limit
///
/// The limit only pushes out documents nobody holds.
pub struct DocumentLoadCache {
    inner: Mutex<LruCache<String, CachedDocument>>,
    capacity: NonZeroUsize,
}

impl DocumentLoadCache {
    /// Create a new cache keeping at most `capacity` unheld documents around
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::unbounded()),
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Get a loaded document by URL
    pub fn get(&self, url: &str) -> Option<Arc<dyn DocumentHandle>> {
        self.inner.lock().get(url).map(|entry| Arc::clone(&entry.handle))
    }

    /// Remove a document from the cache whether or not it is held.
    /// The handle is returned, not destroyed.
    pub fn evict(&self, url: &str) -> Option<Arc<dyn DocumentHandle>> {
        self.inner.lock().pop(url).map(|entry| entry.handle)
    }

    /// Return the cached handle for `url`, loading it through `source` on a
    /// miss. The caller does not become a holder.
    pub async fn get_or_load(
        &self,
        url: &str,
        source: &dyn DocumentSource,
    ) -> Result<Arc<dyn DocumentHandle>> {
        self.load(url, source, 0).await
    }

    /// Like [`get_or_load`](Self::get_or_load), and register the caller as a
    /// holder until it calls [`release`](Self::release)
    pub async fn acquire(
        &self,
        url: &str,
        source: &dyn DocumentSource,
    ) -> Result<Arc<dyn DocumentHandle>> {
        self.load(url, source, 1).await
    }

    async fn load(
        &self,
        url: &str,
        source: &dyn DocumentSource,
        holders: usize,
    ) -> Result<Arc<dyn DocumentHandle>> {
        if let Some(handle) = self.hold(url, holders) {
            tracing::debug!(url, "document load cache hit");
            return Ok(handle);
        }

        let handle = source.load_document(url).await?;

        let mut inner = self.inner.lock();
        // A concurrent load of the same URL may have finished first
        if let Some(entry) = inner.get_mut(url) {
            entry.holders += holders;
            let existing = Arc::clone(&entry.handle);
            drop(inner);
            handle.destroy();
            return Ok(existing);
        }
        inner.put(
            url.to_string(),
            CachedDocument {
                handle: Arc::clone(&handle),
                holders,
            },
        );
        self.trim(&mut inner);
        Ok(handle)
    }

    fn hold(&self, url: &str, holders: usize) -> Option<Arc<dyn DocumentHandle>> {
        let mut inner = self.inner.lock();
        let entry = inner.get_mut(url)?;
        entry.holders += holders;
        Some(Arc::clone(&entry.handle))
    }

    /// Push out least recently used documents nobody holds until the cache
    /// is back within capacity. Pushed-out handles are dropped, not destroyed.
    fn trim(&self, inner: &mut LruCache<String, CachedDocument>) {
        while inner.len() > self.capacity.get() {
            let idle = inner
                .iter()
                .rev()
                .find(|(_, entry)| entry.holders == 0)
                .map(|(url, _)| url.clone());
            match idle {
                Some(url) => {
                    inner.pop(&url);
                }
                None => break,
            }
        }
    }

    /// Drop one hold on `handle`. Destroys and evicts it when this was the
    /// last holder, or when the cache no longer tracks it. Returns whether
    /// the handle was destroyed.
    pub fn release(&self, handle: &Arc<dyn DocumentHandle>) -> bool {
        let url = handle.url();
        let mut inner = self.inner.lock();
        let remaining = match inner.peek_mut(url) {
            Some(entry) if Arc::ptr_eq(&entry.handle, handle) => {
                entry.holders = entry.holders.saturating_sub(1);
                Some(entry.holders)
            }
            _ => None,
        };

        match remaining {
            Some(0) => {
                inner.pop(url);
            }
            Some(remaining) => {
                tracing::debug!(url, remaining, "document still held");
                return false;
            }
            None => {}
        }
        drop(inner);
        handle.destroy();
        true
    }

    /// Number of sessions holding `url`
    pub fn holders(&self, url: &str) -> usize {
        self.inner.lock().peek(url).map_or(0, |entry| entry.holders)
    }

    /// Check if a URL is cached
    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().contains(url)
    }

    /// Get the number of cached documents
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
