//! Cooperative cancellation and debouncing
//!
//! Long-running operations (page renders, search passes) receive a
//! [`CancellationToken`] and check it after every suspension point. A token
//! created with [`CancellationToken::child_token`] observes its parent's
//! cancellation as well as its own, so a render can be abandoned either
//! because a newer render superseded it or because its owner went away.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cancellation token for cooperative cancellation
///
/// Clones share the same cancellation state.
///
/// # Example
///
/// ```
/// use pdf_viewport::CancellationToken;
///
/// let mounted = CancellationToken::new();
/// let render = mounted.child_token();
///
/// mounted.cancel();
/// assert!(render.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled when either it or `self` is cancelled.
    /// Cancelling the child never affects the parent.
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancel this token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` if this token or any ancestor has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// `Err(Error::Cancelled)` once cancelled, for use with `?` at await boundaries
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Coalesces rapid triggers into a single delayed execution
///
/// Each [`schedule`](Debouncer::schedule) call replaces the pending task and
/// restarts the delay. A generation counter guards against a task that has
/// already woken up running after it was superseded.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` once the delay elapses without another `schedule` or `cancel`.
    ///
    /// Must be called from within a Tokio runtime. Returns the generation of
    /// the scheduled run.
    pub fn schedule<F, Fut>(&self, task: F) -> u64
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let counter = Arc::clone(&self.generation);
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if counter.load(Ordering::Acquire) == generation {
                task().await;
            }
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
        generation
    }

    /// Drop any pending run
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    /// Whether `generation` is still the most recent schedule
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Whether a scheduled run has not finished yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_ok!(token.check());

        token.cancel();
        assert!(token.is_cancelled());
        let err = assert_err!(token.check());
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_child_observes_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_coalesces() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            debouncer.schedule(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let generation = debouncer.schedule(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_current(generation));
        assert!(debouncer.is_pending());

        debouncer.cancel();
        assert!(!debouncer.is_current(generation));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
