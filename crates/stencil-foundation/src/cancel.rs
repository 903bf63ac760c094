//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a one-shot flag created per template run. It is
//! never reset. Running blocks are not interrupted; the executor polls the
//! token at phase boundaries and host calls poll it at entry or while they
//! wait.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn FnOnce(Option<&str>) + Send>;

struct State {
    reason: Option<String>,
    callbacks: Vec<(u64, Callback)>,
    next_callback: u64,
    /// Callbacks this token registered on its sources via [`CancellationToken::link`].
    links: Vec<Registration>,
}

/// Removes a callback from its source token when dropped.
struct Registration {
    source: Weak<Inner>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.state.lock().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

struct Inner {
    cancelled: AtomicBool,
    state: Mutex<State>,
    notify: tokio_util::sync::CancellationToken,
}

/// Shared one-shot cancellation flag with an optional reason.
///
/// Clones observe the same flag.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                state: Mutex::new(State {
                    reason: None,
                    callbacks: Vec::new(),
                    next_callback: 0,
                    links: Vec::new(),
                }),
                notify: tokio_util::sync::CancellationToken::new(),
            }),
        }
    }

    /// Cancel without a reason. Returns `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        self.cancel_inner(None)
    }

    /// Cancel with a reason. Returns `false` if already cancelled, in which
    /// case the first reason is kept.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) -> bool {
        self.cancel_inner(Some(reason.into()))
    }

    fn cancel_inner(&self, reason: Option<String>) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            state.reason = reason;
            std::mem::take(&mut state.callbacks)
        };

        tracing::debug!(reason = ?self.reason(), "cancellation requested");
        self.inner.notify.cancel();

        // Fired outside the lock so callbacks may touch this token.
        let reason = self.reason();
        for (_, callback) in callbacks {
            callback(reason.as_deref());
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The reason given at cancellation, if any.
    pub fn reason(&self) -> Option<String> {
        self.inner.state.lock().reason.clone()
    }

    /// Register a callback fired exactly once at cancellation.
    ///
    /// Runs immediately on the calling thread if the token is already
    /// cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(Option<&str>) + Send + 'static,
    {
        self.push_callback(callback);
    }

    /// Store `callback`, or run it now if already cancelled. Returns the id of
    /// a stored callback.
    fn push_callback<F>(&self, callback: F) -> Option<u64>
    where
        F: FnOnce(Option<&str>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if self.is_cancelled() {
            let reason = state.reason.clone();
            drop(state);
            callback(reason.as_deref());
            return None;
        }
        let id = state.next_callback;
        state.next_callback += 1;
        state.callbacks.push((id, Box::new(callback)));
        Some(id)
    }

    /// A token cancelled when either `a` or `b` is cancelled, carrying the
    /// source's reason.
    ///
    /// Sources hold only a weak handle to the linked token, and dropping the
    /// linked token removes its callbacks from them. A long-lived run token
    /// linked once per block does not accumulate callbacks.
    pub fn link(a: &CancellationToken, b: &CancellationToken) -> CancellationToken {
        let linked = CancellationToken::new();
        for source in [a, b] {
            let target = Arc::downgrade(&linked.inner);
            let id = source.push_callback(move |reason| {
                if let Some(inner) = target.upgrade() {
                    CancellationToken { inner }.cancel_inner(reason.map(str::to_string));
                }
            });
            if let Some(id) = id {
                linked.inner.state.lock().links.push(Registration {
                    source: Arc::downgrade(&source.inner),
                    id,
                });
            }
        }
        linked
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.notify.cancelled().await
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_is_one_shot() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel_with_reason("user"));
        assert!(!token.cancel_with_reason("again"));
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("user"));
    }

    #[test]
    fn callbacks_fire_exactly_once() {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        token.on_cancel(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel_with_reason("timeout");

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        token.on_cancel(move |reason| *slot.lock() = reason.map(str::to_string));
        assert_eq!(seen.lock().as_deref(), Some("timeout"));
    }

    #[test]
    fn linked_token_follows_either_source() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let linked = CancellationToken::link(&a, &b);
        assert!(!linked.is_cancelled());

        b.cancel_with_reason("timeout");
        assert!(linked.is_cancelled());
        assert_eq!(linked.reason().as_deref(), Some("timeout"));
        assert!(!a.is_cancelled());

        a.cancel();
        assert_eq!(linked.reason().as_deref(), Some("timeout"));
    }

    #[test]
    fn linking_a_cancelled_source_cancels_immediately() {
        let a = CancellationToken::new();
        a.cancel();
        let linked = CancellationToken::link(&a, &CancellationToken::new());
        assert!(linked.is_cancelled());
    }

    #[test]
    fn dropping_linked_token_unregisters_from_sources() {
        let run = CancellationToken::new();
        for _ in 0..100 {
            let block = CancellationToken::new();
            let linked = CancellationToken::link(&run, &block);
            assert_eq!(run.inner.state.lock().callbacks.len(), 1);
            drop(linked);
        }
        assert!(run.inner.state.lock().callbacks.is_empty());

        let kept = CancellationToken::link(&run, &CancellationToken::new());
        run.cancel_with_reason("user");
        assert_eq!(kept.reason().as_deref(), Some("user"));
    }

    #[test]
    fn linked_token_does_not_keep_itself_alive() {
        let run = CancellationToken::new();
        let linked = CancellationToken::link(&run, &CancellationToken::new());
        let weak = Arc::downgrade(&linked.inner);
        drop(linked);
        assert!(weak.upgrade().is_none());
        // Cancelling after the linked token is gone is a no-op.
        assert!(run.cancel());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
    }
}
