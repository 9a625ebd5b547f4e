//! An explicit, non-singleton subscription registry for human-readable
//! progress/log lines.
//!
//! Every top-level operation takes (or is handed) a registry value rather
//! than reaching for process-wide global state, so a caller embedding
//! multiple directories gets independent, composable event streams.
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// An opaque handle returned by [`ObserverRegistry::subscribe`], used to
/// unsubscribe later.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ObserverToken(u64);

/// A registry of subscribed callbacks. Cloning shares the same underlying
/// subscriber list (it is cheap, `Arc`-backed), matching the way a single
/// registry is threaded through a directory's import/pack/delta/patch
/// calls.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry").field("subscriber_count", &self.subscriber_count()).finish()
    }
}

#[derive(Default)]
struct Inner {
    next_token: u64,
    subscribers: Vec<(ObserverToken, Callback)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback; returns a token that can later be passed to
    /// [`ObserverRegistry::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> ObserverToken
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let token = ObserverToken(inner.next_token);
        inner.next_token += 1;
        inner.subscribers.push((token, Arc::new(callback)));
        token
    }

    pub fn unsubscribe(&self, token: ObserverToken) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|(t, _)| *t != token);
    }

    /// Emit a message to every current subscriber. A callback that panics
    /// is caught and dropped silently rather than unwinding into the core
    /// — observers never throw back into the core.
    pub fn notify(&self, message: &str) {
        let subscribers = self.inner.lock().subscribers.clone();
        for (_, callback) in subscribers {
            let _ = catch_unwind(AssertUnwindSafe(|| callback(message)));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notifies_all_subscribers() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        registry.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        registry.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        registry.notify("hello");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let token = registry.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        registry.unsubscribe(token);
        registry.notify("hello");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_callback_does_not_propagate() {
        let registry = ObserverRegistry::new();
        registry.subscribe(|_| panic!("boom"));
        registry.notify("hello");
    }
}
