#![forbid(unsafe_code)]

//! Cooperative cancellation tokens.
//!
//! A [`CancelToken`] is checked at the start of each stream pull and at the
//! moment a pull suspends; it never interrupts work already in flight.
//! Cloning a token shares the underlying state, so any clone can cancel.

use std::sync::{Arc, Mutex};

type Watcher = Box<dyn Fn() + Send>;

struct TokenState {
    cancelled: bool,
    watchers: Vec<Watcher>,
}

/// A shareable cancellation flag with wake-up callbacks.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Mutex<TokenState>>,
}

impl CancelToken {
    /// Create a fresh, unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TokenState {
                cancelled: false,
                watchers: Vec::new(),
            })),
        }
    }

    /// Signal cancellation. Idempotent; watchers run exactly once.
    pub fn cancel(&self) {
        let watchers = {
            let mut state = self.inner.lock().expect("cancel token poisoned");
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.watchers)
        };
        tracing::debug!(watchers = watchers.len(), "cancellation token fired");
        for watcher in &watchers {
            watcher();
        }
    }

    /// Check whether the token has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("cancel token poisoned").cancelled
    }

    /// Register a callback that runs when the token fires.
    ///
    /// If the token is already signalled the callback runs immediately on
    /// the caller's thread.
    pub(crate) fn watch(&self, watcher: Watcher) {
        let run_now = {
            let mut state = self.inner.lock().expect("cancel token poisoned");
            if state.cancelled {
                true
            } else {
                state.watchers.push(watcher);
                return;
            }
        };
        if run_now {
            watcher();
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
