//! Transient view state. Never persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bus::{EventBus, Subscription};

/// Open/closed state of the sidebar. Starts closed.
#[derive(Debug, Clone, Default)]
pub struct SidebarState {
    open: Arc<AtomicBool>,
    changes: EventBus<bool>,
}

impl SidebarState {
    /// Creates a closed sidebar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sidebar is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Opens the sidebar.
    pub fn open(&self) {
        self.set(true);
    }

    /// Closes the sidebar.
    pub fn close(&self) {
        self.set(false);
    }

    /// Flips the sidebar and returns the new state.
    pub fn toggle(&self) -> bool {
        let open = !self.open.fetch_xor(true, Ordering::SeqCst);
        self.changes.emit(&open);
        open
    }

    /// Calls `callback` with the new state on every change.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.changes.subscribe(callback)
    }

    fn set(&self, open: bool) {
        if self.open.swap(open, Ordering::SeqCst) != open {
            self.changes.emit(&open);
        }
    }
}
