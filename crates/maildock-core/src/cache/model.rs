//! Cache entry state.

use crate::error::FetchError;

/// Load status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// No data has been loaded yet.
    #[default]
    Pending,
    /// The last accepted fetch succeeded.
    Ready,
    /// The last accepted fetch failed.
    Errored,
}

/// Read-only view of one cache entry, handed to readers and observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState<V> {
    /// Load status.
    pub status: QueryStatus,
    /// Last good data. Kept across failed fetches.
    pub data: Option<V>,
    /// Error of the last accepted fetch, if it failed.
    pub error: Option<FetchError>,
    /// Set by invalidation, cleared by a successful fetch of the current epoch.
    pub is_stale: bool,
    /// Whether a fetch for this key is outstanding.
    pub is_fetching: bool,
    /// Current invalidation epoch of the key.
    pub epoch: u64,
    /// Bumped on every published change. Observers on other threads use it
    /// to drop notices that arrive out of order.
    pub revision: u64,
}

impl<V> Default for QueryState<V> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            is_stale: false,
            is_fetching: false,
            epoch: 0,
            revision: 0,
        }
    }
}

impl<V> QueryState<V> {
    /// First load in progress, nothing to show yet.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.status, QueryStatus::Pending) && self.is_fetching
    }

    /// The last accepted fetch failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.status, QueryStatus::Errored)
    }

    /// Data is loaded and current.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.status, QueryStatus::Ready)
    }
}
