//! Keyed, invalidatable query cache.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::model::{QueryState, QueryStatus};
use crate::bus::{EventBus, Subscription};
use crate::error::FetchError;

/// Future returned by a cache fetch function.
pub type FetchFuture<V> = Pin<Box<dyn Future<Output = Result<V, FetchError>> + Send>>;

type FetchFn<K, V> = Arc<dyn Fn(K) -> FetchFuture<V> + Send + Sync>;
type ReconcileFn<K, V> = Arc<dyn Fn(&K, &mut V) + Send + Sync>;

struct Entry<V> {
    state: QueryState<V>,
    /// Epoch the outstanding fetch was started with.
    in_flight: Option<u64>,
    /// An invalidation arrived while a fetch was outstanding.
    follow_up: bool,
    changes: EventBus<QueryState<V>>,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            state: QueryState::default(),
            in_flight: None,
            follow_up: false,
            changes: EventBus::default(),
        }
    }
}

/// A fetch to spawn once the lock is released.
struct Ticket<K> {
    key: K,
    epoch: u64,
}

/// Observers to call once the lock is released.
type Notice<V> = (EventBus<QueryState<V>>, QueryState<V>);

/// Keyed cache of server data with epoch-tagged background refetching.
///
/// At most one fetch per key is outstanding. Invalidating a key while its
/// fetch is in flight queues exactly one follow-up fetch; the in-flight
/// result is then discarded because its epoch is behind.
pub struct QueryCache<K, V> {
    name: &'static str,
    entries: Arc<Mutex<HashMap<K, Entry<V>>>>,
    fetch: FetchFn<K, V>,
    reconcile: Option<ReconcileFn<K, V>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
            fetch: Arc::clone(&self.fetch),
            reconcile: self.reconcile.clone(),
        }
    }
}

impl<K, V> fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache").field("name", &self.name).finish()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache that loads entries with `fetch`.
    ///
    /// `name` only appears in log output.
    pub fn new<F>(name: &'static str, fetch: F) -> Self
    where
        F: Fn(K) -> FetchFuture<V> + Send + Sync + 'static,
    {
        Self {
            name,
            entries: Arc::new(Mutex::new(HashMap::new())),
            fetch: Arc::new(fetch),
            reconcile: None,
        }
    }

    /// Installs a hook run on every accepted fetch result before it is stored.
    #[must_use]
    pub fn with_reconcile<R>(mut self, reconcile: R) -> Self
    where
        R: Fn(&K, &mut V) + Send + Sync + 'static,
    {
        self.reconcile = Some(Arc::new(reconcile));
        self
    }

    /// Current state of `key`. Unknown keys read as an empty pending entry.
    #[must_use]
    pub fn get(&self, key: &K) -> QueryState<V> {
        self.lock()
            .get(key)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    /// Cached data of `key`, if any.
    #[must_use]
    pub fn data(&self, key: &K) -> Option<V> {
        self.lock().get(key).and_then(|entry| entry.state.data.clone())
    }

    /// Starts a fetch for `key` unless one is outstanding or the data is current.
    ///
    /// This is what a view calls when it starts displaying a key.
    pub fn ensure(&self, key: &K) -> QueryState<V> {
        let (ticket, notice, state) = {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            let wanted = entry.state.data.is_none() || entry.state.is_stale;
            // An outstanding fetch from before a removal will be discarded.
            if wanted && entry.in_flight.is_some_and(|epoch| epoch < entry.state.epoch) {
                entry.follow_up = true;
            }
            let needs_fetch = entry.in_flight.is_none() && wanted;
            let ticket = needs_fetch.then(|| Self::begin_fetch(key.clone(), entry));
            let notice = ticket.is_some().then(|| Self::notice(entry));
            (ticket, notice, entry.state.clone())
        };
        self.dispatch(ticket, notice);
        state
    }

    /// Marks `key` stale and refetches it in the background.
    ///
    /// Keys nobody has loaded or subscribed to are left alone.
    pub fn invalidate(&self, key: &K) {
        let (ticket, notice) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                debug!(cache = self.name, ?key, "invalidate on unknown key ignored");
                return;
            };
            entry.state.epoch += 1;
            entry.state.is_stale = true;
            let ticket = if entry.in_flight.is_some() {
                entry.follow_up = true;
                None
            } else {
                Some(Self::begin_fetch(key.clone(), entry))
            };
            (ticket, Some(Self::notice(entry)))
        };
        self.dispatch(ticket, notice);
    }

    /// Refetches every stale key that has no fetch outstanding.
    ///
    /// Used after a failed fetch to retry without waiting for the next push.
    pub fn refetch_all_stale(&self) -> usize {
        let batch: Vec<(Ticket<K>, Notice<V>)> = {
            let mut entries = self.lock();
            entries
                .iter_mut()
                .filter(|(_, entry)| entry.state.is_stale && entry.in_flight.is_none())
                .map(|(key, entry)| {
                    let ticket = Self::begin_fetch(key.clone(), entry);
                    (ticket, Self::notice(entry))
                })
                .collect()
        };
        let started = batch.len();
        for (ticket, notice) in batch {
            self.dispatch(Some(ticket), Some(notice));
        }
        started
    }

    /// Applies `update` to the cached data of `key` without a round-trip.
    ///
    /// Returns `false` when the key has no data to update.
    pub fn set_local<F>(&self, key: &K, update: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let notice = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            let Some(data) = entry.state.data.as_mut() else {
                return false;
            };
            update(data);
            Self::notice(entry)
        };
        self.dispatch(None, Some(notice));
        true
    }

    /// Drops the data of `key`. An outstanding fetch for it is discarded.
    pub fn remove(&self, key: &K) {
        let notice = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            let epoch = entry.state.epoch + 1;
            entry.state = QueryState {
                epoch,
                revision: entry.state.revision,
                is_fetching: entry.in_flight.is_some(),
                ..QueryState::default()
            };
            entry.follow_up = false;
            Self::notice(entry)
        };
        self.dispatch(None, Some(notice));
    }

    /// Calls `callback` with the new state on every transition of `key`.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe<F>(&self, key: &K, callback: F) -> Subscription
    where
        F: Fn(&QueryState<V>) + Send + Sync + 'static,
    {
        let bus = self
            .lock()
            .entry(key.clone())
            .or_default()
            .changes
            .clone();
        bus.subscribe(callback)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_fetch(key: K, entry: &mut Entry<V>) -> Ticket<K> {
        let epoch = entry.state.epoch;
        entry.in_flight = Some(epoch);
        entry.follow_up = false;
        entry.state.is_fetching = true;
        Ticket { key, epoch }
    }

    fn notice(entry: &mut Entry<V>) -> Notice<V> {
        entry.state.revision += 1;
        (entry.changes.clone(), entry.state.clone())
    }

    fn dispatch(&self, ticket: Option<Ticket<K>>, notice: Option<Notice<V>>) {
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
        if let Some((changes, state)) = notice {
            changes.emit(&state);
        }
    }

    fn spawn_fetch(&self, ticket: Ticket<K>) {
        let Ticket { key, epoch } = ticket;
        debug!(cache = self.name, ?key, epoch, "fetch started");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(cache = self.name, ?key, "no async runtime, fetch not started");
            self.complete(
                key,
                epoch,
                Err(FetchError::Network("no async runtime".to_string())),
            );
            return;
        };

        let future = (self.fetch)(key.clone());
        let cache = self.clone();
        runtime.spawn(async move {
            let result = future.await;
            cache.complete(key, epoch, result);
        });
    }

    fn complete(&self, key: K, epoch: u64, result: Result<V, FetchError>) {
        let (ticket, notice) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.in_flight != Some(epoch) {
                return;
            }
            entry.in_flight = None;

            if epoch < entry.state.epoch {
                debug!(
                    cache = self.name,
                    ?key,
                    epoch,
                    current = entry.state.epoch,
                    "discarding result of a superseded fetch"
                );
            } else {
                match result {
                    Ok(mut data) => {
                        if let Some(reconcile) = &self.reconcile {
                            reconcile(&key, &mut data);
                        }
                        entry.state.data = Some(data);
                        entry.state.status = QueryStatus::Ready;
                        entry.state.error = None;
                        entry.state.is_stale = false;
                    }
                    Err(err) => {
                        warn!(cache = self.name, ?key, error = %err, "fetch failed");
                        entry.state.status = QueryStatus::Errored;
                        entry.state.error = Some(err);
                    }
                }
            }

            let ticket = if entry.follow_up {
                Some(Self::begin_fetch(key, entry))
            } else {
                entry.state.is_fetching = false;
                None
            };
            (ticket, Some(Self::notice(entry)))
        };
        self.dispatch(ticket, notice);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::oneshot;

    type Pending = Arc<Mutex<Vec<(u64, oneshot::Sender<Result<u64, FetchError>>)>>>;

    /// A cache whose fetches wait until the test resolves them.
    ///
    /// Each fetch records the server version current when it started.
    fn gated() -> (QueryCache<&'static str, u64>, Pending, Arc<AtomicU64>) {
        let pending: Pending = Arc::new(Mutex::new(Vec::new()));
        let version = Arc::new(AtomicU64::new(0));
        let cache = {
            let pending = Arc::clone(&pending);
            let version = Arc::clone(&version);
            QueryCache::new("test", move |_key| {
                let (tx, rx) = oneshot::channel();
                pending
                    .lock()
                    .unwrap()
                    .push((version.load(Ordering::SeqCst), tx));
                Box::pin(async move {
                    rx.await
                        .unwrap_or_else(|_| Err(FetchError::Network("dropped".into())))
                })
            })
        };
        (cache, pending, version)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn resolve(pending: &Pending, index: usize, result: Option<Result<u64, FetchError>>) {
        let (captured, tx) = pending.lock().unwrap().remove(index);
        let _ = tx.send(result.unwrap_or(Ok(captured)));
    }

    #[tokio::test]
    async fn test_ensure_loads_once() {
        let (cache, pending, _) = gated();
        let state = cache.ensure(&"mails");
        assert!(state.is_loading());
        cache.ensure(&"mails");
        assert_eq!(pending.lock().unwrap().len(), 1);

        resolve(&pending, 0, None);
        settle().await;

        let state = cache.get(&"mails");
        assert_eq!(state.status, QueryStatus::Ready);
        assert_eq!(state.data, Some(0));
        assert!(!state.is_fetching);

        cache.ensure(&"mails");
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_queues_one_follow_up() {
        let (cache, pending, version) = gated();
        cache.ensure(&"mails");

        for _ in 0..3 {
            version.fetch_add(1, Ordering::SeqCst);
            cache.invalidate(&"mails");
        }
        assert_eq!(pending.lock().unwrap().len(), 1);

        // The first fetch is behind the current epoch: discarded.
        resolve(&pending, 0, None);
        settle().await;
        let state = cache.get(&"mails");
        assert_eq!(state.data, None);
        assert!(state.is_stale);
        assert_eq!(pending.lock().unwrap().len(), 1);

        resolve(&pending, 0, None);
        settle().await;
        let state = cache.get(&"mails");
        assert_eq!(state.data, Some(3));
        assert!(!state.is_stale);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_good_data() {
        let (cache, pending, _) = gated();
        cache.ensure(&"mails");
        resolve(&pending, 0, Some(Ok(10)));
        settle().await;

        cache.invalidate(&"mails");
        resolve(&pending, 0, Some(Err(FetchError::Status(500))));
        settle().await;

        let state = cache.get(&"mails");
        assert_eq!(state.status, QueryStatus::Errored);
        assert_eq!(state.data, Some(10));
        assert_eq!(state.error, Some(FetchError::Status(500)));
        assert!(state.is_stale);

        cache.invalidate(&"mails");
        resolve(&pending, 0, Some(Ok(11)));
        settle().await;
        let state = cache.get(&"mails");
        assert_eq!(state.status, QueryStatus::Ready);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_has_no_data() {
        let (cache, pending, _) = gated();
        cache.ensure(&"mails");
        resolve(&pending, 0, Some(Err(FetchError::Network("down".into()))));
        settle().await;

        let state = cache.get(&"mails");
        assert!(state.is_error());
        assert_eq!(state.data, None);
    }

    #[tokio::test]
    async fn test_set_local_notifies_without_fetching() {
        let (cache, pending, _) = gated();
        cache.ensure(&"mails");
        resolve(&pending, 0, Some(Ok(1)));
        settle().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = Arc::clone(&seen);
            cache.subscribe(&"mails", move |state| {
                seen.lock().unwrap().push(state.data);
            })
        };

        assert!(cache.set_local(&"mails", |n| *n += 41));
        assert!(!cache.set_local(&"other", |n| *n += 1));
        assert_eq!(cache.data(&"mails"), Some(42));
        assert_eq!(*seen.lock().unwrap(), vec![Some(42)]);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_runs_on_accepted_results() {
        let (cache, pending, _) = gated();
        let cache = cache.with_reconcile(|_, n| *n *= 2);
        cache.ensure(&"mails");
        resolve(&pending, 0, Some(Ok(21)));
        settle().await;
        assert_eq!(cache.data(&"mails"), Some(42));
    }

    #[tokio::test]
    async fn test_remove_discards_in_flight_result() {
        let (cache, pending, _) = gated();
        cache.ensure(&"mails");
        cache.remove(&"mails");
        resolve(&pending, 0, Some(Ok(5)));
        settle().await;

        let state = cache.get(&"mails");
        assert_eq!(state.data, None);
        assert!(!state.is_fetching);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_after_remove_refetches_once_discarded() {
        let (cache, pending, version) = gated();
        cache.ensure(&"mails");
        cache.remove(&"mails");
        version.store(7, Ordering::SeqCst);
        let state = cache.ensure(&"mails");
        assert!(state.is_fetching);
        assert_eq!(pending.lock().unwrap().len(), 1);

        resolve(&pending, 0, None);
        settle().await;
        assert_eq!(cache.get(&"mails").data, None);
        assert_eq!(pending.lock().unwrap().len(), 1);

        resolve(&pending, 0, None);
        settle().await;
        let state = cache.get(&"mails");
        assert_eq!(state.status, QueryStatus::Ready);
        assert_eq!(state.data, Some(7));
        assert!(!state.is_fetching);
    }

    #[tokio::test]
    async fn test_refetch_all_stale_retries_failed_keys() {
        let (cache, pending, _) = gated();
        cache.ensure(&"mails");
        resolve(&pending, 0, Some(Ok(1)));
        settle().await;
        cache.invalidate(&"mails");
        resolve(&pending, 0, Some(Err(FetchError::Status(503))));
        settle().await;

        assert_eq!(cache.refetch_all_stale(), 1);
        assert_eq!(cache.refetch_all_stale(), 0);
        resolve(&pending, 0, Some(Ok(2)));
        settle().await;
        assert!(cache.get(&"mails").is_ready());
        assert_eq!(cache.refetch_all_stale(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_key_is_ignored() {
        let (cache, pending, _) = gated();
        cache.invalidate(&"mails");
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_without_runtime_errors() {
        let (cache, _pending, _) = gated();
        let state = cache.ensure(&"mails");
        assert!(state.is_fetching);
        let state = cache.get(&"mails");
        assert!(state.is_error());
        assert!(!state.is_fetching);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Invalidate,
            Resolve,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![Just(Step::Invalidate), Just(Step::Resolve)]
        }

        proptest! {
            #[test]
            fn staleness_clears_only_for_current_epoch(steps in proptest::collection::vec(step(), 0..40)) {
                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                runtime.block_on(async {
                    let (cache, pending, version) = gated();
                    cache.ensure(&"mails");

                    for step in steps {
                        match step {
                            Step::Invalidate => {
                                version.fetch_add(1, Ordering::SeqCst);
                                cache.invalidate(&"mails");
                            }
                            Step::Resolve => {
                                if !pending.lock().unwrap().is_empty() {
                                    resolve(&pending, 0, None);
                                }
                            }
                        }
                        settle().await;

                        assert!(pending.lock().unwrap().len() <= 1);
                        let state = cache.get(&"mails");
                        if !state.is_stale && state.data.is_some() {
                            assert_eq!(state.data, Some(version.load(Ordering::SeqCst)));
                        }
                    }

                    while !pending.lock().unwrap().is_empty() {
                        resolve(&pending, 0, None);
                        settle().await;
                    }
                    let state = cache.get(&"mails");
                    assert!(!state.is_stale);
                    assert_eq!(state.data, Some(version.load(Ordering::SeqCst)));
                });
            }
        }
    }
}
