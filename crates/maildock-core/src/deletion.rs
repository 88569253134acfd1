//! Deletion lifecycle.
//!
//! A confirmed delete walks its message through
//! `None -> Pending -> Animating -> Evicted`. Eviction filters the message out
//! of the locally rendered list after the dwell time, whether or not the list
//! has been refetched yet.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::{EventBus, Subscription};
use crate::cache::{ListCache, MAILS_KEY};
use crate::config::ClientConfig;
use crate::model::{Message, MessageId};

/// Event published by the mutation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionEvent {
    /// The server confirmed the deletion of a message.
    Confirmed(MessageId),
}

/// Lifecycle phase of one message's removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionPhase {
    /// Not being deleted.
    #[default]
    None,
    /// Marked for removal.
    Pending,
    /// Exit transition playing.
    Animating,
    /// Removed from the rendered list.
    Evicted,
}

/// A phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// Message concerned.
    pub id: MessageId,
    /// Phase entered.
    pub phase: DeletionPhase,
}

#[derive(Default)]
struct State {
    rendered: Vec<Message>,
    /// Pending or animating ids.
    active: HashMap<MessageId, DeletionPhase>,
    /// Evicted ids the server may still list.
    finished: HashSet<MessageId>,
    /// Evicted ids still present in the last snapshot.
    tombstones: HashSet<MessageId>,
    /// Revision of the last list snapshot applied.
    revision: u64,
    timers: HashMap<MessageId, JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    dwell: Duration,
    phases: EventBus<PhaseChange>,
    rendered: EventBus<Vec<Message>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, id: MessageId, phase: DeletionPhase) {
        debug!(%id, ?phase, "deletion phase");
        self.phases.emit(&PhaseChange { id, phase });
    }

    fn confirm(self: &Arc<Self>, id: MessageId) {
        {
            let mut state = self.lock();
            if state.finished.contains(&id) || state.active.contains_key(&id) {
                debug!(%id, "deletion already under way");
                return;
            }
            state.active.insert(id, DeletionPhase::Pending);
        }
        self.publish(id, DeletionPhase::Pending);

        self.lock().active.insert(id, DeletionPhase::Animating);
        self.publish(id, DeletionPhase::Animating);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%id, "no async runtime, evicting without dwell");
            self.evict(id);
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let deadline = Instant::now() + self.dwell;
        let timer = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict(id);
            }
        });
        let mut state = self.lock();
        if state.active.contains_key(&id) {
            state.timers.insert(id, timer);
        }
    }

    fn evict(&self, id: MessageId) {
        let rendered = {
            let mut state = self.lock();
            if state.active.remove(&id).is_none() {
                return;
            }
            state.timers.remove(&id);
            state.finished.insert(id);
            let before = state.rendered.len();
            state.rendered.retain(|m| m.id != id);
            if state.rendered.len() == before {
                None
            } else {
                state.tombstones.insert(id);
                Some(state.rendered.clone())
            }
        };
        self.publish(id, DeletionPhase::Evicted);
        if let Some(rendered) = rendered {
            self.rendered.emit(&rendered);
        }
    }

    fn snapshot(&self, revision: u64, list: Option<&Vec<Message>>) {
        let rendered = {
            let mut state = self.lock();
            if revision < state.revision {
                debug!(
                    revision,
                    latest = state.revision,
                    "ignoring out-of-order list snapshot"
                );
                return;
            }
            state.revision = revision;
            let list = list.map_or(&[][..], Vec::as_slice);
            let listed = |id: &MessageId| list.iter().any(|m| m.id == *id);
            state.tombstones.retain(listed);
            // Once the server no longer lists an evicted id it is forgotten.
            state.finished.retain(listed);
            let visible: Vec<Message> = list
                .iter()
                .filter(|m| !state.tombstones.contains(&m.id))
                .cloned()
                .collect();
            if visible == state.rendered {
                return;
            }
            state.rendered = visible;
            state.rendered.clone()
        };
        self.rendered.emit(&rendered);
    }
}

/// Sequences the removal of deleted messages from the rendered list.
///
/// Dropping the controller abandons all running timers.
pub struct DeletionController {
    inner: Arc<Inner>,
    _events: Subscription,
    _list: Subscription,
}

impl DeletionController {
    /// Starts listening to `events` and tracking the list in `list`.
    #[must_use]
    pub fn mount(
        events: &EventBus<DeletionEvent>,
        list: &ListCache,
        config: &ClientConfig,
    ) -> Self {
        let current = list.get(&MAILS_KEY);
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                rendered: current.data.unwrap_or_default(),
                revision: current.revision,
                ..State::default()
            }),
            dwell: config.eviction_dwell(),
            phases: EventBus::new(),
            rendered: EventBus::new(),
        });

        let weak = Arc::downgrade(&inner);
        let event_sub = events.subscribe(move |event| {
            let DeletionEvent::Confirmed(id) = *event;
            if let Some(inner) = weak.upgrade() {
                inner.confirm(id);
            }
        });

        let weak = Arc::downgrade(&inner);
        let list_sub = list.subscribe(&MAILS_KEY, move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.snapshot(state.revision, state.data.as_ref());
            }
        });

        Self {
            inner,
            _events: event_sub,
            _list: list_sub,
        }
    }

    /// The list as it should be rendered: the cached list minus evicted ids.
    #[must_use]
    pub fn rendered(&self) -> Vec<Message> {
        self.inner.lock().rendered.clone()
    }

    /// Current phase of `id`.
    #[must_use]
    pub fn phase(&self, id: MessageId) -> DeletionPhase {
        let state = self.inner.lock();
        if state.finished.contains(&id) {
            return DeletionPhase::Evicted;
        }
        state.active.get(&id).copied().unwrap_or_default()
    }

    /// Number of dwell timers still running.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Calls `callback` on every phase transition.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe_phases<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PhaseChange) + Send + Sync + 'static,
    {
        self.inner.phases.subscribe(callback)
    }

    /// Calls `callback` with the new rendered list on every change.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe_rendered<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Message>) + Send + Sync + 'static,
    {
        self.inner.rendered.subscribe(callback)
    }
}

impl Drop for DeletionController {
    fn drop(&mut self) {
        for (_, timer) in self.inner.lock().timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::error::FetchError;
    use tokio::time::advance;

    fn message(id: i64) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "from_address": "a@example.com",
            "to_address": "b@example.com",
            "is_read": false,
        }))
        .unwrap()
    }

    fn server() -> (ListCache, Arc<Mutex<Vec<Message>>>) {
        let mails = Arc::new(Mutex::new(vec![message(1), message(2), message(3)]));
        let source = Arc::clone(&mails);
        let cache = QueryCache::new("mails", move |_| {
            let snapshot = source.lock().unwrap().clone();
            Box::pin(async move { Ok::<_, FetchError>(snapshot) })
        });
        (cache, mails)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id.0).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_and_eviction_after_dwell() {
        let (list, _mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;

        let bus = EventBus::new();
        let controller = DeletionController::mount(&bus, &list, &ClientConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let log = Arc::clone(&log);
            let start = Instant::now();
            controller.subscribe_phases(move |change| {
                log.lock().unwrap().push((change.phase, start.elapsed().as_millis()));
            })
        };

        bus.emit(&DeletionEvent::Confirmed(MessageId(2)));
        assert_eq!(controller.phase(MessageId(2)), DeletionPhase::Animating);
        assert_eq!(ids(&controller.rendered()), vec![1, 2, 3]);

        advance(Duration::from_millis(299)).await;
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![1, 2, 3]);

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![1, 3]);
        assert_eq!(controller.phase(MessageId(2)), DeletionPhase::Evicted);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (DeletionPhase::Pending, 0),
                (DeletionPhase::Animating, 0),
                (DeletionPhase::Evicted, 300),
            ]
        );

        bus.emit(&DeletionEvent::Confirmed(MessageId(2)));
        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(controller.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tombstone_hides_evicted_until_server_agrees() {
        let (list, mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;
        let bus = EventBus::new();
        let controller = DeletionController::mount(&bus, &list, &ClientConfig::default());

        bus.emit(&DeletionEvent::Confirmed(MessageId(1)));
        advance(Duration::from_millis(300)).await;
        settle().await;

        // A refetch that still contains the evicted message does not bring it back.
        list.invalidate(&MAILS_KEY);
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![2, 3]);
        assert_eq!(controller.phase(MessageId(1)), DeletionPhase::Evicted);

        mails.lock().unwrap().retain(|m| m.id != MessageId(1));
        list.invalidate(&MAILS_KEY);
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![2, 3]);

        // Nothing is kept for an id the server has dropped.
        assert_eq!(controller.phase(MessageId(1)), DeletionPhase::None);
        let state = controller.inner.lock();
        assert!(state.finished.is_empty());
        assert!(state.tombstones.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_deletions_run_independent_timers() {
        let (list, _mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;
        let bus = EventBus::new();
        let controller = DeletionController::mount(&bus, &list, &ClientConfig::default());

        bus.emit(&DeletionEvent::Confirmed(MessageId(1)));
        advance(Duration::from_millis(100)).await;
        bus.emit(&DeletionEvent::Confirmed(MessageId(3)));
        assert_eq!(controller.pending_timers(), 2);

        advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![2, 3]);

        advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_abandons_timers() {
        let (list, _mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;
        let bus = EventBus::new();
        let controller = DeletionController::mount(&bus, &list, &ClientConfig::default());

        bus.emit(&DeletionEvent::Confirmed(MessageId(1)));
        drop(controller);
        assert_eq!(bus.listener_count(), 0);

        advance(Duration::from_millis(500)).await;
        settle().await;
        bus.emit(&DeletionEvent::Confirmed(MessageId(2)));
    }

    #[tokio::test]
    async fn test_late_list_snapshot_is_ignored() {
        let (list, _mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;
        let bus = EventBus::new();
        let controller = DeletionController::mount(&bus, &list, &ClientConfig::default());
        let revision = list.get(&MAILS_KEY).revision;

        // Notices built on another thread can be delivered in reverse order.
        let newer = vec![message(1)];
        let older = vec![message(1), message(2), message(3)];
        controller.inner.snapshot(revision + 2, Some(&newer));
        controller.inner.snapshot(revision + 1, Some(&older));
        assert_eq!(ids(&controller.rendered()), vec![1]);

        list.set_local(&MAILS_KEY, |mails| mails.truncate(2));
        assert_eq!(ids(&controller.rendered()), vec![1]);
        list.invalidate(&MAILS_KEY);
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_dwell() {
        let (list, _mails) = server();
        list.ensure(&MAILS_KEY);
        settle().await;
        let bus = EventBus::new();
        let config = ClientConfig {
            eviction_dwell_ms: 50,
            ..ClientConfig::default()
        };
        let controller = DeletionController::mount(&bus, &list, &config);

        bus.emit(&DeletionEvent::Confirmed(MessageId(3)));
        advance(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(ids(&controller.rendered()), vec![1, 2]);
    }
}
