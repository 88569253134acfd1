//! User mutations: mark-as-read and delete.
//!
//! Reads are optimistic and client-only. Deletes wait for the server; only a
//! confirmed delete touches local state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::cache::{DetailCache, ListCache, MAILS_KEY, QueryCache};
use crate::deletion::DeletionEvent;
use crate::error::{FetchError, MutationError};
use crate::model::{Message, MessageId};
use crate::route::{Navigator, Route};
use crate::ui::SidebarState;

/// The mail HTTP API.
pub trait MailApi: Send + Sync + 'static {
    /// `GET /api/mails`.
    fn list_mails(&self) -> impl Future<Output = Result<Vec<Message>, FetchError>> + Send;

    /// `GET /api/mails/{id}`.
    fn get_mail(&self, id: MessageId) -> impl Future<Output = Result<Message, FetchError>> + Send;

    /// `DELETE /api/mails/{id}`.
    fn delete_mail(&self, id: MessageId) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Ids the user has read in this session.
///
/// Applied to every fetched list and detail so that a server snapshot taken
/// before the read cannot flip the flag back.
#[derive(Debug, Clone, Default)]
pub struct ReadOverlay(Arc<Mutex<HashSet<MessageId>>>);

impl ReadOverlay {
    fn lock(&self) -> MutexGuard<'_, HashSet<MessageId>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `id` as read. Returns `false` if it already was.
    pub fn insert(&self, id: MessageId) -> bool {
        self.lock().insert(id)
    }

    /// Whether `id` was read in this session.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().contains(&id)
    }

    /// Forgets `id`, once it no longer exists.
    pub fn forget(&self, id: MessageId) {
        self.lock().remove(&id);
    }

    /// Marks `message` read if it was read in this session.
    pub fn apply(&self, message: &mut Message) {
        if self.contains(message.id) {
            message.mark_read();
        }
    }

    /// Marks every message of `messages` read if it was read in this session.
    pub fn apply_all(&self, messages: &mut [Message]) {
        let read = self.lock();
        for message in messages.iter_mut().filter(|m| read.contains(&m.id)) {
            message.mark_read();
        }
    }
}

/// Builds the list cache, fetching through `api` and reconciling with `overlay`.
pub fn list_cache<A: MailApi>(api: &Arc<A>, overlay: &ReadOverlay) -> ListCache {
    let api = Arc::clone(api);
    let overlay = overlay.clone();
    QueryCache::new("mails", move |_| {
        let api = Arc::clone(&api);
        Box::pin(async move { api.list_mails().await })
    })
    .with_reconcile(move |_, messages: &mut Vec<Message>| overlay.apply_all(messages))
}

/// Builds the detail cache, fetching through `api` and reconciling with `overlay`.
pub fn detail_cache<A: MailApi>(api: &Arc<A>, overlay: &ReadOverlay) -> DetailCache {
    let api = Arc::clone(api);
    let overlay = overlay.clone();
    QueryCache::new("mail", move |id| {
        let api = Arc::clone(&api);
        Box::pin(async move { api.get_mail(id).await })
    })
    .with_reconcile(move |_, message: &mut Message| overlay.apply(message))
}

/// Removes an id from the in-flight set on every exit path.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<MessageId>>,
    id: MessageId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Applies user mutations to the caches.
pub struct MutationCoordinator<A> {
    api: Arc<A>,
    list: ListCache,
    detail: DetailCache,
    navigator: Arc<dyn Navigator>,
    sidebar: SidebarState,
    deletions: EventBus<DeletionEvent>,
    read: ReadOverlay,
    deleting: Mutex<HashSet<MessageId>>,
    last_error: Mutex<Option<MutationError>>,
}

impl<A: MailApi> MutationCoordinator<A> {
    /// Creates a coordinator over the given caches and collaborators.
    #[must_use]
    pub fn new(
        api: Arc<A>,
        list: ListCache,
        detail: DetailCache,
        navigator: Arc<dyn Navigator>,
        sidebar: SidebarState,
        deletions: EventBus<DeletionEvent>,
        read: ReadOverlay,
    ) -> Self {
        Self {
            api,
            list,
            detail,
            navigator,
            sidebar,
            deletions,
            read,
            deleting: Mutex::new(HashSet::new()),
            last_error: Mutex::new(None),
        }
    }

    /// Marks `id` read in the list and detail caches.
    ///
    /// Returns `true` if a cached flag changed. Calling it again is a no-op.
    pub fn mark_read(&self, id: MessageId) -> bool {
        self.read.insert(id);
        if self.list.data(&MAILS_KEY).is_some_and(|list| {
            list.iter().any(|m| m.id == id && !m.is_read)
        }) {
            let mut changed = false;
            self.list.set_local(&MAILS_KEY, |list| {
                if let Some(message) = list.iter_mut().find(|m| m.id == id) {
                    changed = message.mark_read();
                }
            });
            if changed {
                debug!(%id, "marked read");
            }
            self.mark_detail_read(id);
            return changed;
        }
        self.mark_detail_read(id)
    }

    fn mark_detail_read(&self, id: MessageId) -> bool {
        if self.detail.data(&id).is_some_and(|m| !m.is_read) {
            let mut changed = false;
            self.detail.set_local(&id, |m| changed = m.mark_read());
            return changed;
        }
        false
    }

    /// Shows message `id`: navigates to it, marks it read and loads its body.
    pub fn open_message(&self, id: MessageId) {
        self.navigator.navigate(Route::Message(id));
        self.mark_read(id);
        self.sidebar.close();
        self.detail.ensure(&id);
    }

    /// Deletes message `id` on the server.
    ///
    /// On success publishes [`DeletionEvent::Confirmed`], refreshes the list,
    /// drops the cached detail and leaves its view if it is showing.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::DeleteInProgress`] if a delete of `id` is
    /// already waiting, or the server failure. Nothing local changes on error.
    pub async fn delete(&self, id: MessageId) -> Result<(), MutationError> {
        let _in_flight = {
            let mut deleting = self.deleting.lock().unwrap_or_else(PoisonError::into_inner);
            if !deleting.insert(id) {
                return Err(MutationError::DeleteInProgress(id));
            }
            InFlight {
                set: &self.deleting,
                id,
            }
        };

        if let Err(err) = self.api.delete_mail(id).await {
            let err = MutationError::from_fetch(id, err);
            warn!(error = %err, "delete rejected");
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
            return Err(err);
        }

        info!(%id, "message deleted");
        self.deletions.emit(&DeletionEvent::Confirmed(id));
        self.list.invalidate(&MAILS_KEY);
        self.detail.remove(&id);
        self.read.forget(id);
        if self.navigator.current().message() == Some(id) {
            self.navigator.navigate(Route::Inbox);
        }
        Ok(())
    }

    /// The last delete failure, for a transient error message.
    #[must_use]
    pub fn last_error(&self) -> Option<MutationError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dismisses the last delete failure.
    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
