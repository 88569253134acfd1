//! Composition root of the synchronization layer.

use std::sync::Arc;

use tracing::info;

use crate::bridge::{Notifier, PushBridge, PushChannel};
use crate::bus::EventBus;
use crate::cache::{DetailCache, ListCache, MAILS_KEY, QueryState};
use crate::config::ClientConfig;
use crate::deletion::{DeletionController, DeletionEvent};
use crate::format;
use crate::model::{Message, MessageId, unread_count};
use crate::mutation::{self, MailApi, MutationCoordinator, ReadOverlay};
use crate::route::Navigator;
use crate::ui::SidebarState;

/// One client session: caches, stores and coordinators, built once.
pub struct MailClient<A> {
    config: ClientConfig,
    list: ListCache,
    detail: DetailCache,
    sidebar: SidebarState,
    deletions: EventBus<DeletionEvent>,
    navigator: Arc<dyn Navigator>,
    mutations: MutationCoordinator<A>,
}

impl<A: MailApi> MailClient<A> {
    /// Builds a session talking to `api`.
    pub fn new(api: Arc<A>, navigator: Arc<dyn Navigator>, config: ClientConfig) -> Self {
        let read = ReadOverlay::default();
        let list = mutation::list_cache(&api, &read);
        let detail = mutation::detail_cache(&api, &read);
        let sidebar = SidebarState::new();
        let deletions = EventBus::new();
        let mutations = MutationCoordinator::new(
            api,
            list.clone(),
            detail.clone(),
            Arc::clone(&navigator),
            sidebar.clone(),
            deletions.clone(),
            read,
        );
        info!(app = %config.app_name, "mail client created");

        Self {
            config,
            list,
            detail,
            sidebar,
            deletions,
            navigator,
            mutations,
        }
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The message list cache.
    #[must_use]
    pub const fn list(&self) -> &ListCache {
        &self.list
    }

    /// The message detail cache.
    #[must_use]
    pub const fn detail(&self) -> &DetailCache {
        &self.detail
    }

    /// Sidebar visibility.
    #[must_use]
    pub const fn sidebar(&self) -> &SidebarState {
        &self.sidebar
    }

    /// Bus carrying confirmed deletions.
    #[must_use]
    pub const fn deletions(&self) -> &EventBus<DeletionEvent> {
        &self.deletions
    }

    /// Navigation service.
    #[must_use]
    pub fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    /// Read and delete operations.
    #[must_use]
    pub const fn mutations(&self) -> &MutationCoordinator<A> {
        &self.mutations
    }

    /// Starts loading the list and returns its state.
    pub fn load_inbox(&self) -> QueryState<Vec<Message>> {
        self.list.ensure(&MAILS_KEY)
    }

    /// Opens message `id`.
    pub fn open_message(&self, id: MessageId) {
        self.mutations.open_message(id);
    }

    /// Mounts a deletion controller over the list.
    #[must_use]
    pub fn mount_deletions(&self) -> DeletionController {
        DeletionController::mount(&self.deletions, &self.list, &self.config)
    }

    /// Opens the push bridge on `channel`.
    pub fn open_push<C: PushChannel>(&self, channel: C, notifier: Arc<dyn Notifier>) -> PushBridge {
        PushBridge::open(channel, self.list.clone(), notifier, &self.config)
    }

    /// Unread messages in the cached list.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.list
            .data(&MAILS_KEY)
            .map_or(0, |list| unread_count(&list))
    }

    /// Title reflecting the unread count.
    #[must_use]
    pub fn title(&self) -> String {
        format::inbox_title(&self.config.app_name, self.unread())
    }
}
