//! # maildock-core
//!
//! Live synchronization and state reconciliation for the `Maildock` inbox.
//!
//! This crate provides:
//! - Domain models for messages and attachments
//! - A keyed query cache with epoch-tagged refetching
//! - The push-event bridge (server events to cache invalidation and notifications)
//! - Optimistic mark-as-read and server-confirmed delete
//! - The timed deletion lifecycle of the rendered list
//! - Theme preference and sidebar state
//! - Display formatting helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod bus;
pub mod cache;
mod client;
mod config;
pub mod deletion;
mod error;
pub mod format;
pub mod model;
pub mod mutation;
pub mod preference;
pub mod route;
pub mod ui;

pub use bridge::{BridgeStats, Notifier, Permission, PushBridge, PushChannel};
pub use bus::{EventBus, Subscription};
pub use cache::{DetailCache, ListCache, MAILS_KEY, QueryCache, QueryState, QueryStatus};
pub use client::MailClient;
pub use config::ClientConfig;
pub use deletion::{DeletionController, DeletionEvent, DeletionPhase, PhaseChange};
pub use error::{FetchError, MutationError, NotifyError, StorageError, StorageResult};
pub use model::{Attachment, AttachmentId, Mailbox, Message, MessageId, unread_count};
pub use mutation::{MailApi, MutationCoordinator, ReadOverlay};
pub use preference::{
    ColorScheme, FixedScheme, JsonFileStorage, MemoryStorage, PreferenceState, PreferenceStorage,
    ResolvedTheme, ThemeSelection, ThemeStore,
};
pub use route::{MemoryNavigator, Navigator, Route};
pub use ui::SidebarState;
