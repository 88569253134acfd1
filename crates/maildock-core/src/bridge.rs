//! Push-event bridge.
//!
//! Listens on the server event channel and turns every event into a list
//! invalidation, plus a desktop notification when the event announces an
//! unread message.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{ListCache, MAILS_KEY};
use crate::config::ClientConfig;
use crate::error::NotifyError;
use crate::model::Message;

/// A one-way server-to-client event stream.
pub trait PushChannel: Send + 'static {
    /// Next event payload, or `None` once the stream has ended.
    fn recv(&mut self) -> impl Future<Output = Option<String>> + Send;

    /// Releases the underlying connection.
    fn close(&mut self);
}

impl PushChannel for mpsc::Receiver<String> {
    fn recv(&mut self) -> impl Future<Output = Option<String>> + Send {
        mpsc::Receiver::recv(self)
    }

    fn close(&mut self) {
        mpsc::Receiver::close(self);
    }
}

/// State of the notification capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// The user has not been asked yet.
    #[default]
    Default,
    /// Notifications may be shown.
    Granted,
    /// The user refused. Never asked again.
    Denied,
}

/// Local notification capability.
pub trait Notifier: Send + Sync + 'static {
    /// Current permission.
    fn permission(&self) -> Permission;

    /// Asks the user for permission and returns the answer.
    fn request_permission(&self) -> Permission;

    /// Shows a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if permission is missing or the platform fails.
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Counters of a bridge's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStats {
    /// Events received.
    pub received: u64,
    /// Events whose payload was not a message.
    pub malformed: u64,
    /// Notifications shown.
    pub notified: u64,
}

struct Shared {
    cache: ListCache,
    notifier: Arc<dyn Notifier>,
    title: String,
    fallback_body: String,
    has_new_mail: AtomicBool,
    received: AtomicU64,
    malformed: AtomicU64,
    notified: AtomicU64,
}

impl Shared {
    fn handle(&self, payload: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.cache.invalidate(&MAILS_KEY);

        let message = match serde_json::from_str::<Message>(payload) {
            Ok(message) => message,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "ignoring malformed push event");
                return;
            }
        };
        if message.is_read {
            return;
        }

        self.has_new_mail.store(true, Ordering::Relaxed);
        if self.notifier.permission() != Permission::Granted {
            return;
        }
        let body = if message.subject.trim().is_empty() {
            self.fallback_body.as_str()
        } else {
            message.subject.as_str()
        };
        match self.notifier.notify(&self.title, body) {
            Ok(()) => {
                self.notified.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!(id = %message.id, error = %err, "notification failed"),
        }
    }
}

/// Closes the channel when the reader task ends, however it ends.
struct ChannelGuard<C: PushChannel>(C);

impl<C: PushChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        self.0.close();
        info!("push channel closed");
    }
}

/// A live subscription to the push channel.
///
/// Dropping the bridge closes it.
pub struct PushBridge {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl PushBridge {
    /// Opens the bridge and starts reading `channel`.
    ///
    /// Asks for notification permission if the user was never asked.
    /// Must be called from within a tokio runtime.
    pub fn open<C: PushChannel>(
        channel: C,
        cache: ListCache,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        if notifier.permission() == Permission::Default {
            let answer = notifier.request_permission();
            debug!(?answer, "notification permission requested");
        }

        let shared = Arc::new(Shared {
            cache,
            notifier,
            title: config.notification_title.clone(),
            fallback_body: config.notification_fallback_body.clone(),
            has_new_mail: AtomicBool::new(false),
            received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            notified: AtomicU64::new(0),
        });

        let reader = Arc::clone(&shared);
        // Built before spawning so an abort ahead of the first poll still closes.
        let mut guard = ChannelGuard(channel);
        let task = tokio::spawn(async move {
            while let Some(payload) = guard.0.recv().await {
                reader.handle(&payload);
            }
            debug!("push channel ended");
        });
        info!("push bridge opened");

        Self {
            shared,
            task: Some(task),
        }
    }

    /// Stops reading and closes the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("push bridge closed");
        }
    }

    /// Whether the bridge is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Whether an unread message arrived since the last call. Clears the flag.
    pub fn take_new_mail(&self) -> bool {
        self.shared.has_new_mail.swap(false, Ordering::Relaxed)
    }

    /// Snapshot of the event counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            received: self.shared.received.load(Ordering::Relaxed),
            malformed: self.shared.malformed.load(Ordering::Relaxed),
            notified: self.shared.notified.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PushBridge {
    fn drop(&mut self) {
        self.close();
    }
}
