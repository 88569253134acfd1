//! `Maildock` - terminal inbox for a local development mail server
//!
//! Keeps the message list live through the server event stream.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod command;
mod config;
mod notifier;
mod view;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use maildock_api::ApiClient;
use maildock_core::{
    AttachmentId, DeletionController, JsonFileStorage, MAILS_KEY, MailClient, MemoryNavigator,
    MessageId, Navigator, PushBridge, Route, Subscription, ThemeStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use command::Command;
use config::AppConfig;
use notifier::DesktopNotifier;

// The synchronization layer assumes one logical thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maildock=info,maildock_core=info,maildock_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(api = %config.api_url, "Starting Maildock");

    let api = Arc::new(ApiClient::new(config.api_url.clone())?);
    let app = App::start(api, &config).await;
    app.run().await
}

/// Running session of the terminal client.
struct App {
    api: Arc<ApiClient>,
    client: MailClient<ApiClient>,
    navigator: MemoryNavigator,
    deletions: DeletionController,
    theme: ThemeStore,
    scheme: watch::Sender<bool>,
    bridge: Option<PushBridge>,
    redraw: mpsc::UnboundedReceiver<()>,
    redraw_tx: mpsc::UnboundedSender<()>,
    /// Keeps observers registered for the life of the session.
    subscriptions: Vec<Subscription>,
    detail_subscription: Option<Subscription>,
    confirm_delete: Option<MessageId>,
}

impl App {
    async fn start(api: Arc<ApiClient>, config: &AppConfig) -> Self {
        let navigator = MemoryNavigator::new();
        let client = MailClient::new(
            Arc::clone(&api),
            Arc::new(navigator.clone()),
            config.client.clone(),
        );

        let (scheme, scheme_rx) = watch::channel(config.prefers_dark);
        let theme = ThemeStore::load(
            Arc::new(JsonFileStorage::default_location()),
            Arc::new(scheme_rx.clone()),
        );
        theme.follow(scheme_rx);

        let deletions = client.mount_deletions();
        let (redraw_tx, redraw) = mpsc::unbounded_channel();

        let mut subscriptions = Vec::new();
        let tx = redraw_tx.clone();
        subscriptions.push(deletions.subscribe_rendered(move |_| {
            let _ = tx.send(());
        }));
        let tx = redraw_tx.clone();
        subscriptions.push(deletions.subscribe_phases(move |change| {
            info!(id = %change.id, phase = ?change.phase, "deletion");
            let _ = tx.send(());
        }));
        let tx = redraw_tx.clone();
        subscriptions.push(client.list().subscribe(&MAILS_KEY, move |_| {
            let _ = tx.send(());
        }));
        subscriptions.push(theme.subscribe(|state| println!("{}", view::theme(state))));
        subscriptions.push(client.sidebar().subscribe(|open| {
            println!("Sidebar {}", if *open { "open" } else { "closed" });
        }));

        let notifier = Arc::new(DesktopNotifier::new(
            config.client.app_name.clone(),
            config.notifications,
        ));
        let bridge = match api.open_events().await {
            Ok(stream) => Some(client.open_push(stream, notifier)),
            Err(err) => {
                warn!(error = %err, "live updates unavailable");
                None
            }
        };

        client.load_inbox();
        println!("{}", view::theme(&theme.state()));

        Self {
            api,
            client,
            navigator,
            deletions,
            theme,
            scheme,
            bridge,
            redraw,
            redraw_tx,
            subscriptions,
            detail_subscription: None,
            confirm_delete: None,
        }
    }

    async fn run(mut self) -> anyhow::Result<()> {
        println!("{}", command::HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                Some(()) = self.redraw.recv() => {
                    while self.redraw.try_recv().is_ok() {}
                    self.draw();
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.handle_line(&line).await {
                        break;
                    }
                }
            }
        }

        if let Some(mut bridge) = self.bridge.take() {
            bridge.close();
            let stats = bridge.stats();
            info!(
                received = stats.received,
                malformed = stats.malformed,
                notified = stats.notified,
                "push bridge statistics"
            );
        }
        self.subscriptions.clear();
        info!("Maildock stopped");
        Ok(())
    }

    /// Handles one input line. Returns `false` to exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        if let Some(id) = self.confirm_delete.take() {
            if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                self.delete(id).await;
            } else {
                println!("Kept message {id}");
            }
            return true;
        }

        match line.parse::<Command>() {
            Ok(Command::Help) => println!("{}", command::HELP),
            Ok(Command::Inbox) => {
                self.navigator.navigate(Route::Inbox);
                self.detail_subscription = None;
                self.draw();
            }
            Ok(Command::Open(id)) => self.open(id),
            Ok(Command::Delete(id)) => {
                println!("Delete message {id}? [y/N]");
                self.confirm_delete = Some(id);
            }
            Ok(Command::Theme(selection)) => {
                self.theme.set_theme(selection);
            }
            Ok(Command::Scheme { dark }) => {
                let _ = self.scheme.send(dark);
            }
            Ok(Command::Sidebar) => {
                self.client.sidebar().toggle();
            }
            Ok(Command::Download(id)) => self.download(id).await,
            Ok(Command::Refresh) => {
                let started = self.client.list().refetch_all_stale()
                    + self.client.detail().refetch_all_stale();
                if started == 0 {
                    self.client.list().invalidate(&MAILS_KEY);
                }
            }
            Ok(Command::Quit) => return false,
            Err(err) => println!("{err}"),
        }
        true
    }

    fn open(&mut self, id: MessageId) {
        let tx = self.redraw_tx.clone();
        self.detail_subscription = Some(self.client.detail().subscribe(&id, move |_| {
            let _ = tx.send(());
        }));
        self.client.open_message(id);
        self.draw();
    }

    async fn delete(&self, id: MessageId) {
        let mutations = self.client.mutations();
        if let Err(err) = mutations.delete(id).await {
            println!("{err}");
            mutations.clear_error();
        }
    }

    async fn download(&self, id: AttachmentId) {
        let Route::Message(message_id) = self.navigator.current() else {
            println!("Open a message first");
            return;
        };
        let Some(attachment) = self
            .client
            .detail()
            .data(&message_id)
            .and_then(|m| m.attachments.into_iter().find(|a| a.id == id))
        else {
            println!("No attachment {id} in this message");
            return;
        };

        let bytes = match self.api.download_attachment(&attachment).await {
            Ok(bytes) => bytes,
            Err(err) => {
                println!("Download failed: {err}");
                return;
            }
        };
        let path = dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(&attachment.filename);
        if let Err(err) = tokio::fs::write(&path, &bytes).await {
            println!("Could not save {}: {err}", path.display());
            return;
        }
        println!("Saved {}", path.display());
        if let Err(err) = opener::open(&path) {
            warn!(error = %err, "could not open attachment");
        }
    }

    fn draw(&self) {
        let route = self.navigator.current();
        let list = self.client.list().get(&MAILS_KEY);
        let new_mail = self
            .bridge
            .as_ref()
            .is_some_and(PushBridge::take_new_mail);
        println!(
            "{}",
            view::inbox(
                &self.client.title(),
                new_mail,
                &list,
                &self.deletions.rendered(),
                route.message(),
                |id| self.deletions.phase(id),
                chrono::Utc::now(),
            )
        );
        match route {
            Route::Message(id) => println!("{}", view::detail(&self.client.detail().get(&id))),
            Route::NotFound(path) => println!("404 - {path} not found"),
            Route::Inbox => {}
        }
    }
}
