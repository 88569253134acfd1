//! Theme preference.
//!
//! Only the selection is persisted. The resolved theme is recomputed from the
//! selection and the system color scheme whenever either changes.

mod storage;

pub use storage::{JsonFileStorage, MemoryStorage, PreferenceStorage};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Subscription};

/// Storage key of the theme selection.
pub const THEME_KEY: &str = "theme";

/// Theme chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeSelection {
    /// Always light.
    Light,
    /// Always dark.
    Dark,
    /// Follow the system color scheme.
    #[default]
    System,
}

impl ThemeSelection {
    /// Stored form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ThemeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown theme name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTheme(pub String);

impl fmt::Display for UnknownTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown theme: {}", self.0)
    }
}

impl std::error::Error for UnknownTheme {}

impl FromStr for ThemeSelection {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

/// Theme actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedTheme {
    /// Light palette.
    Light,
    /// Dark palette.
    Dark,
}

/// Resolves a selection against the system signal.
#[must_use]
pub const fn resolve(selection: ThemeSelection, prefers_dark: bool) -> ResolvedTheme {
    match selection {
        ThemeSelection::Light => ResolvedTheme::Light,
        ThemeSelection::Dark => ResolvedTheme::Dark,
        ThemeSelection::System if prefers_dark => ResolvedTheme::Dark,
        ThemeSelection::System => ResolvedTheme::Light,
    }
}

/// Selected and resolved theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceState {
    /// User choice.
    pub selection: ThemeSelection,
    /// Applied theme.
    pub resolved: ResolvedTheme,
}

/// The operating system's "prefers dark" signal.
pub trait ColorScheme: Send + Sync + 'static {
    /// Whether the system currently prefers a dark scheme.
    fn prefers_dark(&self) -> bool;
}

impl ColorScheme for watch::Receiver<bool> {
    fn prefers_dark(&self) -> bool {
        *self.borrow()
    }
}

/// A system signal that never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedScheme(pub bool);

impl ColorScheme for FixedScheme {
    fn prefers_dark(&self) -> bool {
        self.0
    }
}

struct Inner {
    storage: Arc<dyn PreferenceStorage>,
    scheme: Arc<dyn ColorScheme>,
    state: Mutex<(PreferenceState, bool)>,
    changes: EventBus<PreferenceState>,
}

impl Inner {
    /// Applies `update` to `(selection, prefers_dark)` and publishes the
    /// result if the resolved state changed.
    fn update(&self, update: impl FnOnce(&mut ThemeSelection, &mut bool)) -> PreferenceState {
        let (before, after) = {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let (state, prefers_dark) = &mut *guard;
            let before = *state;
            update(&mut state.selection, prefers_dark);
            state.resolved = resolve(state.selection, *prefers_dark);
            (before, *state)
        };
        if before != after {
            self.changes.emit(&after);
        }
        after
    }
}

/// Theme preference store.
#[derive(Clone)]
pub struct ThemeStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for ThemeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThemeStore")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ThemeStore {
    /// Loads the saved selection, defaulting to [`ThemeSelection::System`].
    ///
    /// Unreadable storage and unknown values fall back to the default.
    /// `scheme` is read again whenever a theme is selected.
    pub fn load(storage: Arc<dyn PreferenceStorage>, scheme: Arc<dyn ColorScheme>) -> Self {
        let selection = match storage.load(THEME_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|err: UnknownTheme| {
                warn!(error = %err, "ignoring stored theme");
                ThemeSelection::System
            }),
            Ok(None) => ThemeSelection::System,
            Err(err) => {
                warn!(error = %err, "failed to read theme preference");
                ThemeSelection::System
            }
        };
        let prefers_dark = scheme.prefers_dark();
        let state = PreferenceState {
            selection,
            resolved: resolve(selection, prefers_dark),
        };
        info!(selection = %state.selection, resolved = ?state.resolved, "theme loaded");

        Self {
            inner: Arc::new(Inner {
                storage,
                scheme,
                state: Mutex::new((state, prefers_dark)),
                changes: EventBus::new(),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PreferenceState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    /// Current selection.
    #[must_use]
    pub fn theme(&self) -> ThemeSelection {
        self.state().selection
    }

    /// Current applied theme.
    #[must_use]
    pub fn resolved_theme(&self) -> ResolvedTheme {
        self.state().resolved
    }

    /// Selects a theme and saves it.
    ///
    /// The new theme applies even if it cannot be saved.
    pub fn set_theme(&self, selection: ThemeSelection) -> PreferenceState {
        let prefers_dark = self.inner.scheme.prefers_dark();
        let state = self.inner.update(|current, dark| {
            *current = selection;
            *dark = prefers_dark;
        });
        if let Err(err) = self.inner.storage.store(THEME_KEY, selection.as_str()) {
            warn!(error = %err, "theme preference not saved");
        }
        state
    }

    /// Feeds a change of the system signal.
    pub fn system_scheme_changed(&self, prefers_dark: bool) -> PreferenceState {
        debug!(prefers_dark, "system color scheme changed");
        self.inner.update(|_, current| *current = prefers_dark)
    }

    /// Tracks the system signal published on `scheme` until the store is dropped.
    pub fn follow(&self, mut scheme: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while scheme.changed().await.is_ok() {
                let prefers_dark = *scheme.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ThemeStore { inner }.system_scheme_changed(prefers_dark);
            }
        })
    }

    /// Calls `callback` whenever the selected or resolved theme changes.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PreferenceState) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(callback)
    }
}
