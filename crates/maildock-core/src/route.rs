//! Routing model.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::MessageId;

/// Routes kept by [`MemoryNavigator`]; older ones are dropped.
pub const HISTORY_LIMIT: usize = 64;

/// A location of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The message list, `/`.
    Inbox,
    /// A message detail view, `/mail/{id}`.
    Message(MessageId),
    /// Any other path.
    NotFound(String),
}

impl Route {
    /// Parses a path.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Self::Inbox;
        }
        if let Some(rest) = trimmed.strip_prefix("/mail/")
            && let Ok(id) = rest.trim_end_matches('/').parse::<i64>()
        {
            return Self::Message(MessageId(id));
        }
        Self::NotFound(trimmed.to_string())
    }

    /// Path of the route.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Inbox => "/".to_string(),
            Self::Message(id) => format!("/mail/{id}"),
            Self::NotFound(path) => path.clone(),
        }
    }

    /// Message shown by this route, if any.
    #[must_use]
    pub const fn message(&self) -> Option<MessageId> {
        match self {
            Self::Message(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Navigation service.
pub trait Navigator: Send + Sync + 'static {
    /// Route currently shown.
    fn current(&self) -> Route;

    /// Moves to `route`.
    fn navigate(&self, route: Route);
}

/// In-process navigator that records every visited route.
#[derive(Debug, Clone)]
pub struct MemoryNavigator {
    history: Arc<Mutex<Vec<Route>>>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![Route::Inbox])),
        }
    }
}

impl MemoryNavigator {
    /// Starts at the inbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every route visited so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Route> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current(&self) -> Route {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or(Route::Inbox)
    }

    fn navigate(&self, route: Route) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(route);
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Route::parse("/"), Route::Inbox);
        assert_eq!(Route::parse(""), Route::Inbox);
        assert_eq!(Route::parse("/mail/12"), Route::Message(MessageId(12)));
        assert_eq!(Route::parse("/mail/12/"), Route::Message(MessageId(12)));
        assert_eq!(
            Route::parse("/mail/abc"),
            Route::NotFound("/mail/abc".to_string())
        );
        assert_eq!(
            Route::parse("/settings"),
            Route::NotFound("/settings".to_string())
        );
    }

    #[test]
    fn test_path() {
        assert_eq!(Route::Inbox.path(), "/");
        assert_eq!(Route::Message(MessageId(4)).to_string(), "/mail/4");
    }

    #[test]
    fn test_memory_navigator_history() {
        let nav = MemoryNavigator::new();
        assert_eq!(nav.current(), Route::Inbox);
        nav.navigate(Route::Message(MessageId(1)));
        assert_eq!(nav.current().message(), Some(MessageId(1)));
        assert_eq!(nav.history().len(), 2);
    }

    #[test]
    fn test_memory_navigator_history_is_bounded() {
        let nav = MemoryNavigator::new();
        for id in 0..200 {
            nav.navigate(Route::Message(MessageId(id)));
        }
        let history = nav.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.last(), Some(&Route::Message(MessageId(199))));
        assert_eq!(history[0], Route::Message(MessageId(200 - 64)));
    }
}
