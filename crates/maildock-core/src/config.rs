//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the synchronization layer.
///
/// Every field has a default, so a partial `config.json` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Dwell time between a confirmed delete and eviction from the list.
    pub eviction_dwell_ms: u64,
    /// Application name shown in the inbox title.
    pub app_name: String,
    /// Title of the new-mail notification.
    pub notification_title: String,
    /// Notification body used when the new message has no subject.
    pub notification_fallback_body: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            eviction_dwell_ms: 300,
            app_name: "Maildock".to_string(),
            notification_title: "New mail".to_string(),
            notification_fallback_body: "You have received a new mail".to_string(),
        }
    }
}

impl ClientConfig {
    /// Dwell time as a [`Duration`].
    #[must_use]
    pub const fn eviction_dwell(&self) -> Duration {
        Duration::from_millis(self.eviction_dwell_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.eviction_dwell(), Duration::from_millis(300));
        assert_eq!(config.notification_title, "New mail");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"app_name":"Inbox"}"#).unwrap();
        assert_eq!(config.app_name, "Inbox");
        assert_eq!(config.eviction_dwell_ms, 300);
    }
}
