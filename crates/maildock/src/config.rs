//! Application configuration.

use std::path::PathBuf;

use maildock_core::ClientConfig;
use serde::{Deserialize, Serialize};

/// Settings of the terminal client, from `config.json` and the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the mail server.
    pub api_url: String,
    /// System color scheme reported to the theme store.
    pub prefers_dark: bool,
    /// Whether desktop notifications may be shown.
    pub notifications: bool,
    /// Synchronization layer settings.
    #[serde(flatten)]
    pub client: ClientConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            prefers_dark: false,
            notifications: true,
            client: ClientConfig::default(),
        }
    }
}

impl AppConfig {
    /// Path of `config.json`.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maildock")
            .join("config.json")
    }

    /// Loads `config.json` (defaults when absent) and applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("invalid {}: {e}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `MAILDOCK_*` overrides read through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("MAILDOCK_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(flag) = var("MAILDOCK_PREFERS_DARK").and_then(|v| parse_flag(&v)) {
            self.prefers_dark = flag;
        }
        if let Some(flag) = var("MAILDOCK_NOTIFICATIONS").and_then(|v| parse_flag(&v)) {
            self.notifications = flag;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
