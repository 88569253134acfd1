//! Commands typed at the prompt.

use std::str::FromStr;

use maildock_core::{AttachmentId, MessageId, ThemeSelection};

/// A user command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show the command list.
    Help,
    /// Go back to the inbox.
    Inbox,
    /// Open a message.
    Open(MessageId),
    /// Delete a message (asks for confirmation).
    Delete(MessageId),
    /// Select a theme.
    Theme(ThemeSelection),
    /// Simulate a change of the system color scheme.
    Scheme {
        /// Whether the system now prefers dark.
        dark: bool,
    },
    /// Toggle the sidebar.
    Sidebar,
    /// Download and open an attachment of the open message.
    Download(AttachmentId),
    /// Retry failed loads.
    Refresh,
    /// Exit.
    Quit,
}

/// Help text.
pub const HELP: &str = "\
Commands:
  open <id>         show a message
  inbox             back to the list
  delete <id>       delete a message
  download <id>     download an attachment of the open message
  theme <light|dark|system>
  scheme <light|dark>  simulate a system color scheme change
  sidebar           toggle the sidebar
  refresh           retry failed loads
  quit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let id = |what: &str| -> Result<i64, String> {
            arg.ok_or_else(|| format!("{verb} needs a {what} id"))?
                .parse::<i64>()
                .map_err(|_| format!("invalid {what} id"))
        };

        match verb.as_str() {
            "" | "help" | "?" => Ok(Self::Help),
            "inbox" | "back" | "list" => Ok(Self::Inbox),
            "open" => Ok(Self::Open(MessageId(id("message")?))),
            "delete" | "rm" => Ok(Self::Delete(MessageId(id("message")?))),
            "download" | "dl" => Ok(Self::Download(AttachmentId(id("attachment")?))),
            "theme" => arg
                .ok_or_else(|| "theme needs light, dark or system".to_string())?
                .parse()
                .map(Self::Theme)
                .map_err(|e| e.to_string()),
            "scheme" => match arg {
                Some("dark") => Ok(Self::Scheme { dark: true }),
                Some("light") => Ok(Self::Scheme { dark: false }),
                _ => Err("scheme needs light or dark".to_string()),
            },
            "sidebar" => Ok(Self::Sidebar),
            "refresh" => Ok(Self::Refresh),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}
