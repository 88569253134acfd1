//! Client-side cache of server data.
//!
//! The message list lives under [`MAILS_KEY`]; each message detail lives in
//! its own cache keyed by [`MessageId`](crate::model::MessageId).

mod model;
mod store;

pub use model::{QueryState, QueryStatus};
pub use store::{FetchFuture, QueryCache};

use crate::model::{Message, MessageId};

/// Cache key of the message list.
pub const MAILS_KEY: &str = "mails";

/// Cache holding the message list under [`MAILS_KEY`].
pub type ListCache = QueryCache<&'static str, Vec<Message>>;

/// Cache holding message details.
pub type DetailCache = QueryCache<MessageId, Message>;
