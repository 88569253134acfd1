//! # maildock-api
//!
//! HTTP client for the Maildock mail API.
//!
//! [`ApiClient`] implements [`maildock_core::MailApi`] and opens the server
//! event stream as an [`EventStream`], which implements
//! [`maildock_core::PushChannel`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod sse;
mod stream;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use sse::{SseDecoder, SseEvent};
pub use stream::{ChunkSource, EventStream, ReaderSource};
