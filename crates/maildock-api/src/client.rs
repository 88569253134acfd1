//! HTTP client for the mail API.

use std::future::Future;

use bytes::Bytes;
use maildock_core::{Attachment, FetchError, MailApi, Message, MessageId};
use reqwest::{Client, Response, header};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::stream::EventStream;

/// Client of one mail server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    /// Creates a client for the server at `base_url`, e.g. `http://localhost:3000`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an http(s) URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "API URL must start with http:// or https://, got {base_url:?}"
            )));
        }
        Ok(Self {
            base_url,
            http: Client::new(),
        })
    }

    /// Server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Download URL of an attachment.
    ///
    /// The server publishes files under `/api` + `file_url`; attachments
    /// without a locator fall back to the per-message route.
    #[must_use]
    pub fn attachment_url(&self, attachment: &Attachment) -> String {
        if attachment.file_url.starts_with('/') {
            self.url(&format!("/api{}", attachment.file_url))
        } else {
            self.url(&format!(
                "/api/mails/{}/attachments/{}",
                attachment.mail_id, attachment.id
            ))
        }
    }

    /// Lists message summaries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or bad JSON.
    pub async fn fetch_mails(&self) -> Result<Vec<Message>> {
        let response = check(self.http.get(self.url("/api/mails")).send().await?)?;
        let mails: Vec<Message> = serde_json::from_slice(&response.bytes().await?)?;
        debug!(count = mails.len(), "fetched mail list");
        Ok(mails)
    }

    /// Fetches one message with body and attachments.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or bad JSON.
    pub async fn fetch_mail(&self, id: MessageId) -> Result<Message> {
        let response = check(self.http.get(self.url(&format!("/api/mails/{id}"))).send().await?)?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    /// Deletes one message.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn remove_mail(&self, id: MessageId) -> Result<()> {
        check(
            self.http
                .delete(self.url(&format!("/api/mails/{id}")))
                .send()
                .await?,
        )?;
        info!(%id, "mail deleted on server");
        Ok(())
    }

    /// Downloads the bytes of an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn download_attachment(&self, attachment: &Attachment) -> Result<Bytes> {
        let url = self.attachment_url(attachment);
        let response = check(self.http.get(&url).send().await?)?;
        let bytes = response.bytes().await?;
        debug!(url = %url, size = bytes.len(), "attachment downloaded");
        Ok(bytes)
    }

    /// Opens `/api/events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened.
    pub async fn open_events(&self) -> Result<EventStream<Response>> {
        let response = check(
            self.http
                .get(self.url("/api/events"))
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .send()
                .await?,
        )?;
        info!("event stream connected");
        Ok(EventStream::new(response))
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Status(status.as_u16()))
    }
}

impl MailApi for ApiClient {
    fn list_mails(&self) -> impl Future<Output = std::result::Result<Vec<Message>, FetchError>> + Send {
        async move { Ok(self.fetch_mails().await?) }
    }

    fn get_mail(
        &self,
        id: MessageId,
    ) -> impl Future<Output = std::result::Result<Message, FetchError>> + Send {
        async move { Ok(self.fetch_mail(id).await?) }
    }

    fn delete_mail(
        &self,
        id: MessageId,
    ) -> impl Future<Output = std::result::Result<(), FetchError>> + Send {
        async move { Ok(self.remove_mail(id).await?) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use maildock_core::AttachmentId;

    fn attachment(file_url: &str) -> Attachment {
        Attachment {
            id: AttachmentId(9),
            mail_id: MessageId(4),
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            content_disposition: None,
            size_bytes: 3,
            file_url: file_url.to_string(),
        }
    }

    #[test]
    fn test_new_normalizes_base_url() {
        let client = ApiClient::new(" http://localhost:3000/ ").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert!(ApiClient::new("localhost:3000").is_err());
    }

    #[test]
    fn test_attachment_url() {
        let client = ApiClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            client.attachment_url(&attachment("/attachments/abc_a.txt")),
            "http://localhost:3000/api/attachments/abc_a.txt"
        );
        assert_eq!(
            client.attachment_url(&attachment("")),
            "http://localhost:3000/api/mails/4/attachments/9"
        );
    }
}
