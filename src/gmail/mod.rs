//! Mail retrieval over the Gmail REST API.
use crate::errors::{AppError, AppResult};
use crate::types::{
    decode_body_data, FullMessage, MessageRef, WireAttachment, WireMessage, WireMessageList,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// The three calls ingestion needs from a mailbox provider.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// All ids matching `query`, pages already followed.
    async fn search(&self, query: &str) -> AppResult<Vec<MessageRef>>;

    async fn get_full_message(&self, id: &str) -> AppResult<FullMessage>;

    /// Raw (already decoded) bytes of an attachment body.
    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<Vec<u8>>;
}

pub struct GmailClient {
    http: reqwest::Client,
    base: Url,
    user_id: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(api_base: &str, user_id: &str, access_token: &str) -> AppResult<Self> {
        let mut base = Url::parse(api_base)
            .map_err(|e| AppError::Config(format!("invalid api base {api_base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!("api base {api_base} cannot be a base")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("api base cannot be a base".into()))?
            .pop_if_empty()
            .push("users")
            .push(&self.user_id)
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> AppResult<T> {
        let res = self
            .http
            .get(url.clone())
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("GET {url} failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                message,
            });
        }

        res.json()
            .await
            .map_err(|e| AppError::Decode(format!("parse response of {url}: {e}")))
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn search(&self, query: &str) -> AppResult<Vec<MessageRef>> {
        let url = self.endpoint(&["messages"])?;
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query)];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: WireMessageList = self.get_json(url.clone(), &params).await?;
            debug!(count = page.messages.len(), more = page.next_page_token.is_some(), "Search page fetched");
            refs.extend(page.messages);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(refs)
    }

    async fn get_full_message(&self, id: &str) -> AppResult<FullMessage> {
        let url = self.endpoint(&["messages", id])?;
        let wire: WireMessage = self.get_json(url, &[("format", "full")]).await?;
        Ok(wire.into_message())
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<Vec<u8>> {
        let url = self.endpoint(&["messages", message_id, "attachments", attachment_id])?;
        let wire: WireAttachment = self.get_json(url, &[]).await?;
        let data = wire.data.ok_or_else(|| {
            AppError::Decode(format!("attachment {attachment_id} of {message_id} has no data"))
        })?;
        decode_body_data(&data)
    }
}

