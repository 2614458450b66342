//! Slack Web API client for the three calls the bot makes.
//!
//! Slack answers `200 OK` even for failed calls; the `ok` flag in the body is
//! what decides success.

use crate::error::{ClientError, Result};
use crate::http::check;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use templatebot_core::collaborators::{MessageRef, Notification, Notifier};
use templatebot_core::config::Secret;

const SERVICE: &str = "slack";
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: Value,
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    ts: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<&'a str>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct OpenView<'a> {
    trigger_id: &'a str,
    view: &'a Value,
}

#[derive(Debug)]
pub struct SlackClient {
    http: Client,
    api_url: String,
    token: Secret,
}

impl SlackClient {
    pub fn new(http: Client, token: Secret) -> Self {
        Self::with_api_url(http, DEFAULT_API_URL, token)
    }

    pub fn with_api_url(http: Client, api_url: impl Into<String>, token: Secret) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(self.token.expose())
            .json(body)
            .send()
            .await?;
        let envelope: Envelope = check(SERVICE, resp).await?.json().await?;
        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown_error".into());
            tracing::warn!(method, %error, "slack call rejected");
            return Err(ClientError::Slack(format!("{method}: {error}")));
        }
        serde_json::from_value(envelope.rest)
            .map_err(|e| ClientError::Slack(format!("{method}: unexpected response: {e}")))
    }

    pub async fn post(&self, channel: &str, message: &Notification) -> Result<MessageRef> {
        let body = ChatMessage {
            channel,
            ts: None,
            text: &message.text,
            blocks: message.blocks.as_ref(),
        };
        let posted: PostedMessage = self.call("chat.postMessage", &body).await?;
        Ok(MessageRef(posted.ts))
    }

    pub async fn update(
        &self,
        channel: &str,
        message_ref: &MessageRef,
        message: &Notification,
    ) -> Result<()> {
        let body = ChatMessage {
            channel,
            ts: Some(&message_ref.0),
            text: &message.text,
            blocks: message.blocks.as_ref(),
        };
        let _: Value = self.call("chat.update", &body).await?;
        Ok(())
    }

    pub async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<()> {
        let _: Value = self
            .call("views.open", &OpenView { trigger_id, view })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        message: &Notification,
    ) -> templatebot_core::Result<MessageRef> {
        self.post(channel, message)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn update_message(
        &self,
        channel: &str,
        message_ref: &MessageRef,
        message: &Notification,
    ) -> templatebot_core::Result<()> {
        self.update(channel, message_ref, message)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn open_modal(&self, trigger_id: &str, modal: &Value) -> templatebot_core::Result<()> {
        self.open_view(trigger_id, modal)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }
}
