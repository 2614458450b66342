//! HTTP webhook sink for outbound events.
//!
//! Each event is POSTed as JSON to a single endpoint. Timeouts, connection
//! failures, 429 and 5xx responses are retried with exponential backoff;
//! anything else fails immediately. A bearer token, when set, is sent with
//! every delivery.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use templatebot_core::collaborators::EventSink;
use templatebot_core::event::OutboundEvent;

const SERVICE: &str = "webhook";

#[derive(Clone)]
pub struct WebhookSink {
    http: Client,
    endpoint: String,
    bearer_token: Option<String>,
    max_retries: usize,
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.bearer_token.is_some())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl WebhookSink {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(ClientError::Config("webhook endpoint is empty".into()));
        }
        Ok(Self {
            http,
            endpoint,
            bearer_token: None,
            max_retries: 4,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    fn is_retryable(err: &ClientError) -> bool {
        match err {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Status { status, .. } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::OK);
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    async fn post_once(&self, event: &OutboundEvent) -> Result<()> {
        let mut req = self.http.post(&self.endpoint).json(event);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        crate::http::check(SERVICE, resp).await?;
        tracing::debug!(endpoint = %self.endpoint, "event delivered");
        Ok(())
    }

    pub async fn deliver(&self, event: &OutboundEvent) -> Result<()> {
        (|| self.post_once(event))
            .retry(self.backoff())
            .when(Self::is_retryable)
            .notify(|err, delay| {
                tracing::warn!(endpoint = %self.endpoint, ?delay, "retrying event delivery: {err}");
            })
            .await
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn publish(&self, event: &OutboundEvent) -> templatebot_core::Result<()> {
        self.deliver(event).await.map_err(|e| e.into_core(SERVICE))
    }
}
