//! Author directory lookups.

use crate::error::{ClientError, Result};
use crate::http::check;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use templatebot_core::author::Author;
use templatebot_core::collaborators::AuthorDirectory;
use templatebot_core::TemplatebotError;

const SERVICE: &str = "authordb";

#[derive(Debug, Clone)]
pub struct AuthorDbClient {
    http: Client,
    api_url: String,
}

impl AuthorDbClient {
    pub fn new(http: Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, author_id: &str) -> Result<Author> {
        let resp = self
            .http
            .get(format!("{}/{}", self.api_url, author_id))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                service: SERVICE,
                what: format!("author '{author_id}'"),
            });
        }
        Ok(check(SERVICE, resp).await?.json().await?)
    }
}

#[async_trait]
impl AuthorDirectory for AuthorDbClient {
    async fn get_author(&self, author_id: &str) -> templatebot_core::Result<Author> {
        match self.fetch(author_id).await {
            Ok(author) => Ok(author),
            Err(ClientError::NotFound { .. }) => {
                Err(TemplatebotError::AuthorNotFound(author_id.to_string()))
            }
            Err(e) => Err(e.into_core(SERVICE)),
        }
    }
}
