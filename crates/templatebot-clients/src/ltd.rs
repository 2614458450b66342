//! LSST the Docs (LTD Keeper) admin API client.

use crate::error::{ClientError, Result};
use crate::http::check;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use templatebot_core::collaborators::{DocsHost, DocsProduct, ProductRegistration};
use templatebot_core::config::Secret;

const SERVICE: &str = "ltd";
const BUCKET_NAME: &str = "lsst-the-docs";
const ROOT_DOMAIN: &str = "lsst.io";
const ROOT_FASTLY_DOMAIN: &str = "n.global-ssl.fastly.net";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct NewProduct<'a> {
    title: &'a str,
    slug: &'a str,
    doc_repo: &'a str,
    main_mode: &'a str,
    bucket_name: &'a str,
    root_domain: &'a str,
    root_fastly_domain: &'a str,
}

#[derive(Debug)]
pub struct LtdClient {
    http: Client,
    api_url: String,
    username: String,
    password: Secret,
}

impl LtdClient {
    pub fn new(http: Client, api_url: impl Into<String>, username: impl Into<String>, password: Secret) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password,
        }
    }

    /// Exchange the account credentials for an API token. The token is used
    /// as the basic-auth username with an empty password.
    pub async fn token(&self) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/token", self.api_url))
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await?;
        let body: TokenResponse = check(SERVICE, resp).await?.json().await?;
        Ok(body.token)
    }

    pub async fn register(&self, product: &ProductRegistration) -> Result<DocsProduct> {
        let body = NewProduct {
            title: &product.title,
            slug: &product.slug,
            doc_repo: &product.repo_url,
            main_mode: product.tracking_mode.as_str(),
            bucket_name: BUCKET_NAME,
            root_domain: ROOT_DOMAIN,
            root_fastly_domain: ROOT_FASTLY_DOMAIN,
        };
        tracing::info!(slug = %product.slug, mode = body.main_mode, "registering LTD product");

        let token = self.token().await?;
        let resp = self
            .http
            .post(format!("{}/products/", self.api_url))
            .basic_auth(&token, Some(""))
            .json(&body)
            .send()
            .await?;
        let resp = check(SERVICE, resp).await?;
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ClientError::MissingHeader {
                service: SERVICE,
                header: "Location",
            })?
            .to_string();

        let resp = self
            .http
            .get(&location)
            .basic_auth(&token, Some(""))
            .send()
            .await?;
        Ok(check(SERVICE, resp).await?.json().await?)
    }
}

#[async_trait]
impl DocsHost for LtdClient {
    async fn register_product(
        &self,
        product: &ProductRegistration,
    ) -> templatebot_core::Result<DocsProduct> {
        self.register(product)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }
}
