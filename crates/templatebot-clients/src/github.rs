//! GitHub App client: app JWTs, organisation installation tokens, and the
//! repository calls the provisioning workflow needs.

use crate::error::{ClientError, Result};
use crate::http::{check, next_link};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use templatebot_core::collaborators::{CreatedRepository, NewRepository, PushCredentials, SourceHost};
use tokio::sync::Mutex;

const SERVICE: &str = "github";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct Installation {
    id: u64,
    target_type: String,
    account: Account,
}

#[derive(Debug, Deserialize)]
struct Account {
    login: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RepoSummary {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRepo {
    html_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    auto_init: bool,
    has_projects: bool,
    has_wiki: bool,
    allow_squash_merge: bool,
    allow_merge_commit: bool,
    allow_rebase_merge: bool,
    delete_branch_on_merge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> CreateRepoRequest<'a> {
    /// An empty repository with the organisation's merge settings.
    fn empty(repo: &'a NewRepository) -> Self {
        Self {
            name: &repo.name,
            auto_init: false,
            has_projects: false,
            has_wiki: false,
            allow_squash_merge: false,
            allow_merge_commit: true,
            allow_rebase_merge: false,
            delete_branch_on_merge: true,
            homepage: repo.homepage.as_deref(),
            description: repo.description.as_deref(),
        }
    }
}

// ─── GitHubAppClient ──────────────────────────────────────────────────────

type TokenSlot = Arc<Mutex<Option<InstallationToken>>>;

pub struct GitHubAppClient {
    http: Client,
    api_url: String,
    app_id: String,
    key: EncodingKey,
    username: String,
    /// owner -> installation token slot. Each slot is locked on its own so
    /// minting a token for one organisation never blocks another.
    tokens: std::sync::Mutex<HashMap<String, TokenSlot>>,
}

impl std::fmt::Debug for GitHubAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppClient")
            .field("api_url", &self.api_url)
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GitHubAppClient {
    pub fn new(
        http: Client,
        api_url: impl Into<String>,
        app_id: impl Into<String>,
        private_key_pem: &str,
        username: impl Into<String>,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            key,
            username: username.into(),
            tokens: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// A short-lived JWT identifying the app itself.
    pub fn app_jwt(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            // Backdated to tolerate clock drift.
            iat: now - 60,
            exp: now + 9 * 60,
            iss: self.app_id.clone(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }

    fn request(&self, builder: RequestBuilder, bearer: &str) -> RequestBuilder {
        builder
            .bearer_auth(bearer)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Installation ID of the app on organisation `owner`.
    pub async fn find_installation(&self, owner: &str) -> Result<u64> {
        let jwt = self.app_jwt()?;
        let mut url = Some(format!("{}/app/installations?per_page={PAGE_SIZE}", self.api_url));
        while let Some(page) = url.take() {
            let resp = self.request(self.http.get(&page), &jwt).send().await?;
            let resp = check(SERVICE, resp).await?;
            url = next_link(resp.headers());
            let installations: Vec<Installation> = resp.json().await?;
            if let Some(found) = installations
                .into_iter()
                .find(|i| i.target_type == "Organization" && i.account.login == owner)
            {
                return Ok(found.id);
            }
        }
        Err(ClientError::NoInstallation(owner.to_string()))
    }

    /// A valid installation token for `owner`, reusing a cached one until
    /// a minute before it expires.
    pub async fn installation_token(&self, owner: &str) -> Result<String> {
        let slot = self.token_slot(owner);
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(60) > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        let installation_id = self.find_installation(owner).await?;
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.api_url
        );
        let resp = self
            .request(self.http.post(&url), &self.app_jwt()?)
            .send()
            .await?;
        let token: InstallationToken = check(SERVICE, resp).await?.json().await?;
        tracing::debug!(owner, installation_id, expires_at = %token.expires_at, "minted installation token");
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn token_slot(&self, owner: &str) -> TokenSlot {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.entry(owner.to_string()).or_default().clone()
    }

    pub async fn create_repo(&self, repo: &NewRepository) -> Result<String> {
        let token = self.installation_token(&repo.owner).await?;
        let url = format!("{}/orgs/{}/repos", self.api_url, repo.owner);
        let body = CreateRepoRequest::empty(repo);
        tracing::info!(owner = %repo.owner, name = %repo.name, "creating GitHub repository");
        let resp = self
            .request(self.http.post(&url), &token)
            .json(&body)
            .send()
            .await?;
        let created: CreatedRepo = check(SERVICE, resp).await?.json().await?;
        Ok(created.html_url)
    }

    pub async fn repo_names(&self, owner: &str) -> Result<Vec<String>> {
        let token = self.installation_token(owner).await?;
        let mut names = Vec::new();
        let mut url = Some(format!(
            "{}/orgs/{owner}/repos?per_page={PAGE_SIZE}",
            self.api_url
        ));
        while let Some(page) = url.take() {
            let resp = self.request(self.http.get(&page), &token).send().await?;
            let resp = check(SERVICE, resp).await?;
            url = next_link(resp.headers());
            let repos: Vec<RepoSummary> = resp.json().await?;
            names.extend(repos.into_iter().map(|r| r.name));
        }
        Ok(names)
    }

    /// Login used in authenticated push URLs.
    fn push_username(&self) -> &str {
        self.username
            .strip_suffix("[bot]")
            .unwrap_or(&self.username)
    }
}

#[async_trait]
impl SourceHost for GitHubAppClient {
    async fn create_repository(
        &self,
        repo: &NewRepository,
    ) -> templatebot_core::Result<CreatedRepository> {
        self.create_repo(repo)
            .await
            .map(|html_url| CreatedRepository { html_url })
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn list_repositories(&self, owner: &str) -> templatebot_core::Result<Vec<String>> {
        self.repo_names(owner)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn push_credentials(&self, owner: &str) -> templatebot_core::Result<PushCredentials> {
        let token = self
            .installation_token(owner)
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(PushCredentials {
            username: self.push_username().to_string(),
            token,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
