//! Interfaces to the services the provisioning workflow drives.
//!
//! Implementations backed by real services live in `templatebot-clients`
//! (HTTP APIs) and in [`crate::git`] / [`crate::render`] (local tools).

use crate::author::Author;
use crate::catalog::TemplateDefinition;
use crate::error::Result;
use crate::event::OutboundEvent;
use crate::variables::ResolvedVariables;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Source hosting (GitHub)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepository {
    pub owner: String,
    pub name: String,
    pub homepage: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedRepository {
    pub html_url: String,
}

/// Username/token pair embedded in a push URL.
#[derive(Clone, PartialEq)]
pub struct PushCredentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredentials")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Create an empty repository (no initial commit).
    async fn create_repository(&self, repo: &NewRepository) -> Result<CreatedRepository>;

    /// Names of every repository owned by `owner`.
    async fn list_repositories(&self, owner: &str) -> Result<Vec<String>>;

    /// Credentials that can push to repositories of `owner`.
    async fn push_credentials(&self, owner: &str) -> Result<PushCredentials>;
}

// ---------------------------------------------------------------------------
// Documentation hosting (LSST the Docs)
// ---------------------------------------------------------------------------

/// How the docs host picks the build shown as the default edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Follow the default branch.
    GitRefs,
    /// Follow the newest semantic version tag.
    LsstDoc,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::GitRefs => "git_refs",
            TrackingMode::LsstDoc => "lsst_doc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRegistration {
    pub slug: String,
    pub title: String,
    pub repo_url: String,
    pub tracking_mode: TrackingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsProduct {
    pub slug: String,
    /// Public URL of the product's default edition.
    pub published_url: String,
}

#[async_trait]
pub trait DocsHost: Send + Sync {
    async fn register_product(&self, product: &ProductRegistration) -> Result<DocsProduct>;
}

// ---------------------------------------------------------------------------
// Author directory
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AuthorDirectory: Send + Sync {
    /// Fails with [`crate::TemplatebotError::AuthorNotFound`] for unknown IDs.
    async fn get_author(&self, author_id: &str) -> Result<Author>;
}

// ---------------------------------------------------------------------------
// Version control working tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait WorkTree: Send + Sync {
    /// Initialise a repository in `path` with every file staged.
    async fn init_repo(&self, path: &Path, default_branch: &str) -> Result<RepoHandle>;

    async fn commit(&self, repo: &RepoHandle, message: &str, author: &CommitIdentity) -> Result<()>;

    async fn add_authenticated_remote(
        &self,
        repo: &RepoHandle,
        url: &str,
        credentials: &PushCredentials,
    ) -> Result<RemoteHandle>;

    async fn push(&self, repo: &RepoHandle, remote: &RemoteHandle, branch: &str) -> Result<()>;

    async fn remove_remote(&self, repo: &RepoHandle, remote: &RemoteHandle) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Render `template` with `vars` somewhere under `output_root`, returning
    /// the root of the generated tree.
    async fn render(
        &self,
        template: &TemplateDefinition,
        vars: &ResolvedVariables,
        output_root: &Path,
    ) -> Result<PathBuf>;
}

// ---------------------------------------------------------------------------
// Interaction notifications (Slack)
// ---------------------------------------------------------------------------

/// Identifies a posted message (Slack's message `ts`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message content. `blocks` is passed through to the transport untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_message(&self, channel: &str, message: &Notification) -> Result<MessageRef>;

    async fn update_message(
        &self,
        channel: &str,
        message_ref: &MessageRef,
        message: &Notification,
    ) -> Result<()>;

    async fn open_modal(&self, trigger_id: &str, modal: &serde_json::Value) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Event transport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &OutboundEvent) -> Result<()>;
}
