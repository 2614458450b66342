use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use templatebot_clients::{
    build_client, AuthorDbClient, GitHubAppClient, LtdClient, SlackClient, WebhookSink,
};
use templatebot_core::collaborators::{DocsHost, DocsProduct, EventSink, ProductRegistration};
use templatebot_core::config::{Config, Secret};
use templatebot_core::event::{InteractionEvent, RenderRequest};
use templatebot_core::git::GitCli;
use templatebot_core::render::CookiecutterRenderer;
use templatebot_core::repo_cache::RepoCache;
use templatebot_core::service::{Handled, TemplateService};
use templatebot_core::workflow::{bot_identity, Collaborators, ProvisioningWorkflow, WorkflowSettings};
use templatebot_core::TemplatebotError;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// How long shutdown waits for in-flight requests before giving up on them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: TemplateService,
    /// Ref used when a request does not name one.
    pub default_ref: String,
    /// Slack signing secret; interaction requests are unverified when unset.
    pub signing_secret: Option<Secret>,
    /// Bearer token for the `/events` routes.
    pub events_token: Option<Secret>,
    /// Background request handlers; shutdown waits on these before the
    /// template cache is purged.
    pub tasks: TaskTracker,
    pub shutdown_grace: Duration,
}

impl AppState {
    pub fn new(service: TemplateService, default_ref: impl Into<String>) -> Self {
        Self {
            service,
            default_ref: default_ref.into(),
            signing_secret: None,
            events_token: None,
            tasks: TaskTracker::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_signing_secret(mut self, secret: Secret) -> Self {
        self.signing_secret = Some(secret);
        self
    }

    pub fn with_events_token(mut self, token: Secret) -> Self {
        self.events_token = Some(token);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn cache(&self) -> &Arc<RepoCache> {
        self.service.cache()
    }

    /// Wire the production collaborators from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let app_id = config
            .github_app_id
            .as_deref()
            .context("github_app_id is required")?;
        let private_key = config
            .github_app_private_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .context("github_app_private_key is required")?;
        let slack_token = config
            .slack_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("slack_token is required")?;

        let http = build_client()?;
        let github = GitHubAppClient::new(
            http.clone(),
            &config.github_api_url,
            app_id,
            private_key.expose(),
            &config.github_username,
        )
        .context("loading GitHub App private key")?;

        let docs_host: Arc<dyn DocsHost> = match (&config.ltd_username, &config.ltd_password) {
            (Some(user), Some(password)) => Arc::new(LtdClient::new(
                http.clone(),
                &config.ltd_api_url,
                user,
                password.clone(),
            )),
            _ => Arc::new(UnconfiguredDocsHost),
        };

        let render_handoff = config
            .render_webhook_url
            .as_deref()
            .map(|url| {
                WebhookSink::new(http.clone(), url).map(|sink| {
                    let sink = match config.render_webhook_token.as_ref().filter(|t| !t.is_empty()) {
                        Some(token) => sink.with_bearer_token(token.expose()),
                        None => sink,
                    };
                    Arc::new(sink) as Arc<dyn EventSink>
                })
            })
            .transpose()
            .context("configuring render webhook")?;

        let git = Arc::new(GitCli::new());
        let collaborators = Collaborators {
            source_host: Arc::new(github),
            docs_host,
            authors: Arc::new(AuthorDbClient::new(http.clone(), &config.author_api_url)),
            work_tree: git.clone(),
            renderer: Arc::new(CookiecutterRenderer::new()),
            notifier: Arc::new(SlackClient::new(http, slack_token)),
            render_handoff,
        };
        let settings = WorkflowSettings::new(
            bot_identity(app_id, &config.github_username),
            &config.default_branch,
        );

        let cache = Arc::new(RepoCache::new(
            &config.template_repo_url,
            config.cache_dir(),
            git,
        ));
        let service = TemplateService::new(cache, ProvisioningWorkflow::new(collaborators, settings));

        let mut state = Self::new(service, &config.template_repo_ref);
        state.signing_secret = config.slack_signing_secret.clone().filter(|s| !s.is_empty());
        if state.signing_secret.is_none() {
            tracing::warn!("slack_signing_secret not set; Slack requests will not be verified");
        }
        state.events_token = config.events_token.clone().filter(|t| !t.is_empty());
        Ok(state)
    }

    /// Handle `event` in the background; the outcome is reported to the user
    /// through the notifier and logged here.
    pub fn dispatch(&self, event: InteractionEvent) -> JoinHandle<()> {
        let service = self.service.clone();
        self.tasks.spawn(async move {
            match service.handle(&event).await {
                Ok(Handled::Project(state)) => tracing::info!(
                    template = %event.template_name,
                    repo = state.repo_url.as_deref().unwrap_or("-"),
                    "project request handled"
                ),
                Ok(Handled::File { template_name }) => {
                    tracing::info!(template = %template_name, "file request acknowledged")
                }
                Err(failure) => tracing::warn!(
                    template = %event.template_name,
                    stage = %failure.stage,
                    partial = failure.is_partial(),
                    "request failed: {}",
                    failure.source
                ),
            }
        })
    }

    /// Finish a handed-off render in the background.
    pub fn dispatch_render(&self, request: RenderRequest) -> JoinHandle<()> {
        let service = self.service.clone();
        self.tasks.spawn(async move {
            match service.handle_render(&request).await {
                Ok(()) => tracing::info!(
                    template = %request.template_name,
                    repo = %request.repo_url,
                    "render request handled"
                ),
                Err(failure) => tracing::warn!(
                    template = %request.template_name,
                    repo = %request.repo_url,
                    stage = %failure.stage,
                    "render request failed: {}",
                    failure.source
                ),
            }
        })
    }
}

/// Docs host used when no LTD credentials are configured. Registration
/// fails, which the workflow reports without aborting.
#[derive(Debug)]
struct UnconfiguredDocsHost;

#[async_trait]
impl DocsHost for UnconfiguredDocsHost {
    async fn register_product(
        &self,
        product: &ProductRegistration,
    ) -> templatebot_core::Result<DocsProduct> {
        Err(TemplatebotError::Config(format!(
            "LTD credentials are not configured; cannot register '{}'",
            product.slug
        )))
    }
}
