//! The provisioning workflow: from a resolved template request to a pushed
//! repository.
//!
//! Stages run strictly in order and the recorded [`Stage`] only moves
//! forward. Failures before [`Stage::RepoCreated`] leave nothing behind;
//! failures after it are reported as partial, carrying the URL of the
//! repository that now exists. Docs registration is the one stage whose
//! failure is reported but does not stop the workflow, and it is only
//! recorded for templates that publish a documentation site. Nothing is
//! rolled back automatically.
//!
//! In hand-off mode the run stops once the repository exists and publishes
//! a [`RenderRequest`]; [`ProvisioningWorkflow::finish_render`] completes it.

use crate::author::{self, AUTHOR_ID_VAR};
use crate::catalog::TemplateDefinition;
use crate::collaborators::{
    AuthorDirectory, CommitIdentity, DocsHost, EventSink, MessageRef, NewRepository, Notification,
    Notifier, ProductRegistration, RenderEngine, SourceHost, WorkTree,
};
use crate::error::{Result, TemplatebotError};
use crate::event::{InteractionEvent, OutboundEvent, RenderRequest};
use crate::identity::{self, RepoIdentity};
use crate::variables::{self, ResolvedVariables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Initial commit";

// ---------------------------------------------------------------------------
// Stage / state
// ---------------------------------------------------------------------------

/// Last completed step of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    VariablesResolved,
    AuthorExpanded,
    IdentityAssigned,
    RepoCreated,
    DocsRegistered,
    Rendered,
    Pushed,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::VariablesResolved => "variables_resolved",
            Stage::AuthorExpanded => "author_expanded",
            Stage::IdentityAssigned => "identity_assigned",
            Stage::RepoCreated => "repo_created",
            Stage::DocsRegistered => "docs_registered",
            Stage::Rendered => "rendered",
            Stage::Pushed => "pushed",
            Stage::Done => "done",
        }
    }

    fn progress_text(&self) -> &'static str {
        match self {
            Stage::Received => "Getting started",
            Stage::VariablesResolved => "Checked your entries",
            Stage::AuthorExpanded => "Looked up author details",
            Stage::IdentityAssigned => "Chose the repository name",
            Stage::RepoCreated => "Created the GitHub repository",
            Stage::DocsRegistered => "Set up the documentation site",
            Stage::Rendered => "Rendered the template",
            Stage::Pushed => "Pushed the initial commit",
            Stage::Done => "Done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocsOutcome {
    NotApplicable,
    Registered { url: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningState {
    pub template_name: String,
    pub git_ref: String,
    pub stage: Stage,
    pub variables: ResolvedVariables,
    pub identity: Option<RepoIdentity>,
    pub repo_url: Option<String>,
    pub docs: DocsOutcome,
    /// Rendering was handed to another process through the event sink.
    pub handed_off: bool,
    pub started_at: DateTime<Utc>,
}

impl ProvisioningState {
    fn new(event: &InteractionEvent) -> Self {
        Self {
            template_name: event.template_name.clone(),
            git_ref: event.git_ref.clone(),
            stage: Stage::Received,
            variables: ResolvedVariables::new(),
            identity: None,
            repo_url: None,
            docs: DocsOutcome::NotApplicable,
            handed_off: false,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "stage moved backwards");
        tracing::info!(template = %self.template_name, stage = %stage, "provisioning stage complete");
        self.stage = stage;
    }
}

/// A run that stopped early. `repo_url` is set when a repository was
/// created before the failure.
#[derive(Debug, Error)]
#[error("provisioning stopped after {stage}: {source}")]
pub struct ProvisioningFailure {
    pub stage: Stage,
    pub repo_url: Option<String>,
    #[source]
    pub source: TemplatebotError,
}

impl ProvisioningFailure {
    pub fn before_start(source: TemplatebotError) -> Self {
        Self {
            stage: Stage::Received,
            repo_url: None,
            source,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.repo_url.is_some()
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Every external service the workflow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source_host: Arc<dyn SourceHost>,
    pub docs_host: Arc<dyn DocsHost>,
    pub authors: Arc<dyn AuthorDirectory>,
    pub work_tree: Arc<dyn WorkTree>,
    pub renderer: Arc<dyn RenderEngine>,
    pub notifier: Arc<dyn Notifier>,
    /// When set, rendering is handed off through this sink after the
    /// repository exists instead of running in-process.
    pub render_handoff: Option<Arc<dyn EventSink>>,
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub commit_identity: CommitIdentity,
    pub commit_message: String,
    pub default_branch: String,
    /// Parent directory for scratch render trees; system temp if unset.
    pub work_root: Option<PathBuf>,
}

impl WorkflowSettings {
    pub fn new(commit_identity: CommitIdentity, default_branch: impl Into<String>) -> Self {
        Self {
            commit_identity,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            default_branch: default_branch.into(),
            work_root: None,
        }
    }
}

/// Commit identity of a GitHub App bot account.
pub fn bot_identity(app_id: &str, username: &str) -> CommitIdentity {
    let login = username.strip_suffix("[bot]").unwrap_or(username);
    CommitIdentity {
        name: username.to_string(),
        email: format!("{app_id}+{login}[bot]@users.noreply.github.com"),
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Edits the message that triggered the request as the run progresses.
///
/// Notification failures are logged and never change the run's outcome.
pub(crate) struct Progress {
    notifier: Arc<dyn Notifier>,
    channel: Option<String>,
    message: Option<MessageRef>,
}

impl Progress {
    pub(crate) fn new(notifier: Arc<dyn Notifier>, event: &InteractionEvent) -> Self {
        Self::to(
            notifier,
            event.trigger_channel.clone(),
            event.trigger_message.clone(),
        )
    }

    pub(crate) fn to(
        notifier: Arc<dyn Notifier>,
        channel: Option<String>,
        message: Option<MessageRef>,
    ) -> Self {
        Self {
            notifier,
            channel,
            message,
        }
    }

    pub(crate) async fn say(&mut self, text: String) {
        let Some(channel) = self.channel.as_deref() else {
            tracing::debug!(text = %text, "no channel to report progress to");
            return;
        };
        let notification = Notification::text(text);
        let result = match &self.message {
            Some(message) => {
                self.notifier
                    .update_message(channel, message, &notification)
                    .await
            }
            None => self
                .notifier
                .post_message(channel, &notification)
                .await
                .map(|m| self.message = Some(m)),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, channel, "failed to send progress notification");
        }
    }
}

fn success_text(template: &TemplateDefinition, state: &ProvisioningState) -> String {
    let url = state.repo_url.as_deref().unwrap_or_default();
    let mut text = if state.handed_off {
        format!(
            "Created {url} from the *{}* template. The first commit is being rendered and will appear shortly.",
            template.display_name
        )
    } else {
        format!(
            "Your new project is ready: {url} (from the *{}* template).",
            template.display_name
        )
    };
    match &state.docs {
        DocsOutcome::NotApplicable => {}
        DocsOutcome::Registered { url } => {
            text.push_str(&format!(
                "\nDocumentation will be published at {url} after the first build."
            ));
        }
        DocsOutcome::Failed { reason } => {
            text.push_str(&format!(
                "\n:warning: The repository is fine, but registering its documentation site failed: {reason}"
            ));
        }
    }
    text
}

pub(crate) fn failure_text(template_name: &str, failure: &ProvisioningFailure) -> String {
    match &failure.repo_url {
        Some(url) => format!(
            ":warning: Created {url}, but provisioning stopped after the {} step: {}\n\
             The repository exists and may be incomplete. Nothing has been deleted.",
            failure.stage, failure.source
        ),
        None if failure.source.is_user_correctable() => format!(
            "Couldn't create a project from the *{template_name}* template: {}\n\
             Nothing was created. Fix the entry and try again.",
            failure.source
        ),
        None => format!(
            "Couldn't create a project from the *{template_name}* template: {}\n\
             Nothing was created.",
            failure.source
        ),
    }
}

// ---------------------------------------------------------------------------
// ProvisioningWorkflow
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ProvisioningWorkflow {
    collaborators: Collaborators,
    settings: WorkflowSettings,
}

impl ProvisioningWorkflow {
    pub fn new(collaborators: Collaborators, settings: WorkflowSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Provision a project from `template` as requested by `event`.
    pub async fn run(
        &self,
        template: &TemplateDefinition,
        event: &InteractionEvent,
    ) -> std::result::Result<ProvisioningState, ProvisioningFailure> {
        let mut progress = Progress::new(self.collaborators.notifier.clone(), event);
        let mut state = ProvisioningState::new(event);
        progress
            .say(format!(
                "Creating a project from the *{}* template…",
                template.display_name
            ))
            .await;

        match self.execute(template, event, &mut state, &mut progress).await {
            Ok(()) => {
                progress.say(success_text(template, &state)).await;
                Ok(state)
            }
            Err(source) => {
                let failure = ProvisioningFailure {
                    stage: state.stage,
                    repo_url: state.repo_url.clone(),
                    source,
                };
                tracing::warn!(
                    template = %template.name,
                    stage = %failure.stage,
                    partial = failure.is_partial(),
                    error = %failure.source,
                    "provisioning failed"
                );
                progress.say(failure_text(&template.display_name, &failure)).await;
                Err(failure)
            }
        }
    }

    async fn execute(
        &self,
        template: &TemplateDefinition,
        event: &InteractionEvent,
        state: &mut ProvisioningState,
        progress: &mut Progress,
    ) -> Result<()> {
        let c = &self.collaborators;
        let step = |state: &ProvisioningState| {
            let name = state
                .identity
                .as_ref()
                .map(|id| format!(" `{}`", id.full_name()))
                .unwrap_or_default();
            format!(
                "Creating{name} from the *{}* template… {}",
                template.display_name,
                state.stage.progress_text()
            )
        };

        state.variables = variables::resolve(template, &event.raw_submission)?;
        state.advance(Stage::VariablesResolved);
        progress.say(step(state)).await;

        let author_id = state
            .variables
            .get(AUTHOR_ID_VAR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(author_id) = author_id {
            let found = c.authors.get_author(&author_id).await?;
            author::expand_into(&found, &mut state.variables);
        }
        state.advance(Stage::AuthorExpanded);
        progress.say(step(state)).await;

        let identity =
            identity::derive(template, &mut state.variables, c.source_host.as_ref()).await?;
        state.identity = Some(identity.clone());
        state.advance(Stage::IdentityAssigned);
        progress.say(step(state)).await;

        let created = c
            .source_host
            .create_repository(&NewRepository {
                owner: identity.owner.clone(),
                name: identity.name.clone(),
                homepage: identity.homepage.clone(),
                description: identity.description.clone(),
            })
            .await?;
        let repo_url = created.html_url;
        state.repo_url = Some(repo_url.clone());
        state.advance(Stage::RepoCreated);
        progress.say(step(state)).await;

        if let Some(plan) = &identity.docs {
            let registration = ProductRegistration {
                slug: plan.slug.clone(),
                title: plan.title.clone(),
                repo_url: repo_url.clone(),
                tracking_mode: plan.tracking_mode,
            };
            match c.docs_host.register_product(&registration).await {
                Ok(product) => {
                    state.docs = DocsOutcome::Registered {
                        url: product.published_url,
                    };
                    state.advance(Stage::DocsRegistered);
                    progress.say(step(state)).await;
                }
                Err(e) => {
                    tracing::warn!(slug = %plan.slug, error = %e, "docs registration failed");
                    state.docs = DocsOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        if let Some(sink) = &c.render_handoff {
            let request = RenderRequest {
                template_name: template.name.clone(),
                git_ref: event.git_ref.clone(),
                variables: state.variables.clone(),
                repo_url: repo_url.clone(),
                owner: identity.owner.clone(),
                repo_name: identity.name.clone(),
                trigger_channel: progress.channel.clone(),
                trigger_message: progress.message.clone(),
            };
            sink.publish(&OutboundEvent::RenderRequested(request)).await?;
            state.handed_off = true;
            return Ok(());
        }

        let scratch = self.scratch_dir()?;
        let tree = c
            .renderer
            .render(template, &state.variables, scratch.path())
            .await?;
        state.advance(Stage::Rendered);
        progress.say(step(state)).await;

        self.push(&tree, &identity.owner, &repo_url).await?;
        state.advance(Stage::Pushed);

        state.advance(Stage::Done);
        tracing::info!(
            repo = %identity.full_name(),
            elapsed_ms = (Utc::now() - state.started_at).num_milliseconds(),
            "provisioning complete"
        );
        Ok(())
    }

    /// Render and push a repository that a hand-off run already created.
    ///
    /// Every failure here is partial: the repository in `request` exists.
    pub async fn finish_render(
        &self,
        template: &TemplateDefinition,
        request: &RenderRequest,
    ) -> std::result::Result<(), ProvisioningFailure> {
        let mut progress = Progress::to(
            self.collaborators.notifier.clone(),
            request.trigger_channel.clone(),
            request.trigger_message.clone(),
        );
        progress
            .say(format!(
                "Rendering the first commit of {} from the *{}* template…",
                request.repo_url, template.display_name
            ))
            .await;

        let mut stage = Stage::RepoCreated;
        match self.render_and_push(template, request, &mut stage).await {
            Ok(()) => {
                tracing::info!(
                    repo = %format!("{}/{}", request.owner, request.repo_name),
                    "hand-off render complete"
                );
                progress
                    .say(format!(
                        "Your new project is ready: {} (from the *{}* template).",
                        request.repo_url, template.display_name
                    ))
                    .await;
                Ok(())
            }
            Err(source) => {
                let failure = ProvisioningFailure {
                    stage,
                    repo_url: Some(request.repo_url.clone()),
                    source,
                };
                tracing::warn!(
                    template = %template.name,
                    stage = %failure.stage,
                    error = %failure.source,
                    "hand-off render failed"
                );
                progress.say(failure_text(&template.display_name, &failure)).await;
                Err(failure)
            }
        }
    }

    async fn render_and_push(
        &self,
        template: &TemplateDefinition,
        request: &RenderRequest,
        stage: &mut Stage,
    ) -> Result<()> {
        let scratch = self.scratch_dir()?;
        let tree = self
            .collaborators
            .renderer
            .render(template, &request.variables, scratch.path())
            .await?;
        *stage = Stage::Rendered;
        self.push(&tree, &request.owner, &request.repo_url).await?;
        *stage = Stage::Done;
        Ok(())
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("templatebot-render-");
        let dir = match &self.settings.work_root {
            Some(root) => {
                crate::io::ensure_dir(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Commit `tree` and push it as the default branch of `repo_url`.
    ///
    /// The credential-bearing remote is removed whatever the push outcome.
    async fn push(&self, tree: &Path, owner: &str, repo_url: &str) -> Result<()> {
        let c = &self.collaborators;
        let branch = self.settings.default_branch.as_str();

        let repo = c.work_tree.init_repo(tree, branch).await?;
        c.work_tree
            .commit(&repo, &self.settings.commit_message, &self.settings.commit_identity)
            .await?;
        let credentials = c.source_host.push_credentials(owner).await?;
        let remote = c
            .work_tree
            .add_authenticated_remote(&repo, repo_url, &credentials)
            .await?;

        let pushed = c.work_tree.push(&repo, &remote, branch).await;
        if let Err(e) = c.work_tree.remove_remote(&repo, &remote).await {
            tracing::warn!(remote = %remote.name, error = %e, "failed to remove temporary remote");
        }
        pushed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
