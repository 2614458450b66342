//! Entry point for interaction events: looks the template up in the cache
//! and dispatches to the provisioning workflow. Render requests handed off
//! by another instance come in through [`TemplateService::handle_render`].

use crate::catalog::{TemplateDefinition, TemplateKind};
use crate::event::{InteractionEvent, RenderRequest};
use crate::repo_cache::RepoCache;
use crate::workflow::{
    failure_text, Progress, ProvisioningFailure, ProvisioningState, ProvisioningWorkflow, Stage,
};
use std::sync::Arc;

#[derive(Debug)]
pub enum Handled {
    Project(Box<ProvisioningState>),
    /// A file template request, acknowledged to the user.
    File { template_name: String },
}

#[derive(Clone)]
pub struct TemplateService {
    cache: Arc<RepoCache>,
    workflow: ProvisioningWorkflow,
}

impl TemplateService {
    pub fn new(cache: Arc<RepoCache>, workflow: ProvisioningWorkflow) -> Self {
        Self { cache, workflow }
    }

    pub fn cache(&self) -> &Arc<RepoCache> {
        &self.cache
    }

    pub async fn handle(&self, event: &InteractionEvent) -> Result<Handled, ProvisioningFailure> {
        let mut progress = Progress::new(self.workflow.collaborators().notifier.clone(), event);

        let template = match self.lookup(&event.git_ref, &event.template_name).await {
            Ok(template) => template,
            Err(failure) => {
                tracing::warn!(
                    template = %event.template_name,
                    git_ref = %event.git_ref,
                    error = %failure.source,
                    "template lookup failed"
                );
                progress
                    .say(failure_text(&event.template_name, &failure))
                    .await;
                return Err(failure);
            }
        };

        match template.kind {
            TemplateKind::Project => {
                let state = self.workflow.run(&template, event).await?;
                Ok(Handled::Project(Box::new(state)))
            }
            TemplateKind::File => {
                let text = if template.is_configurable() {
                    format!("Creating a file from the *{}* template.", template.display_name)
                } else {
                    format!(
                        "The *{}* template does not require configuration.",
                        template.display_name
                    )
                };
                progress.say(text).await;
                Ok(Handled::File {
                    template_name: template.name,
                })
            }
        }
    }

    /// Render and push a repository created by a hand-off run.
    pub async fn handle_render(&self, request: &RenderRequest) -> Result<(), ProvisioningFailure> {
        let template = match self.lookup(&request.git_ref, &request.template_name).await {
            Ok(template) => template,
            Err(failure) => {
                let failure = ProvisioningFailure {
                    stage: Stage::RepoCreated,
                    repo_url: Some(request.repo_url.clone()),
                    source: failure.source,
                };
                tracing::warn!(
                    template = %request.template_name,
                    repo_url = %request.repo_url,
                    error = %failure.source,
                    "template lookup for hand-off render failed"
                );
                Progress::to(
                    self.workflow.collaborators().notifier.clone(),
                    request.trigger_channel.clone(),
                    request.trigger_message.clone(),
                )
                .say(failure_text(&request.template_name, &failure))
                .await;
                return Err(failure);
            }
        };
        self.workflow.finish_render(&template, request).await
    }

    async fn lookup(&self, git_ref: &str, name: &str) -> Result<TemplateDefinition, ProvisioningFailure> {
        let (checkout, template) = self
            .cache
            .template(git_ref, name)
            .await
            .map_err(ProvisioningFailure::before_start)?;
        tracing::debug!(
            template = %template.name,
            commit = %checkout.commit,
            "resolved template"
        );
        Ok(template)
    }
}
