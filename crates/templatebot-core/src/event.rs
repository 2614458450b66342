//! Inbound interaction events and outbound notifications of completed work.
//!
//! The interaction layer (Slack) delivers a modal submission as a view
//! payload; [`InteractionEvent::from_view_submission`] turns that into the
//! transport-neutral event the provisioning service consumes.

use crate::catalog::TemplateKind;
use crate::collaborators::MessageRef;
use crate::error::{Result, TemplatebotError};
use crate::variables::{RawSubmission, ResolvedVariables};
use serde::{Deserialize, Serialize};

/// A user's completed template request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub kind: TemplateKind,
    pub template_name: String,
    pub git_ref: String,
    /// Template repository the modal was built from.
    #[serde(default)]
    pub repo_url: Option<String>,
    pub raw_submission: RawSubmission,
    #[serde(default)]
    pub trigger_channel: Option<String>,
    #[serde(default)]
    pub trigger_message: Option<MessageRef>,
    pub requesting_user: String,
}

// ---------------------------------------------------------------------------
// Slack view submissions
// ---------------------------------------------------------------------------

/// State carried through a template dialog in the view's `private_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalMetadata {
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub template_name: String,
    pub git_ref: String,
    pub repo_url: String,
    #[serde(default)]
    pub trigger_message_ts: Option<String>,
    #[serde(default)]
    pub trigger_channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSubmission {
    pub user: SlackUser,
    pub view: SlackView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackView {
    #[serde(default)]
    pub callback_id: Option<String>,
    pub private_metadata: String,
    pub state: serde_json::Value,
}

/// Flatten `view.state.values` into `action_id -> value`.
///
/// Text inputs contribute their `value`, selects their `selected_option`
/// value; either may be null when an optional field was left empty. Other
/// element types are skipped.
pub fn modal_values(state: &serde_json::Value) -> RawSubmission {
    let mut values = RawSubmission::new();
    let Some(blocks) = state.get("values").and_then(|v| v.as_object()) else {
        return values;
    };
    for actions in blocks.values() {
        let Some(actions) = actions.as_object() else {
            continue;
        };
        for (action_id, element) in actions {
            let value = match element.get("type").and_then(|t| t.as_str()) {
                Some("plain_text_input") => element.get("value"),
                Some("static_select") => element.get("selected_option").and_then(|o| o.get("value")),
                other => {
                    tracing::warn!(action_id, element_type = ?other, "unsupported element in template dialog");
                    continue;
                }
            };
            values.insert(
                action_id.clone(),
                value.and_then(|v| v.as_str()).map(str::to_string),
            );
        }
    }
    values
}

impl InteractionEvent {
    pub fn from_view_submission(submission: &ViewSubmission) -> Result<Self> {
        let meta: ModalMetadata = serde_json::from_str(&submission.view.private_metadata)
            .map_err(|e| TemplatebotError::InvalidVariable {
                key: "private_metadata".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            kind: meta.kind,
            template_name: meta.template_name,
            git_ref: meta.git_ref,
            repo_url: Some(meta.repo_url),
            raw_submission: modal_values(&submission.view.state),
            trigger_channel: meta.trigger_channel_id,
            trigger_message: meta.trigger_message_ts.map(MessageRef),
            requesting_user: submission.user.id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A repository that exists and is waiting for its first commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub template_name: String,
    pub git_ref: String,
    pub variables: ResolvedVariables,
    pub repo_url: String,
    pub owner: String,
    pub repo_name: String,
    /// Where the originating request reports progress.
    #[serde(default)]
    pub trigger_channel: Option<String>,
    #[serde(default)]
    pub trigger_message: Option<MessageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    RenderRequested(RenderRequest),
}
