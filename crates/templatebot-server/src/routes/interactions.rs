use axum::extract::State;
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::Deserialize;
use templatebot_core::event::{InteractionEvent, OutboundEvent, ViewSubmission};

use crate::error::AppError;
use crate::state::AppState;

/// Slack posts interactions as a form with a single JSON `payload` field.
#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    payload: String,
}

/// POST /slack/interactions: Slack interactivity endpoint.
///
/// Template dialog submissions are acknowledged with an empty 200 (which
/// closes the modal) and handled in the background. Other interaction types
/// are acknowledged and ignored.
pub async fn slack_interaction(
    State(app): State<AppState>,
    Form(form): Form<InteractionForm>,
) -> Result<StatusCode, AppError> {
    let payload: serde_json::Value = serde_json::from_str(&form.payload)
        .map_err(|e| AppError::bad_request(format!("malformed interaction payload: {e}")))?;

    match payload.get("type").and_then(|t| t.as_str()) {
        Some("view_submission") => {
            let submission: ViewSubmission = serde_json::from_value(payload)
                .map_err(|e| AppError::bad_request(format!("malformed view submission: {e}")))?;
            let event = InteractionEvent::from_view_submission(&submission)?;
            tracing::info!(
                template = %event.template_name,
                git_ref = %event.git_ref,
                user = %event.requesting_user,
                "template dialog submitted"
            );
            app.dispatch(event);
            Ok(StatusCode::OK)
        }
        Some(other) => {
            tracing::debug!(kind = other, "ignoring interaction");
            Ok(StatusCode::OK)
        }
        None => Err(AppError::bad_request("interaction payload has no type")),
    }
}

/// POST /events: an already-decoded interaction event, as relayed by
/// another front end. Handled in the background.
pub async fn post_event(
    State(app): State<AppState>,
    Json(event): Json<InteractionEvent>,
) -> (StatusCode, Json<serde_json::Value>) {
    tracing::info!(template = %event.template_name, git_ref = %event.git_ref, "event received");
    app.dispatch(event);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}

/// POST /events/render: a render request handed off by an instance that
/// created the repository. Rendered and pushed in the background.
pub async fn post_render(
    State(app): State<AppState>,
    Json(event): Json<OutboundEvent>,
) -> (StatusCode, Json<serde_json::Value>) {
    let OutboundEvent::RenderRequested(request) = event;
    tracing::info!(
        template = %request.template_name,
        repo = %request.repo_url,
        "render request received"
    );
    app.dispatch_render(request);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}
