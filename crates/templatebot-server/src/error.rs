use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use templatebot_core::error::{ErrorCategory, TemplatebotError};

// ---------------------------------------------------------------------------
// Internal sentinels for explicit statuses
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Carries an explicit HTTP 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

fn status_for(err: &TemplatebotError) -> StatusCode {
    match err {
        TemplatebotError::RefNotFound(_) => StatusCode::NOT_FOUND,
        TemplatebotError::CloneFailed { .. } => StatusCode::BAD_GATEWAY,
        TemplatebotError::ToolNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        other => match other.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Lookup => StatusCode::NOT_FOUND,
            ErrorCategory::Transport => StatusCode::BAD_GATEWAY,
            ErrorCategory::Cache | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<UnauthorizedError>().is_some() {
            StatusCode::UNAUTHORIZED
        } else if let Some(e) = self.0.downcast_ref::<TemplatebotError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: TemplatebotError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn template_not_found_maps_to_404() {
        assert_eq!(
            status(TemplatebotError::TemplateNotFound("nope".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn deleted_ref_maps_to_404() {
        assert_eq!(
            status(TemplatebotError::RefNotFound("tickets/DM-1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            status(TemplatebotError::MissingVariable("title".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(TemplatebotError::InvalidHandle("SQR".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn clone_failure_maps_to_502() {
        let err = TemplatebotError::CloneFailed {
            git_ref: "main".into(),
            reason: "network unreachable".into(),
        };
        assert_eq!(status(err), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn transport_maps_to_502() {
        assert_eq!(
            status(TemplatebotError::transport("github", "timeout")),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn io_error_maps_to_500() {
        let err = TemplatebotError::Io(std::io::Error::other("disk full"));
        assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn sentinels_keep_their_status() {
        assert_eq!(
            AppError::bad_request("no payload").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("bad signature").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
