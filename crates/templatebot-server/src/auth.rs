//! Shared-token gate for the `/events` routes.
//!
//! Relayed events skip Slack request signing, so they carry their own
//! credential: `Authorization: Bearer <events_token>`.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Compares digests so the time taken does not depend on the token.
fn tokens_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Middleware for the `/events` routes.
///
/// 1. `events_token` set → the request must present it as a bearer token.
/// 2. No token but a Slack signing secret → the deployment is meant to be
///    authenticated, so every request is rejected.
/// 3. Neither configured (local development) → passthrough.
pub async fn require_event_token(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = match (&app.events_token, &app.signing_secret) {
        (Some(token), _) => token,
        (None, None) => return Ok(next.run(req).await),
        (None, Some(_)) => {
            tracing::warn!(uri = %req.uri(), "rejected event: events_token is not configured");
            return Err(AppError::unauthorized("event relay is not enabled"));
        }
    };

    match bearer(req.headers()) {
        Some(presented) if tokens_match(presented, expected.expose()) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(uri = %req.uri(), "rejected event: bearer token does not match");
            Err(AppError::unauthorized("bearer token does not match"))
        }
        None => {
            tracing::warn!(uri = %req.uri(), "rejected event: no bearer token");
            Err(AppError::unauthorized("missing bearer token"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer relay "));
        assert_eq!(bearer(&headers), Some("relay"));
    }

    #[test]
    fn tokens_compare_exactly() {
        assert!(tokens_match("relay", "relay"));
        assert!(!tokens_match("relay", "relay2"));
        assert!(!tokens_match("", "relay"));
    }
}
