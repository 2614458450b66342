//! Slack request signing (`v0` scheme).
//!
//! Slack signs `v0:{timestamp}:{raw body}` with HMAC-SHA256 keyed by the
//! app's signing secret and sends `v0=<hex digest>` in `X-Slack-Signature`.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::error::AppError;
use crate::state::AppState;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Requests older (or newer) than this are rejected as replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const VERSION: &str = "v0";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("request timestamp is malformed")]
    BadTimestamp,
    #[error("request timestamp is outside the allowed window")]
    Stale,
    #[error("signature does not match")]
    Mismatch,
}

fn mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(format!("{VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Signature header value for `body` sent at `timestamp`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{VERSION}={}", hex::encode(digest)))
}

/// Check `signature` against `body`, rejecting timestamps more than
/// [`MAX_CLOCK_SKEW_SECS`] away from `now` (unix seconds).
pub fn verify(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let sent: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if (now - sent).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }
    let expected = signature
        .strip_prefix("v0=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(SignatureError::Mismatch)?;
    mac(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

/// Middleware rejecting unsigned or mis-signed requests with 401. A no-op
/// when no signing secret is configured.
pub async fn require_slack_signature(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = app.signing_secret.clone() else {
        return Ok(next.run(req).await);
    };

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::bad_request(format!("unreadable request body: {e}")))?;

    let checked = header(&parts.headers, TIMESTAMP_HEADER).and_then(|ts| {
        let sig = header(&parts.headers, SIGNATURE_HEADER)?;
        verify(
            secret.expose(),
            ts,
            sig,
            &bytes,
            chrono::Utc::now().timestamp(),
        )
    });
    if let Err(e) = checked {
        tracing::warn!(uri = %parts.uri, "rejected Slack request: {e}");
        return Err(AppError::unauthorized(e.to_string()));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"payload=%7B%22type%22%3A%22view_submission%22%7D";

    #[test]
    fn signed_body_verifies() {
        let sig = sign(SECRET, "1531420618", BODY).unwrap();
        assert!(sig.starts_with("v0="));
        assert_eq!(sig.len(), 3 + 64);
        assert_eq!(verify(SECRET, "1531420618", &sig, BODY, 1531420618 + 10), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = sign(SECRET, "1531420618", BODY).unwrap();
        assert_eq!(
            verify(SECRET, "1531420618", &sig, b"payload=other", 1531420618),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sig = sign("another-secret", "1531420618", BODY).unwrap();
        assert_eq!(
            verify(SECRET, "1531420618", &sig, BODY, 1531420618),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn replayed_requests_are_stale() {
        let sig = sign(SECRET, "1531420618", BODY).unwrap();
        assert_eq!(
            verify(SECRET, "1531420618", &sig, BODY, 1531420618 + MAX_CLOCK_SKEW_SECS + 1),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn malformed_inputs() {
        assert_eq!(
            verify(SECRET, "yesterday", "v0=00", BODY, 0),
            Err(SignatureError::BadTimestamp)
        );
        assert_eq!(
            verify(SECRET, "100", "v1=abcd", BODY, 100),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(SECRET, "100", "v0=not-hex", BODY, 100),
            Err(SignatureError::Mismatch)
        );
    }
}
