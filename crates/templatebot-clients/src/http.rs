//! Shared HTTP plumbing.

use crate::error::{ClientError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("templatebot/", env!("CARGO_PKG_VERSION"));

/// The process-wide HTTP client handed to every service client.
pub fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// Pass 2xx responses through; turn anything else into [`ClientError::Status`].
pub(crate) async fn check(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Target of the `rel="next"` entry in an RFC 8288 `Link` header.
pub(crate) fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let url = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        url.strip_prefix('<')
            .and_then(|u| u.strip_suffix('>'))
            .map(str::to_string)
    })
}
