use templatebot_core::TemplatebotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} has no {what}")]
    NotFound { service: &'static str, what: String },

    #[error("{service} response is missing the {header} header")]
    MissingHeader {
        service: &'static str,
        header: &'static str,
    },

    #[error("Slack API error: {0}")]
    Slack(String),

    #[error("GitHub App is not installed for organization '{0}'")]
    NoInstallation(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Convert to the core error type, attributing transport failures to
    /// `service`.
    pub fn into_core(self, service: &str) -> TemplatebotError {
        match self {
            ClientError::Config(msg) => TemplatebotError::Config(msg),
            other => TemplatebotError::transport(service, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
