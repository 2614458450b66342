use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplatebotError {
    // Validation: bad or ambiguous user input.
    #[error("invalid document handle '{0}': expected SERIES-NUMBER, e.g. SQR-001")]
    InvalidHandle(String),

    #[error("missing required template variable '{0}'")]
    MissingVariable(String),

    #[error("'{value}' is not an option of the '{field}' field")]
    UnknownOption { field: String, value: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidVariable { key: String, reason: String },

    // Lookup: something the user named does not exist.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("author not found: {0}")]
    AuthorNotFound(String),

    // Cache: the template repository mirror could not be produced.
    #[error("failed to clone template repository at '{git_ref}': {reason}")]
    CloneFailed { git_ref: String, reason: String },

    #[error("git ref '{0}' no longer exists in the template repository")]
    RefNotFound(String),

    #[error("malformed template repository: {0}")]
    MalformedRepository(String),

    // Transport: a collaborator call failed.
    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("rendering template '{template}' failed: {reason}")]
    Render { template: String, reason: String },

    #[error("required executable not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Lookup,
    Transport,
    Cache,
    Internal,
}

impl TemplatebotError {
    pub fn transport(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidHandle(_)
            | Self::MissingVariable(_)
            | Self::UnknownOption { .. }
            | Self::InvalidVariable { .. } => ErrorCategory::Validation,
            Self::TemplateNotFound(_) | Self::AuthorNotFound(_) => ErrorCategory::Lookup,
            Self::CloneFailed { .. } | Self::RefNotFound(_) | Self::MalformedRepository(_) => {
                ErrorCategory::Cache
            }
            Self::Transport { .. }
            | Self::Git { .. }
            | Self::Render { .. }
            | Self::ToolNotFound(_) => ErrorCategory::Transport,
            Self::Config(_) | Self::Io(_) | Self::Yaml(_) | Self::Json(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// True when the user can fix the problem by resubmitting different input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Lookup
        )
    }
}

pub type Result<T> = std::result::Result<T, TemplatebotError>;
