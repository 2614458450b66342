use crate::error::{Result, TemplatebotError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Template repository layout
// ---------------------------------------------------------------------------

pub const PROJECT_TEMPLATES_DIR: &str = "project_templates";
pub const FILE_TEMPLATES_DIR: &str = "file_templates";
pub const TEMPLATE_MANIFEST: &str = "templatekit.yaml";
pub const COOKIECUTTER_MANIFEST: &str = "cookiecutter.json";

/// Default location of the clone cache when none is configured.
pub const DEFAULT_CACHE_SUBDIR: &str = ".cache/templatebot";

pub fn project_templates_dir(checkout: &Path) -> PathBuf {
    checkout.join(PROJECT_TEMPLATES_DIR)
}

pub fn file_templates_dir(checkout: &Path) -> PathBuf {
    checkout.join(FILE_TEMPLATES_DIR)
}

pub fn template_manifest(template_dir: &Path) -> PathBuf {
    template_dir.join(TEMPLATE_MANIFEST)
}

/// `$HOME/.cache/templatebot`, or a relative fallback if HOME is unset.
pub fn default_cache_dir() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(DEFAULT_CACHE_SUBDIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_SUBDIR))
}

// ---------------------------------------------------------------------------
// Document handles
// ---------------------------------------------------------------------------

static HANDLE_RE: OnceLock<Regex> = OnceLock::new();

fn handle_re() -> &'static Regex {
    HANDLE_RE.get_or_init(|| Regex::new(r"^(?P<series>[A-Za-z]+)-(?P<number>[0-9]+)$").unwrap())
}

/// A parsed `SERIES-NUMBER` document handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    /// Upper-cased series prefix, e.g. `LDM`.
    pub series: String,
    /// Serial number as written by the user (leading zeros preserved).
    pub number: String,
}

impl DocumentHandle {
    /// Repository / docs slug form, e.g. `ldm-151`.
    pub fn slug(&self) -> String {
        format!("{}-{}", self.series.to_lowercase(), self.number)
    }
}

impl std::fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.series, self.number)
    }
}

pub fn parse_handle(handle: &str) -> Result<DocumentHandle> {
    let caps = handle_re()
        .captures(handle.trim())
        .ok_or_else(|| TemplatebotError::InvalidHandle(handle.to_string()))?;
    Ok(DocumentHandle {
        series: caps["series"].to_uppercase(),
        number: caps["number"].to_string(),
    })
}

/// Extract the serial number from a repository name of the form
/// `{series}-{number}` (case-insensitive on the series). Returns `None` for
/// names in other series or with a non-numeric suffix.
pub fn serial_in_series(repo_name: &str, series: &str) -> Option<u32> {
    let name = repo_name.to_lowercase();
    let prefix = format!("{}-", series.to_lowercase());
    let rest = name.strip_prefix(&prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
