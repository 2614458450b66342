//! Deriving the repository (and docs product) a template will produce.
//!
//! Every template class has its own rule; document classes also describe
//! the docs product to register.

use crate::catalog::{TemplateClass, TemplateDefinition};
use crate::collaborators::{SourceHost, TrackingMode};
use crate::error::{Result, TemplatebotError};
use crate::paths::parse_handle;
use crate::serial;
use crate::variables::ResolvedVariables;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Root domain documentation products are published under.
pub const DOCS_ROOT_DOMAIN: &str = "lsst.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsPlan {
    pub slug: String,
    pub title: String,
    pub tracking_mode: TrackingMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub owner: String,
    pub name: String,
    pub homepage: Option<String>,
    pub description: Option<String>,
    /// Present for templates whose output is a published document.
    pub docs: Option<DocsPlan>,
}

impl RepoIdentity {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

static REPO_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn repo_name_re() -> &'static Regex {
    REPO_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

pub fn validate_repo_name(key: &str, name: &str) -> Result<()> {
    if name.len() > 100 || !repo_name_re().is_match(name) {
        return Err(TemplatebotError::InvalidVariable {
            key: key.to_string(),
            reason: format!("'{name}' is not a valid repository name"),
        });
    }
    Ok(())
}

fn docs_url(slug: &str) -> String {
    format!("https://{slug}.{DOCS_ROOT_DOMAIN}/")
}

/// Work out the repository identity for `template`.
///
/// May add variables the template expects but the user did not supply
/// (e.g. the allocated `serial_number` for a technote).
pub async fn derive(
    template: &TemplateDefinition,
    vars: &mut ResolvedVariables,
    source_host: &dyn SourceHost,
) -> Result<RepoIdentity> {
    match template.class {
        TemplateClass::Technote => technote(vars, source_host).await,
        TemplateClass::ChangeControlDoc => change_control_doc(vars),
        TemplateClass::TestReport => test_report(vars),
        TemplateClass::StackPackage => stack_package(vars),
        TemplateClass::Generic => generic(vars),
    }
}

/// Auto-numbered: the next free serial in the chosen series.
async fn technote(vars: &mut ResolvedVariables, source_host: &dyn SourceHost) -> Result<RepoIdentity> {
    let owner = vars.require("github_org")?.to_string();
    let series = vars.require("series")?.to_uppercase();

    let existing = source_host.list_repositories(&owner).await?;
    let numbers = serial::numbers_in_series(existing.iter().map(String::as_str), &series);
    let number = serial::propose(&numbers);
    let serial_number = serial::format_serial(number);
    let name = format!("{}-{serial_number}", series.to_lowercase());
    tracing::info!(owner = %owner, series = %series, serial = number, "allocated technote serial");

    vars.insert("series", series);
    vars.insert("serial_number", serial_number);
    vars.insert("repo_name", name.clone());

    let title = vars.get("title").map(str::to_string);
    Ok(RepoIdentity {
        homepage: Some(docs_url(&name)),
        description: title.clone(),
        docs: Some(DocsPlan {
            slug: name.clone(),
            title: title.unwrap_or_else(|| name.clone()),
            tracking_mode: TrackingMode::GitRefs,
        }),
        owner,
        name,
    })
}

/// Manually numbered: the user supplies the `SERIES-NUMBER` handle.
fn change_control_doc(vars: &mut ResolvedVariables) -> Result<RepoIdentity> {
    handle_document(vars, TrackingMode::LsstDoc)
}

fn test_report(vars: &mut ResolvedVariables) -> Result<RepoIdentity> {
    handle_document(vars, TrackingMode::LsstDoc)
}

fn handle_document(vars: &mut ResolvedVariables, tracking_mode: TrackingMode) -> Result<RepoIdentity> {
    let owner = vars.require("github_org")?.to_string();
    let handle = parse_handle(vars.require("handle")?)?;
    let name = handle.slug();

    vars.insert("handle", handle.to_string());
    vars.insert("series", handle.series.clone());
    vars.insert("serial_number", handle.number.clone());
    vars.insert("repo_name", name.clone());

    let title = vars.get("title").map(str::to_string);
    Ok(RepoIdentity {
        homepage: Some(docs_url(&name)),
        description: title.clone(),
        docs: Some(DocsPlan {
            slug: name.clone(),
            title: title.unwrap_or_else(|| handle.to_string()),
            tracking_mode,
        }),
        owner,
        name,
    })
}

fn stack_package(vars: &mut ResolvedVariables) -> Result<RepoIdentity> {
    let owner = vars.require("github_org")?.to_string();
    let name = vars.require("package_name")?.to_string();
    validate_repo_name("package_name", &name)?;
    Ok(RepoIdentity {
        owner,
        name,
        homepage: None,
        description: vars.get("summary").filter(|s| !s.is_empty()).map(str::to_string),
        docs: None,
    })
}

fn generic(vars: &mut ResolvedVariables) -> Result<RepoIdentity> {
    let owner = vars.require("github_org")?.to_string();
    let name = vars.require("name")?.to_string();
    validate_repo_name("name", &name)?;
    let description = ["description", "summary"]
        .iter()
        .find_map(|k| vars.get(k).filter(|s| !s.is_empty()))
        .map(str::to_string);
    Ok(RepoIdentity {
        owner,
        name,
        homepage: None,
        description,
        docs: None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TemplateKind;
    use crate::collaborators::{CreatedRepository, NewRepository, PushCredentials};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct Listing(Vec<&'static str>);

    #[async_trait]
    impl SourceHost for Listing {
        async fn create_repository(&self, _repo: &NewRepository) -> Result<CreatedRepository> {
            unreachable!()
        }
        async fn list_repositories(&self, _owner: &str) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
        async fn push_credentials(&self, _owner: &str) -> Result<PushCredentials> {
            unreachable!()
        }
    }

    fn template(name: &str) -> TemplateDefinition {
        TemplateDefinition {
            name: name.to_string(),
            kind: TemplateKind::Project,
            class: TemplateClass::for_template(name, TemplateKind::Project),
            group: "General".into(),
            display_name: name.to_string(),
            dialog_title: name.to_string(),
            fields: vec![],
            dir: PathBuf::from("/tmp").join(name),
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> ResolvedVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn technote_fills_serial_gap() {
        let host = Listing(vec!["sqr-001", "sqr-003", "squarebot"]);
        let mut v = vars(&[("series", "SQR"), ("github_org", "lsst-sqre"), ("title", "Hello")]);
        let id = derive(&template("technote_rst"), &mut v, &host).await.unwrap();

        assert_eq!(id.full_name(), "lsst-sqre/sqr-002");
        assert_eq!(id.homepage.as_deref(), Some("https://sqr-002.lsst.io/"));
        assert_eq!(id.description.as_deref(), Some("Hello"));
        let docs = id.docs.unwrap();
        assert_eq!(docs.slug, "sqr-002");
        assert_eq!(docs.tracking_mode, TrackingMode::GitRefs);
        assert_eq!(v.get("serial_number"), Some("002"));
    }

    #[tokio::test]
    async fn technote_in_empty_org_starts_at_one() {
        let host = Listing(vec![]);
        let mut v = vars(&[("series", "dmtn"), ("github_org", "lsst-dm")]);
        let id = derive(&template("technote_md"), &mut v, &host).await.unwrap();
        assert_eq!(id.name, "dmtn-001");
        assert_eq!(v.get("series"), Some("DMTN"));
        assert_eq!(id.docs.unwrap().title, "dmtn-001");
    }

    #[tokio::test]
    async fn lsstdoc_uses_handle() {
        let host = Listing(vec![]);
        let mut v = vars(&[("handle", "ldm-151"), ("github_org", "lsst"), ("title", "Pipelines")]);
        let id = derive(&template("latex_lsstdoc"), &mut v, &host).await.unwrap();
        assert_eq!(id.full_name(), "lsst/ldm-151");
        assert_eq!(id.docs.unwrap().tracking_mode, TrackingMode::LsstDoc);
        assert_eq!(v.get("handle"), Some("LDM-151"));
        assert_eq!(v.get("serial_number"), Some("151"));
    }

    #[tokio::test]
    async fn bad_handle_is_rejected() {
        let host = Listing(vec![]);
        let mut v = vars(&[("handle", "LDM151"), ("github_org", "lsst")]);
        let err = derive(&template("test_report"), &mut v, &host).await.unwrap_err();
        assert!(matches!(err, TemplatebotError::InvalidHandle(_)));
    }

    #[tokio::test]
    async fn stack_package_uses_package_name() {
        let host = Listing(vec![]);
        let mut v = vars(&[("package_name", "afw"), ("github_org", "lsst")]);
        let id = derive(&template("stack_package"), &mut v, &host).await.unwrap();
        assert_eq!(id.full_name(), "lsst/afw");
        assert!(id.docs.is_none());
        assert!(id.homepage.is_none());
    }

    #[tokio::test]
    async fn generic_requires_valid_name() {
        let host = Listing(vec![]);
        let mut v = vars(&[("name", "my service"), ("github_org", "lsst-sqre")]);
        let err = derive(&template("fastapi_safir_app"), &mut v, &host).await.unwrap_err();
        assert!(matches!(err, TemplatebotError::InvalidVariable { .. }));

        let mut v = vars(&[("github_org", "lsst-sqre")]);
        let err = derive(&template("fastapi_safir_app"), &mut v, &host).await.unwrap_err();
        assert!(matches!(err, TemplatebotError::MissingVariable(ref k) if k == "name"));
    }
}
