use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use templatebot_core::catalog::TemplateCatalog;
use templatebot_core::git::GitCli;
use templatebot_core::repo_cache::RepoCache;

use super::config::load;

/// Where to read templates from.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Read templates from a local checkout instead of cloning
    #[arg(long, value_name = "DIR", conflicts_with = "git_ref")]
    pub checkout: Option<PathBuf>,

    /// Git ref of the template repository (default: template_repo_ref)
    #[arg(long = "ref", value_name = "REF")]
    pub git_ref: Option<String>,
}

impl SourceArgs {
    /// Open the catalog. A remote ref is cloned into the cache directory and
    /// the clone is deleted again once the catalog has been read.
    pub fn catalog(&self, config_path: Option<&Path>) -> anyhow::Result<TemplateCatalog> {
        if let Some(dir) = &self.checkout {
            return TemplateCatalog::open(dir)
                .with_context(|| format!("reading templates from {}", dir.display()));
        }

        let config = load(config_path)?;
        let git_ref = self
            .git_ref
            .clone()
            .unwrap_or_else(|| config.template_repo_ref.clone());
        let cache = RepoCache::new(
            &config.template_repo_url,
            config.cache_dir(),
            Arc::new(GitCli::new()),
        );

        let rt = tokio::runtime::Runtime::new().context("starting async runtime")?;
        rt.block_on(async {
            let result = cache.catalog(&git_ref).await;
            if let Err(e) = cache.purge_all().await {
                tracing::warn!("could not remove template checkout: {e}");
            }
            result
                .map(|(_, catalog)| catalog)
                .with_context(|| format!("loading templates from {} at '{git_ref}'", cache.url()))
        })
    }
}
