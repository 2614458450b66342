//! Rendering templates with the `cookiecutter` executable.

use crate::catalog::TemplateDefinition;
use crate::collaborators::RenderEngine;
use crate::error::{Result, TemplatebotError};
use crate::io;
use crate::variables::ResolvedVariables;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Name of the generated config file passed via `--config-file`.
const CONTEXT_FILE: &str = ".templatebot-context.yaml";

#[derive(Serialize)]
struct CookiecutterConfig<'a> {
    default_context: &'a ResolvedVariables,
}

#[derive(Debug, Clone, Default)]
pub struct CookiecutterRenderer {
    bin: Option<PathBuf>,
}

impl CookiecutterRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: Some(bin.into()),
        }
    }

    fn cookiecutter_bin(&self) -> Result<PathBuf> {
        match &self.bin {
            Some(bin) => Ok(bin.clone()),
            None => which::which("cookiecutter")
                .map_err(|_| TemplatebotError::ToolNotFound("cookiecutter".into())),
        }
    }
}

/// Write `vars` as a cookiecutter user config whose `default_context`
/// overrides the template's own defaults.
pub fn write_context_file(vars: &ResolvedVariables, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(CONTEXT_FILE);
    let yaml = serde_yaml::to_string(&CookiecutterConfig {
        default_context: vars,
    })?;
    io::atomic_write(&path, yaml.as_bytes())?;
    Ok(path)
}

#[async_trait]
impl RenderEngine for CookiecutterRenderer {
    async fn render(
        &self,
        template: &TemplateDefinition,
        vars: &ResolvedVariables,
        output_root: &Path,
    ) -> Result<PathBuf> {
        let render_err = |reason: String| TemplatebotError::Render {
            template: template.name.clone(),
            reason,
        };

        let bin = self.cookiecutter_bin()?;
        let out_dir = output_root.join("rendered");
        io::ensure_dir(&out_dir)?;
        let context = write_context_file(vars, output_root)?;

        tracing::info!(template = %template.name, out = %out_dir.display(), "rendering template");
        let output = Command::new(bin)
            .arg("--no-input")
            .arg("--config-file")
            .arg(&context)
            .arg("--output-dir")
            .arg(&out_dir)
            .arg(&template.dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| render_err(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(render_err(stderr.trim().to_string()));
        }

        // Project templates render into a single top-level directory.
        io::sole_subdir(&out_dir)?.ok_or_else(|| {
            render_err("expected the template to produce exactly one directory".into())
        })
    }
}
