//! The `git` executable, driven as a subprocess.
//!
//! [`GitCli`] serves two roles: it is the [`CloneBackend`] behind the
//! template repository cache and the [`WorkTree`] used to push rendered
//! projects.

use crate::collaborators::{CommitIdentity, PushCredentials, RemoteHandle, RepoHandle, WorkTree};
use crate::error::{Result, TemplatebotError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Name of the short-lived remote that carries push credentials.
pub const TEMP_REMOTE: &str = "tmp-squarebot";

/// Operations the repository cache needs from version control.
#[async_trait]
pub trait CloneBackend: Send + Sync {
    /// Shallow clone of `git_ref` (branch, tag or commit) into `dest`.
    async fn shallow_clone(&self, url: &str, git_ref: &str, dest: &Path) -> Result<()>;

    /// Commit checked out in `checkout`.
    async fn head_commit(&self, checkout: &Path) -> Result<String>;

    /// Commit `git_ref` currently points to upstream, or `None` if the ref
    /// no longer exists.
    async fn remote_commit(&self, url: &str, git_ref: &str) -> Result<Option<String>>;
}

/// True for a full 40-character hex object name.
pub fn is_commit_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `https://host/path` with `username:token@` inserted after the scheme.
pub fn authenticated_url(url: &str, credentials: &PushCredentials) -> Result<String> {
    let rest = url.strip_prefix("https://").ok_or_else(|| TemplatebotError::InvalidVariable {
        key: "repo_url".to_string(),
        reason: format!("push URL must use https: {url}"),
    })?;
    Ok(format!(
        "https://{}:{}@{}",
        credentials.username, credentials.token, rest
    ))
}

/// Pick the commit for `git_ref` out of `git ls-remote` output.
///
/// Ranked the way `git clone --branch` chooses: a branch wins over a tag of
/// the same name, and a peeled annotated tag (`refs/tags/x^{}`) wins over
/// the tag object itself.
pub fn parse_ls_remote(output: &str, git_ref: &str) -> Option<String> {
    let branch = format!("refs/heads/{git_ref}");
    let tag = format!("refs/tags/{git_ref}");
    let peeled = format!("refs/tags/{git_ref}^{{}}");

    let mut best: Option<(u8, &str)> = None;
    for line in output.lines() {
        let Some((sha, name)) = line.split_once('\t') else {
            continue;
        };
        let rank = if name == branch {
            0
        } else if name == peeled {
            1
        } else if name == tag {
            2
        } else if name == git_ref {
            3
        } else {
            continue;
        };
        if best.map_or(true, |(r, _)| rank < r) {
            best = Some((rank, sha.trim()));
        }
    }
    best.map(|(_, sha)| sha.to_string())
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GitCli {
    bin: Option<PathBuf>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable instead of searching PATH.
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: Some(bin.into()),
        }
    }

    fn git_bin(&self) -> Result<PathBuf> {
        match &self.bin {
            Some(bin) => Ok(bin.clone()),
            None => which::which("git").map_err(|_| TemplatebotError::ToolNotFound("git".into())),
        }
    }

    /// Run git with `args`, returning trimmed stdout.
    ///
    /// `label` names the subcommand in errors; it is used instead of the full
    /// argument list so credentials in URLs never reach logs.
    async fn run(&self, label: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new(self.git_bin()?);
        cmd.args(args)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!(command = label, cwd = ?cwd, "running git");

        let output = cmd.output().await.map_err(|e| TemplatebotError::Git {
            command: label.to_string(),
            stderr: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TemplatebotError::Git {
                command: label.to_string(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| TemplatebotError::Git {
        command: "path".into(),
        stderr: format!("path is not valid UTF-8: {}", path.display()),
    })
}

#[async_trait]
impl CloneBackend for GitCli {
    async fn shallow_clone(&self, url: &str, git_ref: &str, dest: &Path) -> Result<()> {
        let dest_str = path_str(dest)?;
        if is_commit_sha(git_ref) {
            // --branch only accepts branch and tag names.
            tokio::fs::create_dir_all(dest).await?;
            self.run("init", &["init", "--quiet", dest_str], None).await?;
            self.run(
                "fetch",
                &["fetch", "--quiet", "--depth", "1", url, git_ref],
                Some(dest),
            )
            .await?;
            self.run("checkout", &["checkout", "--quiet", "FETCH_HEAD"], Some(dest))
                .await?;
            self.run(
                "submodule",
                &["submodule", "update", "--init", "--recursive", "--depth", "1"],
                Some(dest),
            )
            .await?;
            return Ok(());
        }
        self.run(
            "clone",
            &[
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--branch",
                git_ref,
                "--recurse-submodules",
                "--shallow-submodules",
                url,
                dest_str,
            ],
            None,
        )
        .await?;
        Ok(())
    }

    async fn head_commit(&self, checkout: &Path) -> Result<String> {
        self.run("rev-parse", &["rev-parse", "HEAD"], Some(checkout))
            .await
    }

    async fn remote_commit(&self, url: &str, git_ref: &str) -> Result<Option<String>> {
        if is_commit_sha(git_ref) {
            return Ok(Some(git_ref.to_string()));
        }
        let out = self
            .run("ls-remote", &["ls-remote", url, git_ref], None)
            .await?;
        Ok(parse_ls_remote(&out, git_ref))
    }
}

#[async_trait]
impl WorkTree for GitCli {
    async fn init_repo(&self, path: &Path, default_branch: &str) -> Result<RepoHandle> {
        self.run(
            "init",
            &["init", "--quiet", "--initial-branch", default_branch],
            Some(path),
        )
        .await?;
        self.run("add", &["add", "--all"], Some(path)).await?;
        Ok(RepoHandle {
            path: path.to_path_buf(),
        })
    }

    async fn commit(&self, repo: &RepoHandle, message: &str, author: &CommitIdentity) -> Result<()> {
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.run(
            "commit",
            &["-c", &name, "-c", &email, "commit", "--quiet", "-m", message],
            Some(&repo.path),
        )
        .await?;
        Ok(())
    }

    async fn add_authenticated_remote(
        &self,
        repo: &RepoHandle,
        url: &str,
        credentials: &PushCredentials,
    ) -> Result<RemoteHandle> {
        let authed = authenticated_url(url, credentials)?;
        self.run(
            "remote add",
            &["remote", "add", TEMP_REMOTE, &authed],
            Some(&repo.path),
        )
        .await?;
        Ok(RemoteHandle {
            name: TEMP_REMOTE.to_string(),
        })
    }

    async fn push(&self, repo: &RepoHandle, remote: &RemoteHandle, branch: &str) -> Result<()> {
        let refspec = format!("{branch}:{branch}");
        self.run(
            "push",
            &["push", "--quiet", "--force", &remote.name, &refspec],
            Some(&repo.path),
        )
        .await?;
        Ok(())
    }

    async fn remove_remote(&self, repo: &RepoHandle, remote: &RemoteHandle) -> Result<()> {
        self.run(
            "remote remove",
            &["remote", "remove", &remote.name],
            Some(&repo.path),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
