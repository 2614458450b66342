//! Local mirror of the template repository, one checkout per commit.
//!
//! Each resolved git ref maps to a commit; each commit maps to exactly one
//! shallow checkout in its own directory under the cache root. A ref that
//! is already known is only re-cloned when it has moved upstream, and a
//! clone that lands on a commit already on disk is discarded.
//!
//! Resolutions of the same ref are serialised; different refs resolve
//! concurrently. A ref's lock is dropped once the ref is no longer mapped
//! and nobody is waiting on it.

use crate::catalog::{TemplateCatalog, TemplateDefinition};
use crate::error::{Result, TemplatebotError};
use crate::git::{is_commit_sha, CloneBackend};
use crate::io;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A commit-pinned checkout of the template repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCheckout {
    pub commit: String,
    pub path: PathBuf,
    /// Refs currently mapped to this commit.
    pub refs: BTreeSet<String>,
    pub cloned_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// commit -> checkout
    checkouts: HashMap<String, RepoCheckout>,
    /// ref -> commit
    refs: HashMap<String, String>,
}

impl CacheState {
    fn snapshot(&self, commit: &str) -> Option<RepoCheckout> {
        self.checkouts.get(commit).cloned()
    }

    /// Point `git_ref` at `commit`, detaching it from any previous checkout.
    fn map_ref(&mut self, git_ref: &str, commit: &str) {
        if let Some(old) = self.refs.insert(git_ref.to_string(), commit.to_string()) {
            if let Some(checkout) = self.checkouts.get_mut(&old) {
                checkout.refs.remove(git_ref);
            }
        }
        if let Some(checkout) = self.checkouts.get_mut(commit) {
            checkout.refs.insert(git_ref.to_string());
        }
    }

    /// Forget `git_ref`. Its checkout stays on disk until a purge.
    fn unmap_ref(&mut self, git_ref: &str) {
        if let Some(old) = self.refs.remove(git_ref) {
            if let Some(checkout) = self.checkouts.get_mut(&old) {
                checkout.refs.remove(git_ref);
            }
        }
    }
}

pub struct RepoCache {
    url: String,
    cache_dir: PathBuf,
    backend: Arc<dyn CloneBackend>,
    state: Mutex<CacheState>,
    ref_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for RepoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoCache")
            .field("url", &self.url)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl RepoCache {
    pub fn new(url: impl Into<String>, cache_dir: impl Into<PathBuf>, backend: Arc<dyn CloneBackend>) -> Self {
        Self {
            url: url.into(),
            cache_dir: cache_dir.into(),
            backend,
            state: Mutex::new(CacheState::default()),
            ref_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Checkouts currently on disk, ordered by commit.
    pub fn checkouts(&self) -> Vec<RepoCheckout> {
        let state = self.lock_state();
        let mut all: Vec<_> = state.checkouts.values().cloned().collect();
        all.sort_by(|a, b| a.commit.cmp(&b.commit));
        all
    }

    /// Return a checkout for `git_ref`, cloning only when the ref is new or
    /// has moved upstream.
    pub async fn resolve(&self, git_ref: &str) -> Result<RepoCheckout> {
        let lock = self.ref_lock(git_ref);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(git_ref).await
        };
        drop(lock);
        self.prune_ref_lock(git_ref);
        result
    }

    async fn resolve_locked(&self, git_ref: &str) -> Result<RepoCheckout> {
        let known = {
            let mut state = self.lock_state();
            if state.checkouts.contains_key(git_ref) {
                // The ref is itself a commit we already hold.
                state.map_ref(git_ref, git_ref);
                return self.snapshot(&state, git_ref);
            }
            state.refs.get(git_ref).cloned()
        };

        let Some(commit) = known else {
            return self.clone_ref(git_ref).await;
        };
        if is_commit_sha(git_ref) {
            return self.snapshot(&self.lock_state(), &commit);
        }

        match self.backend.remote_commit(&self.url, git_ref).await? {
            None => {
                tracing::warn!(git_ref, commit = %commit, "template ref no longer exists upstream");
                self.lock_state().unmap_ref(git_ref);
                Err(TemplatebotError::RefNotFound(git_ref.to_string()))
            }
            Some(upstream) if upstream == commit => {
                tracing::debug!(git_ref, commit = %commit, "template checkout is current");
                self.snapshot(&self.lock_state(), &commit)
            }
            Some(upstream) => {
                tracing::info!(git_ref, old = %commit, new = %upstream, "template ref moved upstream");
                self.clone_ref(git_ref).await
            }
        }
    }

    /// Resolve `git_ref` and open the template catalog of its checkout.
    pub async fn catalog(&self, git_ref: &str) -> Result<(RepoCheckout, TemplateCatalog)> {
        let checkout = self.resolve(git_ref).await?;
        let path = checkout.path.clone();
        let catalog = tokio::task::spawn_blocking(move || TemplateCatalog::open(&path))
            .await
            .map_err(|e| TemplatebotError::Io(std::io::Error::other(e)))??;
        Ok((checkout, catalog))
    }

    /// Resolve `git_ref` and look up a single template by name.
    pub async fn template(&self, git_ref: &str, name: &str) -> Result<(RepoCheckout, TemplateDefinition)> {
        let (checkout, catalog) = self.catalog(git_ref).await?;
        let template = catalog.get(name)?.clone();
        Ok((checkout, template))
    }

    /// Delete every checkout and forget all mappings.
    pub async fn purge_all(&self) -> Result<()> {
        let dirs: Vec<PathBuf> = {
            let mut state = self.lock_state();
            let dirs = state.checkouts.values().map(|c| c.path.clone()).collect();
            *state = CacheState::default();
            dirs
        };
        self.ref_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        for dir in &dirs {
            io::remove_dir_if_exists(dir).await?;
        }
        tracing::info!(removed = dirs.len(), "purged template checkouts");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn clone_ref(&self, git_ref: &str) -> Result<RepoCheckout> {
        io::ensure_dir(&self.cache_dir)?;
        let dest = self.cache_dir.join(uuid::Uuid::new_v4().to_string());
        tracing::info!(git_ref, dest = %dest.display(), "cloning template repository");

        let commit = match self.clone_into(git_ref, &dest).await {
            Ok(commit) => commit,
            Err(e) => {
                if let Err(cleanup) = io::remove_dir_if_exists(&dest).await {
                    tracing::warn!(error = %cleanup, "failed to remove partial clone");
                }
                return Err(TemplatebotError::CloneFailed {
                    git_ref: git_ref.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let duplicate = {
            let mut state = self.lock_state();
            let duplicate = state.checkouts.contains_key(&commit);
            if !duplicate {
                state.checkouts.insert(
                    commit.clone(),
                    RepoCheckout {
                        commit: commit.clone(),
                        path: dest.clone(),
                        refs: BTreeSet::new(),
                        cloned_at: Utc::now(),
                    },
                );
            }
            state.map_ref(git_ref, &commit);
            duplicate
        };
        if duplicate {
            tracing::debug!(commit = %commit, "commit already cached, discarding new clone");
            io::remove_dir_if_exists(&dest).await?;
        }
        self.snapshot(&self.lock_state(), &commit)
    }

    async fn clone_into(&self, git_ref: &str, dest: &Path) -> Result<String> {
        self.backend.shallow_clone(&self.url, git_ref, dest).await?;
        self.backend.head_commit(dest).await
    }

    fn snapshot(&self, state: &CacheState, commit: &str) -> Result<RepoCheckout> {
        state
            .snapshot(commit)
            .ok_or_else(|| TemplatebotError::RefNotFound(commit.to_string()))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ref_lock(&self, git_ref: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.ref_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(git_ref.to_string()).or_default().clone()
    }

    /// Drop the lock of an unmapped ref. Clones are only handed out under
    /// the map lock, so a count of one means nobody else holds it.
    fn prune_ref_lock(&self, git_ref: &str) {
        if self.lock_state().refs.contains_key(git_ref) {
            return;
        }
        let mut locks = self.ref_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(git_ref).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(git_ref);
        }
    }

    #[cfg(test)]
    fn ref_lock_count(&self) -> usize {
        self.ref_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::tests::{write_template, STACK_PACKAGE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Simulated upstream: a ref table that tests can move, and clones that
    /// record their commit in a marker file.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub upstream: Mutex<HashMap<String, String>>,
        pub clones: AtomicUsize,
        pub fail_clone: std::sync::atomic::AtomicBool,
    }

    impl FakeBackend {
        pub fn with_ref(git_ref: &str, commit: &str) -> Self {
            let backend = Self::default();
            backend.set_ref(git_ref, commit);
            backend
        }

        pub fn set_ref(&self, git_ref: &str, commit: &str) {
            self.upstream
                .lock()
                .unwrap()
                .insert(git_ref.to_string(), commit.to_string());
        }

        pub fn delete_ref(&self, git_ref: &str) {
            self.upstream.lock().unwrap().remove(git_ref);
        }

        fn lookup(&self, git_ref: &str) -> Option<String> {
            self.upstream.lock().unwrap().get(git_ref).cloned()
        }
    }

    #[async_trait]
    impl CloneBackend for FakeBackend {
        async fn shallow_clone(&self, _url: &str, git_ref: &str, dest: &Path) -> Result<()> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            std::fs::create_dir_all(dest)?;
            if self.fail_clone.load(Ordering::SeqCst) {
                return Err(TemplatebotError::Git {
                    command: "clone".into(),
                    stderr: "network unreachable".into(),
                });
            }
            let commit = self
                .lookup(git_ref)
                .ok_or_else(|| TemplatebotError::Git {
                    command: "clone".into(),
                    stderr: format!("Remote branch {git_ref} not found"),
                })?;
            std::fs::write(dest.join(".commit"), &commit)?;
            write_template(dest, "project_templates", "stack_package", STACK_PACKAGE);
            Ok(())
        }

        async fn head_commit(&self, checkout: &Path) -> Result<String> {
            Ok(std::fs::read_to_string(checkout.join(".commit"))?)
        }

        async fn remote_commit(&self, _url: &str, git_ref: &str) -> Result<Option<String>> {
            Ok(self.lookup(git_ref))
        }
    }

    fn cache(dir: &TempDir, backend: Arc<FakeBackend>) -> RepoCache {
        RepoCache::new("https://example.com/templates", dir.path().join("cache"), backend)
    }

    fn dirs_in(path: &Path) -> usize {
        std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn repeated_resolution_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend.clone());

        let first = cache.resolve("main").await.unwrap();
        let second = cache.resolve("main").await.unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(second.commit, "c1");
        assert_eq!(backend.clones.load(Ordering::SeqCst), 1);
        assert_eq!(dirs_in(cache.cache_dir()), 1);
    }

    #[tokio::test]
    async fn moved_ref_is_remapped() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend.clone());

        let old = cache.resolve("main").await.unwrap();
        backend.set_ref("main", "c2");
        let new = cache.resolve("main").await.unwrap();

        assert_eq!(new.commit, "c2");
        assert_ne!(old.path, new.path);
        assert!(new.refs.contains("main"));

        let checkouts = cache.checkouts();
        let stale = checkouts.iter().find(|c| c.commit == "c1").unwrap();
        assert!(stale.refs.is_empty());
    }

    #[tokio::test]
    async fn refs_sharing_a_commit_share_a_checkout() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        backend.set_ref("v1.0", "c1");
        let cache = cache(&dir, backend.clone());

        let main = cache.resolve("main").await.unwrap();
        let tag = cache.resolve("v1.0").await.unwrap();
        assert_eq!(main.path, tag.path);
        assert_eq!(tag.refs, BTreeSet::from(["main".to_string(), "v1.0".to_string()]));
        assert_eq!(backend.clones.load(Ordering::SeqCst), 2);
        assert_eq!(dirs_in(cache.cache_dir()), 1);
    }

    #[tokio::test]
    async fn concurrent_resolution_clones_once() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = Arc::new(cache(&dir, backend.clone()));

        let (a, b) = tokio::join!(cache.resolve("main"), cache.resolve("main"));
        assert_eq!(a.unwrap().path, b.unwrap().path);
        assert_eq!(backend.clones.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_clone_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        backend.fail_clone.store(true, Ordering::SeqCst);
        let cache = cache(&dir, backend.clone());

        let err = cache.resolve("main").await.unwrap_err();
        assert!(matches!(err, TemplatebotError::CloneFailed { .. }));
        assert_eq!(dirs_in(cache.cache_dir()), 0);
        assert!(cache.checkouts().is_empty());

        backend.fail_clone.store(false, Ordering::SeqCst);
        assert_eq!(cache.resolve("main").await.unwrap().commit, "c1");
    }

    #[tokio::test]
    async fn deleted_ref_is_reported() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("tickets/DM-1", "c1"));
        let cache = cache(&dir, backend.clone());

        cache.resolve("tickets/DM-1").await.unwrap();
        backend.delete_ref("tickets/DM-1");
        let err = cache.resolve("tickets/DM-1").await.unwrap_err();
        assert!(matches!(err, TemplatebotError::RefNotFound(_)));

        let checkouts = cache.checkouts();
        assert_eq!(checkouts.len(), 1);
        assert!(checkouts[0].refs.is_empty());
        assert_eq!(cache.ref_lock_count(), 0);
    }

    #[tokio::test]
    async fn ref_locks_do_not_accumulate() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend);

        for i in 0..5 {
            assert!(cache.resolve(&format!("tickets/DM-{i}")).await.is_err());
        }
        assert_eq!(cache.ref_lock_count(), 0);

        cache.resolve("main").await.unwrap();
        assert_eq!(cache.ref_lock_count(), 1);
        cache.purge_all().await.unwrap();
        assert_eq!(cache.ref_lock_count(), 0);
    }

    #[tokio::test]
    async fn known_commit_resolves_without_cloning() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend.clone());

        let main = cache.resolve("main").await.unwrap();
        let by_commit = cache.resolve("c1").await.unwrap();
        assert_eq!(main.path, by_commit.path);
        assert_eq!(backend.clones.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn catalog_and_template_lookup() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend);

        let (_, catalog) = cache.catalog("main").await.unwrap();
        assert_eq!(catalog.len(), 1);
        let (checkout, template) = cache.template("main", "stack_package").await.unwrap();
        assert!(template.dir.starts_with(&checkout.path));
        assert!(matches!(
            cache.template("main", "nope").await,
            Err(TemplatebotError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn purge_removes_everything() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::with_ref("main", "c1"));
        let cache = cache(&dir, backend.clone());

        cache.resolve("main").await.unwrap();
        cache.purge_all().await.unwrap();
        assert!(cache.checkouts().is_empty());
        assert_eq!(dirs_in(cache.cache_dir()), 0);

        cache.resolve("main").await.unwrap();
        assert_eq!(backend.clones.load(Ordering::SeqCst), 2);
    }
}
