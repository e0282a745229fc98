//! Per-repository mirror synchronization.
//!
//! A sync either leaves `coords.path()` holding a checkout of the remote branch
//! tip, or leaves nothing there at all.

use std::io;
use std::path::Path;

use thiserror::Error;

use super::git::{GitError, GitTransport, head_commit, repository_exists};
use crate::types::RemoteCoordinates;

/// Errors from syncing a single repository.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] GitError),
    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// How an existing mirror is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// Remove the mirror and shallow clone it again.
    #[default]
    Reclone,
    /// Fetch, force-checkout the branch and clean in place; reclone if that fails.
    Incremental,
}

/// Outcome of syncing one repository.
#[derive(Debug)]
pub enum SyncResult {
    /// The mirror matches the remote branch tip. `commit` is the checked out
    /// HEAD when it could be read.
    Updated { commit: Option<String> },
    /// The mirror could not be refreshed and has been removed.
    Failed(SyncError),
}

impl SyncResult {
    pub fn is_updated(&self) -> bool {
        matches!(self, SyncResult::Updated { .. })
    }
}

/// Brings mirrors in line with their remotes.
pub struct Synchronizer<'a> {
    transport: &'a dyn GitTransport,
    strategy: SyncStrategy,
}

fn remove_mirror(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match removed {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn cleanup_mirror(path: &Path) {
    if let Err(e) = remove_mirror(path) {
        log::warn!("failed to clean up {}: {}", path.display(), e);
    }
}

impl<'a> Synchronizer<'a> {
    pub fn new(transport: &'a dyn GitTransport) -> Self {
        Self {
            transport,
            strategy: SyncStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sync one repository. Never panics on remote or filesystem failures;
    /// they are reported as `SyncResult::Failed`.
    pub fn sync(&self, coords: &RemoteCoordinates) -> SyncResult {
        let path = coords.path();

        let result = match self.strategy {
            SyncStrategy::Incremental if repository_exists(path) => {
                match self.transport.fetch_and_reset(coords, path) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        log::warn!(
                            "in-place refresh of {} failed, recloning: {}",
                            coords.name(),
                            err
                        );
                        self.reclone(coords)
                    }
                }
            }
            _ => self.reclone(coords),
        };

        match result {
            Ok(()) => {
                let commit = match head_commit(path) {
                    Ok(commit) => Some(commit),
                    Err(err) => {
                        log::debug!("could not read HEAD of {}: {}", path.display(), err);
                        None
                    }
                };
                SyncResult::Updated { commit }
            }
            Err(err) => SyncResult::Failed(err),
        }
    }

    fn reclone(&self, coords: &RemoteCoordinates) -> Result<(), SyncError> {
        let path = coords.path();

        if let Err(err) = remove_mirror(path) {
            cleanup_mirror(path);
            return Err(err.into());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log::debug!("cloning {} ({}) into {}", coords.key(), coords.branch(), path.display());
        if let Err(err) = self.transport.clone_shallow(coords, path) {
            cleanup_mirror(path);
            return Err(err.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePaths;
    use crate::cache::fixtures::{FakeTransport, commit_file, init_origin};
    use tempfile::tempdir;

    fn coords(paths: &CachePaths, reference: &str) -> RemoteCoordinates {
        RemoteCoordinates::parse(reference, None, paths).unwrap()
    }

    #[test]
    fn sync_clones_missing_mirror() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let transport = FakeTransport::new();
        let coords = coords(&paths, "git+https://github.com/bentoml/models@main");

        let result = Synchronizer::new(&transport).sync(&coords);

        assert!(result.is_updated());
        assert_eq!(
            std::fs::read_to_string(coords.path().join("README.md")).unwrap(),
            "github.com/bentoml/models@main\n"
        );
        assert_eq!(transport.calls(), vec!["clone github.com/bentoml/models"]);
    }

    #[test]
    fn sync_replaces_existing_mirror() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let transport = FakeTransport::new();
        let coords = coords(&paths, "git+https://h/o/r@dev");
        std::fs::create_dir_all(coords.path()).unwrap();
        std::fs::write(coords.path().join("leftover.txt"), "old").unwrap();

        let result = Synchronizer::new(&transport).sync(&coords);

        assert!(result.is_updated());
        assert!(!coords.path().join("leftover.txt").exists());
        assert!(coords.path().join("README.md").exists());
    }

    #[test]
    fn sync_replaces_a_stray_file_at_the_mirror_path() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let transport = FakeTransport::new();
        let coords = coords(&paths, "git+https://h/o/r");
        std::fs::create_dir_all(coords.path().parent().unwrap()).unwrap();
        std::fs::write(coords.path(), "not a directory").unwrap();

        assert!(Synchronizer::new(&transport).sync(&coords).is_updated());
        assert!(coords.path().is_dir());
    }

    #[test]
    fn failed_clone_leaves_no_directory() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let transport = FakeTransport::new().failing_clone("broken");
        let coords = coords(&paths, "git+https://h/o/broken");
        std::fs::create_dir_all(coords.path()).unwrap();

        let result = Synchronizer::new(&transport).sync(&coords);

        assert!(matches!(
            result,
            SyncResult::Failed(SyncError::Git(GitError::CloneError(_)))
        ));
        assert!(!coords.path().exists());
        assert!(coords.path().parent().unwrap().exists());
    }

    #[test]
    fn failed_clone_does_not_touch_siblings() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let transport = FakeTransport::new().failing_clone("broken");
        let good = coords(&paths, "git+https://h/o/good");
        let bad = coords(&paths, "git+https://h/o/broken");
        let sync = Synchronizer::new(&transport);

        assert!(sync.sync(&good).is_updated());
        assert!(!sync.sync(&bad).is_updated());

        assert!(good.path().join("README.md").exists());
    }

    #[test]
    fn updated_reports_head_commit_when_mirror_is_a_repo() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let coords = coords(&paths, "git+https://h/o/r");
        let transport = FakeTransport::new();
        let sync = Synchronizer::new(&transport).with_strategy(SyncStrategy::Incremental);
        init_origin(coords.path(), "main");
        let sha = commit_file(coords.path(), "main", "a.txt", "a");

        match sync.sync(&coords) {
            SyncResult::Updated { commit } => assert_eq!(commit, Some(sha)),
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    #[test]
    fn incremental_fetches_existing_repo_in_place() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let coords = coords(&paths, "git+https://h/o/r");
        init_origin(coords.path(), "main");
        commit_file(coords.path(), "main", "a.txt", "a");
        let transport = FakeTransport::new();

        let result = Synchronizer::new(&transport)
            .with_strategy(SyncStrategy::Incremental)
            .sync(&coords);

        assert!(result.is_updated());
        assert_eq!(transport.calls(), vec!["fetch h/o/r"]);
        assert!(coords.path().join(".git").exists());
    }

    #[test]
    fn incremental_falls_back_to_reclone_when_fetch_fails() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let coords = coords(&paths, "git+https://h/o/r");
        init_origin(coords.path(), "main");
        commit_file(coords.path(), "main", "a.txt", "a");
        let transport = FakeTransport::new().failing_fetch("r");

        let result = Synchronizer::new(&transport)
            .with_strategy(SyncStrategy::Incremental)
            .sync(&coords);

        assert!(result.is_updated());
        assert_eq!(transport.calls(), vec!["fetch h/o/r", "clone h/o/r"]);
        assert!(!coords.path().join("a.txt").exists());
    }

    #[test]
    fn incremental_clones_when_path_is_not_a_repo() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let coords = coords(&paths, "git+https://h/o/r");
        std::fs::create_dir_all(coords.path()).unwrap();
        let transport = FakeTransport::new();

        Synchronizer::new(&transport)
            .with_strategy(SyncStrategy::Incremental)
            .sync(&coords);

        assert_eq!(transport.calls(), vec!["clone h/o/r"]);
    }
}
