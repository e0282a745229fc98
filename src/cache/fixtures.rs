//! Test helpers: local origin repositories and a scripted transport.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git2::{Repository, RepositoryInitOptions, Signature};

use super::git::{GitCli, GitError, GitTransport};
use crate::types::RemoteCoordinates;

/// Whether the `git` binary can be run; prints a skip notice when it can't.
pub fn git_available() -> bool {
    if GitCli::new().version().is_some() {
        true
    } else {
        eprintln!("skipping test that needs the git binary");
        false
    }
}

/// Create a non-bare repository at `path` whose HEAD is `branch`.
pub fn init_origin(path: &Path, branch: &str) -> PathBuf {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch);
    Repository::init_opts(path, &opts).unwrap();
    path.to_path_buf()
}

/// Write `file` and commit it on `branch`, returning the new commit SHA.
pub fn commit_file(repo_path: &Path, branch: &str, file: &str, contents: &str) -> String {
    let repo = Repository::open(repo_path).unwrap();
    std::fs::write(repo_path.join(file), contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let sig = Signature::now("modelrepo", "modelrepo@example.com").unwrap();
    let refname = format!("refs/heads/{}", branch);
    let parent = repo
        .find_reference(&refname)
        .ok()
        .and_then(|r| r.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some(&refname), &sig, &sig, "update models", &tree, &parents)
        .unwrap()
        .to_string()
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Transport that writes a marker file instead of talking to a remote.
///
/// Repos listed as failing leave a partial directory behind and return an
/// error, the way an interrupted clone would.
#[derive(Default)]
pub struct FakeTransport {
    fail_clone: HashSet<String>,
    fail_fetch: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_clone(mut self, repo: &str) -> Self {
        self.fail_clone.insert(repo.to_string());
        self
    }

    pub fn failing_fetch(mut self, repo: &str) -> Self {
        self.fail_fetch.insert(repo.to_string());
        self
    }

    /// Calls made so far, as `"clone host/owner/repo"` or `"fetch ..."`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, coords: &RemoteCoordinates) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", op, coords.key()));
    }
}

fn write_checkout(coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError> {
    std::fs::create_dir_all(dest)?;
    std::fs::write(
        dest.join("README.md"),
        format!("{}@{}\n", coords.key(), coords.branch()),
    )?;
    Ok(())
}

impl GitTransport for FakeTransport {
    fn clone_shallow(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError> {
        self.record("clone", coords);
        if self.fail_clone.contains(coords.repo()) {
            std::fs::create_dir_all(dest)?;
            std::fs::write(dest.join("partial.pack"), "half")?;
            return Err(GitError::CloneError("simulated network failure".into()));
        }
        write_checkout(coords, dest)
    }

    fn fetch_and_reset(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError> {
        self.record("fetch", coords);
        if self.fail_fetch.contains(coords.repo()) {
            return Err(GitError::FetchError("simulated fetch failure".into()));
        }
        write_checkout(coords, dest)
    }
}
