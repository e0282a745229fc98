//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for operations that talk to the remote:**
//! - `clone_branch_shallow` - needs `--depth=1` for bandwidth/disk savings
//! - `fetch_and_reset` - shallow fetch, hard reset and clean of a mirror
//!
//! **libgit2 for read operations:**
//! - `open_repository` - clean API for opening existing repos
//! - `head_commit` - efficient ref/commit reading
//! - `repository_exists` - simple path validation

use git2::Repository;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use thiserror::Error;

use crate::types::RemoteCoordinates;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Output parsing or unexpected git data.
    #[error("failed to parse git data: {0}")]
    ParseError(String),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Fetch, reset or clean failed.
    #[error("fetch failed: {0}")]
    FetchError(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a git ref (branch name) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b < 0x20) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

/// Validate that a host, owner or repo segment is safe.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings containing `/` or `\` (path separators)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_name(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain path separators",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b < 0x20) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

fn validate_coordinates(coords: &RemoteCoordinates) -> Result<(), GitError> {
    validate_name(coords.host(), "host")?;
    validate_name(coords.owner(), "owner")?;
    validate_name(coords.repo(), "repo")?;
    validate_git_ref(coords.branch(), "branch")
}

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::ParseError(format!("{} path is not valid UTF-8", what)))
}

/// The remote-facing git operations the synchronizer needs.
pub trait GitTransport: Send + Sync {
    /// Shallow clone `coords.branch()` of the remote into `dest`, with checkout.
    fn clone_shallow(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError>;

    /// Bring an existing checkout at `dest` to the remote branch tip,
    /// discarding local changes and untracked files.
    fn fetch_and_reset(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError>;
}

/// Git CLI wrapper with security hardening.
///
/// Used for operations that require shallow clone support (`--depth=1`)
/// which libgit2 does not natively support.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run_in(&self, dir: &str, args: &[&str]) -> Result<Output, GitError> {
        log::debug!("git -C {} {}", dir, args.join(" "));
        Ok(self.command().arg("-C").arg(dir).args(args).output()?)
    }

    /// Report the installed git version, if git can be run at all.
    pub fn version(&self) -> Option<String> {
        let output = self.command().arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Clone one branch of `url` into `dest` with only the latest commit.
    ///
    /// `dest` is removed again if the clone fails and it did not exist before.
    pub fn clone_branch_shallow(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;

        let dest_existed = dest.exists();

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let dest_str = path_str(dest, "destination")?;

        log::debug!("git clone --depth=1 --branch {} {} {}", branch, url, dest_str);
        let output = self
            .command()
            .args(["clone", "--depth=1", "--single-branch", "--branch"])
            .arg(branch)
            .arg("--")
            .arg(url)
            .arg(dest_str)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !dest_existed {
                let _ = std::fs::remove_dir_all(dest);
            }
            return Err(GitError::CloneError(stderr.trim().to_string()));
        }

        Ok(())
    }

    /// Force an existing checkout to the tip of `branch` on `url`.
    ///
    /// Runs a shallow fetch, `checkout --force -B <branch> FETCH_HEAD` and
    /// `clean -ffdx`, so the result matches a fresh clone of the branch,
    /// including the name of the checked out branch.
    pub fn fetch_branch_and_reset(
        &self,
        url: &str,
        branch: &str,
        checkout: &Path,
    ) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;

        let dir = path_str(checkout, "checkout")?;
        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);

        let steps: [&[&str]; 3] = [
            &["fetch", "--depth=1", "--force", url, refspec.as_str()],
            &["checkout", "--force", "-B", branch, "FETCH_HEAD"],
            &["clean", "-ffdx"],
        ];

        for args in steps {
            let output = self.run_in(dir, args)?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(GitError::FetchError(format!(
                    "git {}: {}",
                    args[0],
                    stderr.trim()
                )));
            }
        }

        Ok(())
    }
}

impl GitTransport for GitCli {
    fn clone_shallow(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError> {
        // Validate inputs to prevent injection attacks
        validate_coordinates(coords)?;
        self.clone_branch_shallow(&coords.remote_url(), coords.branch(), dest)
    }

    fn fetch_and_reset(&self, coords: &RemoteCoordinates, dest: &Path) -> Result<(), GitError> {
        validate_coordinates(coords)?;
        self.fetch_branch_and_reset(&coords.remote_url(), coords.branch(), dest)
    }
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Resolve the commit SHA that HEAD points at in the checkout at `path`.
pub fn head_commit(path: &Path) -> Result<String, GitError> {
    let repo = open_repository(path)?;
    let head = repo.head()?;
    let commit = head.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// Check if a path contains a valid git repository.
pub fn repository_exists(path: &Path) -> bool {
    Repository::open(path).is_ok()
}
