//! Shared types for modelrepo

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::cache::CachePaths;

/// Branch used when a reference does not name one.
pub const DEFAULT_BRANCH: &str = "main";

const SCHEME: &str = "git+https://";

/// Error type for reference parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("reference must start with 'git+https://'")]
    MissingScheme,
    #[error("expected <host>/<owner>/<repo>, found {0} path segment(s)")]
    SegmentCount(usize),
    #[error("{0} cannot be empty")]
    EmptySegment(&'static str),
    #[error("{0} cannot be '.' or '..'")]
    DotSegment(&'static str),
    #[error("branch cannot be empty")]
    EmptyBranch,
}

/// Error type for registry name validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,
    #[error("name cannot start with '{0}'")]
    InvalidStart(char),
    #[error("invalid character in name: {0}")]
    InvalidCharacter(char),
}

/// A registry name.
///
/// Validation rules:
/// - Lowercased before validation
/// - Non-empty
/// - ASCII letters, digits and underscores only
/// - Cannot start with a digit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoName(String);

impl RepoName {
    /// Returns the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RepoName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        let mut chars = name.chars();

        let first = chars.next().ok_or(NameError::Empty)?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(NameError::InvalidStart(first));
        }

        for c in chars {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                return Err(NameError::InvalidCharacter(c));
            }
        }

        Ok(RepoName(name))
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one cache entry: the `(host, owner, repo)` triple.
///
/// Branch and registry name are deliberately absent, so every reference to
/// the same remote shares a single mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl CacheKey {
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.repo)
    }
}

/// The remote half of a reference: where to clone from and which branch.
///
/// Grammar: `git+https://<host>/<owner>/<repo>[@<branch>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocator {
    pub key: CacheKey,
    pub branch: String,
}

fn segment(value: &str, what: &'static str) -> Result<String, ParseError> {
    match value {
        "" => Err(ParseError::EmptySegment(what)),
        "." | ".." => Err(ParseError::DotSegment(what)),
        _ => Ok(value.to_string()),
    }
}

impl FromStr for RemoteLocator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(SCHEME).ok_or(ParseError::MissingScheme)?;

        // The repo segment ends at the first '@'; the branch is everything after it.
        let (location, branch) = match rest.split_once('@') {
            Some((_, "")) => return Err(ParseError::EmptyBranch),
            Some((location, branch)) => (location, branch.to_string()),
            None => (rest, DEFAULT_BRANCH.to_string()),
        };

        let parts: Vec<&str> = location.split('/').collect();
        let [host, owner, repo] = parts.as_slice() else {
            return Err(ParseError::SegmentCount(parts.len()));
        };

        Ok(RemoteLocator {
            key: CacheKey {
                host: segment(host, "host")?,
                owner: segment(owner, "owner")?,
                repo: segment(repo, "repo")?,
            },
            branch,
        })
    }
}

/// A parsed registry entry with its derived cache location.
///
/// Built fresh for every operation; never cached across registry changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteCoordinates {
    name: String,
    url: String,
    #[serde(flatten)]
    key: CacheKey,
    branch: String,
    path: PathBuf,
}

impl RemoteCoordinates {
    /// Parse `reference` and place it under the cache root of `paths`.
    ///
    /// `name` defaults to the repo segment when not given.
    pub fn parse(
        reference: &str,
        name: Option<&str>,
        paths: &CachePaths,
    ) -> Result<Self, ParseError> {
        let locator: RemoteLocator = reference.parse()?;
        let path = paths.repo_dir(&locator.key);

        Ok(Self {
            name: name.unwrap_or(&locator.key.repo).to_string(),
            url: reference.to_string(),
            key: locator.key,
            branch: locator.branch,
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reference string exactly as it was given.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.key.host
    }

    pub fn owner(&self) -> &str {
        &self.key.owner
    }

    pub fn repo(&self) -> &str {
        &self.key.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Local mirror directory: `{cache_root}/{host}/{owner}/{repo}`
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// HTTPS clone URL of the remote.
    pub fn remote_url(&self) -> String {
        format!(
            "https://{}/{}/{}.git",
            self.key.host, self.key.owner, self.key.repo
        )
    }
}

impl fmt::Display for RemoteCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}@{})", self.name, self.key, self.branch)
    }
}
