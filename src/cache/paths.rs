//! Cache directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for the cache directory layout:
//!
//! ```text
//! ~/.cache/modelrepo/
//! ├── <host>/
//! │   └── <owner>/
//! │       └── <repo>/          # Shallow working-tree mirror
//! ├── last_update              # RFC 3339 time of the last completed pass
//! └── .update.lock             # flock-based pass lock
//! ```

use std::path::{Path, PathBuf};

use crate::types::CacheKey;

/// Manages all filesystem paths for the cache directory layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the mirror directory for a remote: `{root}/{host}/{owner}/{repo}`
    pub fn repo_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.host).join(&key.owner).join(&key.repo)
    }

    /// Returns the staleness marker path: `{root}/last_update`
    pub fn marker_path(&self) -> PathBuf {
        self.root.join("last_update")
    }

    /// Returns the update lock path: `{root}/.update.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".update.lock")
    }
}

impl Default for CachePaths {
    /// Creates a CachePaths using the system cache directory + "modelrepo"
    ///
    /// Uses `dirs::cache_dir()` which resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("modelrepo"))
    }
}
