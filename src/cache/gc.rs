//! Garbage collection of cache entries no longer referenced by the registry.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::CacheKey;

/// Real (non-symlink) subdirectories of `dir` with UTF-8 names, sorted by name.
///
/// A directory that has already vanished yields nothing.
fn subdirectories(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("gc: failed to list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            match entry.file_name().into_string() {
                Ok(name) => Some((name, path)),
                Err(name) => {
                    log::warn!("gc: skipping non UTF-8 entry {:?}", name);
                    None
                }
            }
        })
        .collect();

    dirs.sort();
    dirs
}

/// Remove one cache entry, returning its path only if this call removed it.
fn remove_entry(repo_dir: &Path) -> Option<PathBuf> {
    match std::fs::remove_dir_all(repo_dir) {
        Ok(()) => Some(repo_dir.to_path_buf()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("gc: {} vanished before removal", repo_dir.display());
            None
        }
        Err(e) => {
            log::warn!("gc: failed to remove {}: {}", repo_dir.display(), e);
            None
        }
    }
}

/// Remove every `{root}/{host}/{owner}/{repo}` directory whose triple is not
/// in `in_use`, returning the removed paths in walk order.
///
/// Only the third level is ever removed. Files, symlinks and directories at
/// other depths are left alone. Entries that disappear mid-walk count as
/// already removed and are not reported.
pub fn collect(root: &Path, in_use: &HashSet<CacheKey>) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for (host, host_dir) in subdirectories(root) {
        for (owner, owner_dir) in subdirectories(&host_dir) {
            for (repo, repo_dir) in subdirectories(&owner_dir) {
                let key = CacheKey {
                    host: host.clone(),
                    owner: owner.clone(),
                    repo,
                };
                if in_use.contains(&key) {
                    continue;
                }

                if let Some(path) = remove_entry(&repo_dir) {
                    log::info!("gc: removed unused cache entry {}", key);
                    removed.push(path);
                }
            }
        }
    }

    removed
}
