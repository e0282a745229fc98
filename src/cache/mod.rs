//! Git mirror cache: layout, sync, garbage collection and staleness

#[cfg(test)]
pub(crate) mod fixtures;
pub mod gc;
mod git;
mod lock;
mod paths;
mod staleness;
mod swap;
mod sync;

pub use git::{GitCli, GitError, GitTransport, head_commit, repository_exists};
pub use lock::{DEFAULT_LOCK_TIMEOUT, LockError, UpdateLock};
pub use paths::CachePaths;
pub use staleness::{Staleness, StalenessTracker, default_ttl};
pub use swap::atomic_write;
pub use sync::{SyncError, SyncResult, SyncStrategy, Synchronizer};
