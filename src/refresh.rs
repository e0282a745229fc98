//! Full refresh passes and the staleness policy run before reading the cache.
//!
//! A pass holds the update lock for its whole duration:
//!
//! 1. load the registry and parse every entry,
//! 2. sync each repository, on up to `jobs` worker threads,
//! 3. remove cache entries no registered repository uses,
//! 4. record the pass in the staleness marker.
//!
//! A cancelled pass stops after step 2 and leaves the marker alone.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded};

use crate::cache::{
    CachePaths, LockError, Staleness, StalenessTracker, SyncResult, Synchronizer, UpdateLock,
    gc,
};
use crate::context::Context;
use crate::error::RepoError;
use crate::types::{CacheKey, ParseError, RemoteCoordinates};

/// What happened to one registry entry during a pass.
#[derive(Debug)]
pub enum PassEntry {
    Synced {
        coords: RemoteCoordinates,
        result: SyncResult,
    },
    /// The stored reference does not parse; nothing was synced.
    Invalid {
        name: String,
        url: String,
        error: ParseError,
    },
}

impl PassEntry {
    pub fn name(&self) -> &str {
        match self {
            PassEntry::Synced { coords, .. } => coords.name(),
            PassEntry::Invalid { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PassEntry::Synced { result, .. } if result.is_updated())
    }
}

/// Summary of a completed pass, entries in registry order.
#[derive(Debug)]
pub struct PassReport {
    pub entries: Vec<PassEntry>,
    pub removed: Vec<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_success()).count()
    }
}

/// Result of `ensure_fresh`.
#[derive(Debug)]
pub enum EnsureOutcome {
    /// The cache was refreshed recently enough.
    Fresh,
    /// The user agreed and a pass ran.
    Refreshed(PassReport),
    /// The cache was never populated and the user declined to update it.
    Declined,
    /// The cache is outdated but usable.
    ProceedStale { since: DateTime<Utc> },
    /// The cache was never populated and nobody can be asked.
    MustUpdate,
}

fn lock_error(err: LockError, paths: &CachePaths) -> RepoError {
    match err {
        LockError::Busy { holder } => RepoError::UpdateInProgress {
            lock: paths.lock_path(),
            holder,
        },
        LockError::Io(err) => RepoError::Io(err),
    }
}

/// Run one full refresh pass over every registered repository.
///
/// Per-repository failures are recorded in the report and do not stop the
/// pass. Fails with `UpdateInProgress` when another pass holds the lock past
/// the context's timeout, and with `Cancelled` when the cancel flag is raised.
pub fn update(ctx: &Context) -> Result<PassReport, RepoError> {
    let paths = ctx.paths();
    let _lock = UpdateLock::acquire(&paths.lock_path(), ctx.lock_timeout())
        .map_err(|e| lock_error(e, paths))?;

    let repos = ctx.store().load()?;
    let parsed: Vec<Result<RemoteCoordinates, (String, String, ParseError)>> = repos
        .iter()
        .map(|(name, url)| {
            RemoteCoordinates::parse(url, Some(name), paths)
                .map_err(|error| (name.clone(), url.clone(), error))
        })
        .collect();

    let targets: Vec<&RemoteCoordinates> = parsed.iter().filter_map(|p| p.as_ref().ok()).collect();
    let in_use: HashSet<CacheKey> = targets.iter().map(|c| c.key().clone()).collect();

    log::info!(
        "refreshing {} repositories with {} worker(s)",
        targets.len(),
        ctx.jobs()
    );
    let mut results = sync_all(ctx, &targets).into_iter();

    if ctx.is_cancelled() {
        log::warn!("refresh cancelled, skipping cleanup");
        return Err(RepoError::Cancelled);
    }

    let mut entries = Vec::with_capacity(parsed.len());
    for entry in parsed {
        entries.push(match entry {
            Ok(coords) => match results.next().flatten() {
                Some(result) => PassEntry::Synced { coords, result },
                // Only skipped when cancelled, handled above.
                None => return Err(RepoError::Cancelled),
            },
            Err((name, url, error)) => {
                log::warn!("skipping {}: invalid reference {}: {}", name, url, error);
                PassEntry::Invalid { name, url, error }
            }
        });
    }

    let removed = gc::collect(paths.root(), &in_use);

    let finished_at = Utc::now();
    StalenessTracker::new(paths).record_success(finished_at)?;
    log::info!(
        "refresh finished: {} failed, {} cache entries removed",
        entries.iter().filter(|e| !e.is_success()).count(),
        removed.len()
    );

    Ok(PassReport {
        entries,
        removed,
        finished_at,
    })
}

fn sync_one(synchronizer: &Synchronizer<'_>, coords: &RemoteCoordinates) -> SyncResult {
    log::debug!("syncing {}", coords);
    let result = synchronizer.sync(coords);
    match &result {
        SyncResult::Updated { commit } => log::info!(
            "updated {} ({})",
            coords.name(),
            commit.as_deref().unwrap_or("unknown commit")
        ),
        SyncResult::Failed(err) => log::warn!("failed to sync {}: {}", coords.name(), err),
    }
    result
}

/// Sync `targets`, returning results in input order. Entries left `None`
/// were never started because the pass was cancelled.
fn sync_all(ctx: &Context, targets: &[&RemoteCoordinates]) -> Vec<Option<SyncResult>> {
    let synchronizer = Synchronizer::new(ctx.transport()).with_strategy(ctx.strategy());
    let mut results: Vec<Option<SyncResult>> = targets.iter().map(|_| None).collect();

    if targets.is_empty() {
        return results;
    }

    let workers = ctx.jobs().min(targets.len());
    if workers <= 1 {
        for (slot, coords) in results.iter_mut().zip(targets) {
            if ctx.is_cancelled() {
                break;
            }
            *slot = Some(sync_one(&synchronizer, coords));
        }
        return results;
    }

    // Entries sharing a mirror stay on one worker, in registry order.
    let mut groups: Vec<Vec<(usize, &RemoteCoordinates)>> = Vec::new();
    let mut group_of: HashMap<&CacheKey, usize> = HashMap::new();
    for (index, coords) in targets.iter().copied().enumerate() {
        let group = *group_of.entry(coords.key()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push((index, coords));
    }

    let (work_tx, work_rx) = bounded(groups.len());
    for group in groups {
        let _ = work_tx.send(group);
    }
    drop(work_tx);

    let (done_tx, done_rx) = unbounded();
    let cancel = ctx.cancel_flag();
    thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let synchronizer = &synchronizer;
            let cancel = &cancel;
            scope.spawn(move || {
                for group in work_rx.iter() {
                    for (index, coords) in group {
                        if cancel.load(Ordering::SeqCst) {
                            return;
                        }
                        let _ = done_tx.send((index, sync_one(synchronizer, coords)));
                    }
                }
            });
        }
    });
    drop(done_tx);

    for (index, result) in done_rx.iter() {
        results[index] = Some(result);
    }
    results
}

/// Make sure the cache is usable, refreshing it when the user agrees.
///
/// Never prompts in non-interactive mode.
pub fn ensure_fresh(ctx: &Context, now: DateTime<Utc>) -> Result<EnsureOutcome, RepoError> {
    let status = StalenessTracker::new(ctx.paths()).status(now);
    let interactive = ctx.mode().is_interactive();

    match status {
        Staleness::Fresh => Ok(EnsureOutcome::Fresh),
        Staleness::NeverUpdated if !interactive => Ok(EnsureOutcome::MustUpdate),
        Staleness::NeverUpdated => {
            let question = "The repo cache has never been updated, update it now to fetch the latest model list?";
            if ctx.prompter().confirm(question)? {
                Ok(EnsureOutcome::Refreshed(update(ctx)?))
            } else {
                Ok(EnsureOutcome::Declined)
            }
        }
        Staleness::StaleSince(since) if !interactive => Ok(EnsureOutcome::ProceedStale { since }),
        Staleness::StaleSince(since) => {
            let question = "The repo cache is outdated, update it now to fetch the latest model list?";
            if ctx.prompter().confirm(question)? {
                Ok(EnsureOutcome::Refreshed(update(ctx)?))
            } else {
                Ok(EnsureOutcome::ProceedStale { since })
            }
        }
    }
}
