//! Everything an operation needs from its environment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cache::{CachePaths, DEFAULT_LOCK_TIMEOUT, GitCli, GitTransport, SyncStrategy};
use crate::prompt::{Mode, Prompter, TerminalPrompter};
use crate::registry::RegistryStore;

/// Shared state for registry operations and refresh passes.
///
/// Defaults to non-interactive, the system `git`, one worker and the reclone
/// strategy.
pub struct Context {
    paths: CachePaths,
    store: Box<dyn RegistryStore>,
    mode: Mode,
    prompter: Box<dyn Prompter>,
    transport: Box<dyn GitTransport>,
    jobs: usize,
    strategy: SyncStrategy,
    lock_timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl Context {
    pub fn new(paths: CachePaths, store: impl RegistryStore + 'static) -> Self {
        Self {
            paths,
            store: Box::new(store),
            mode: Mode::NonInteractive,
            prompter: Box::new(TerminalPrompter),
            transport: Box::new(GitCli::new()),
            jobs: 1,
            strategy: SyncStrategy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    pub fn with_transport(mut self, transport: impl GitTransport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Number of repositories synced at once. Zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    pub fn store(&self) -> &dyn RegistryStore {
        self.store.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    pub fn transport(&self) -> &dyn GitTransport {
        self.transport.as_ref()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Flag that stops a running pass from starting new repositories.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
