pub mod cache;
pub mod context;
pub mod error;
pub mod prompt;
pub mod refresh;
pub mod registry;
pub mod types;

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};

use crate::cache::{CachePaths, GitCli, Staleness, StalenessTracker, SyncResult, SyncStrategy};
use crate::context::Context;
use crate::prompt::Mode;
use crate::refresh::{EnsureOutcome, PassEntry, PassReport};
use crate::registry::{AddOutcome, JsonFileStore, ListedRepo};

#[derive(Parser)]
#[command(
    name = "modelrepo",
    about = "Manage the local cache of model catalog repositories"
)]
struct Cli {
    /// Cache root directory
    #[arg(long, global = true, env = "MODELREPO_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Registry config file
    #[arg(long, global = true, env = "MODELREPO_CONFIG")]
    config: Option<PathBuf>,

    /// Never prompt; print warnings instead
    #[arg(
        long,
        global = true,
        env = "MODELREPO_NON_INTERACTIVE",
        value_parser = FalseyValueParser::new()
    )]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered repositories
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Register a repository
    Add {
        /// Short name, letters, digits and underscores
        name: String,
        /// git+https://<host>/<owner>/<repo>[@<branch>]
        reference: String,
        /// Replace an existing entry without asking
        #[arg(long)]
        force: bool,
    },

    /// Unregister a repository
    Remove {
        name: String,
    },

    /// Refresh every registered repository and clean up the cache
    Update {
        /// Repositories synced at once
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
        /// Fetch into existing mirrors instead of recloning
        #[arg(long)]
        incremental: bool,
    },

    /// Update the cache if it is missing or outdated
    Ensure,

    /// Check dependencies and cache state
    Doctor,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let paths = cli
        .cache_dir
        .clone()
        .map(CachePaths::new)
        .unwrap_or_default();
    let store = cli
        .config
        .clone()
        .map(JsonFileStore::new)
        .unwrap_or_default();
    let ctx = Context::new(paths, store.clone()).with_mode(Mode::detect(cli.non_interactive));

    let result = match cli.command {
        Commands::List { json } => cmd_list(&ctx, json),
        Commands::Add {
            name,
            reference,
            force,
        } => cmd_add(&ctx, &name, &reference, force),
        Commands::Remove { name } => cmd_remove(&ctx, &name),
        Commands::Update { jobs, incremental } => {
            let strategy = if incremental {
                SyncStrategy::Incremental
            } else {
                SyncStrategy::Reclone
            };
            cmd_update(ctx.with_jobs(jobs).with_strategy(strategy))
        }
        Commands::Ensure => cmd_ensure(&ctx),
        Commands::Doctor => cmd_doctor(&ctx, &store),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Let Ctrl-C stop a pass between repositories.
fn install_cancel_handler(ctx: &Context) {
    let cancel = ctx.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        if !cancel.swap(true, Ordering::SeqCst) {
            eprintln!("Cancelling, waiting for running clones to finish...");
        }
    }) {
        log::warn!("failed to install Ctrl-C handler: {}", e);
    }
}

fn cmd_list(ctx: &Context, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let repos = registry::list(ctx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&repos)?);
        return Ok(());
    }

    if repos.is_empty() {
        println!("No repositories registered");
        return Ok(());
    }

    println!(
        "{:<16} {:<44} {:<12} {:>12}",
        "NAME", "REMOTE", "BRANCH", "COMMIT"
    );
    println!("{}", "-".repeat(87));

    for repo in &repos {
        match repo {
            ListedRepo::Parsed {
                coords,
                cached,
                commit,
            } => {
                let commit = match (*cached, commit) {
                    (_, Some(commit)) => short_commit(commit).to_string(),
                    (true, None) => "cached".to_string(),
                    (false, None) => "not cached".to_string(),
                };
                println!(
                    "{:<16} {:<44} {:<12} {:>12}",
                    coords.name(),
                    coords.key().to_string(),
                    coords.branch(),
                    commit
                );
            }
            ListedRepo::Invalid { name, url, error } => {
                println!("{:<16} invalid reference {} ({})", name, url, error);
            }
        }
    }

    Ok(())
}

fn cmd_add(
    ctx: &Context,
    name: &str,
    reference: &str,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = name.to_lowercase();
    match registry::add(ctx, &name, reference, force)? {
        AddOutcome::Added => println!("Repo {} added", name),
        AddOutcome::Replaced => println!("Repo {} replaced", name),
        AddOutcome::Unchanged => {
            println!("Repo {} unchanged", name);
            return Ok(());
        }
    }
    println!("Run `modelrepo update` to fetch it");
    Ok(())
}

fn cmd_remove(ctx: &Context, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reference = registry::remove(ctx, name)?;
    println!("Repo {} removed ({})", name.to_lowercase(), reference);
    Ok(())
}

fn cmd_update(ctx: Context) -> Result<(), Box<dyn std::error::Error>> {
    install_cancel_handler(&ctx);
    println!("Updating repositories...");
    let report = refresh::update(&ctx)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &PassReport) {
    for entry in &report.entries {
        match entry {
            PassEntry::Synced {
                coords,
                result: SyncResult::Updated { commit },
            } => println!(
                "  [OK]   {} ({}@{}) {}",
                coords.name(),
                coords.key(),
                coords.branch(),
                commit.as_deref().map(short_commit).unwrap_or("")
            ),
            PassEntry::Synced {
                coords,
                result: SyncResult::Failed(err),
            } => eprintln!("  [FAIL] Failed to sync repo {}: {}", coords.name(), err),
            PassEntry::Invalid { name, url, error } => {
                eprintln!("  [FAIL] Invalid repo {} ({}): {}", name, url, error)
            }
        }
    }

    for path in &report.removed {
        println!("  Removed unused cache entry {}", path.display());
    }

    let failures = report.failures();
    if failures == 0 {
        println!("Repos updated");
    } else {
        println!(
            "Repos updated, {} of {} failed",
            failures,
            report.entries.len()
        );
    }
}

fn cmd_ensure(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    install_cancel_handler(ctx);

    match refresh::ensure_fresh(ctx, Utc::now())? {
        EnsureOutcome::Fresh => println!("Repo cache is up to date"),
        EnsureOutcome::Refreshed(report) => print_report(&report),
        EnsureOutcome::Declined => println!("Continuing without a repo cache"),
        EnsureOutcome::ProceedStale { since } => {
            eprintln!(
                "Warning: the repo cache is outdated (last updated {} ago), run `modelrepo update` to fetch the latest model list",
                format_age(since)
            );
        }
        EnsureOutcome::MustUpdate => {
            eprintln!(
                "Error: the repo cache has never been updated, run `modelrepo update` to fetch the latest model list"
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

fn cmd_doctor(ctx: &Context, store: &JsonFileStore) -> Result<(), Box<dyn std::error::Error>> {
    println!("modelrepo System Check\n");

    let git_version = GitCli::new().version();
    println!(
        "[{}] git: {}",
        if git_version.is_some() { "OK" } else { "FAIL" },
        git_version.as_deref().unwrap_or("not found")
    );

    let root = ctx.paths().root();
    println!(
        "[{}] Cache dir: {}",
        if root.is_dir() { "OK" } else { "INFO" },
        root.display()
    );

    let config_ok = store.path().exists();
    println!(
        "[{}] Config: {}{}",
        if config_ok { "OK" } else { "INFO" },
        store.path().display(),
        if config_ok { "" } else { " (not created yet)" }
    );

    let repos = registry::list(ctx)?;
    let invalid = repos
        .iter()
        .filter(|r| matches!(r, ListedRepo::Invalid { .. }))
        .count();
    println!(
        "[{}] Repos: {} registered, {} invalid",
        if invalid == 0 { "OK" } else { "WARN" },
        repos.len(),
        invalid
    );

    let status = match StalenessTracker::new(ctx.paths()).status(Utc::now()) {
        Staleness::Fresh => ("OK", "fresh".to_string()),
        Staleness::NeverUpdated => ("WARN", "never updated".to_string()),
        Staleness::StaleSince(since) => ("WARN", format!("outdated, last updated {} ago", format_age(since))),
    };
    println!("[{}] Last update: {}", status.0, status.1);

    if git_version.is_none() {
        std::process::exit(1);
    }

    Ok(())
}

fn short_commit(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

fn format_age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0) as u64;
    format_duration(secs)
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
