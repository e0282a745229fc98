//! Listing, adding and removing registered repositories.
//!
//! These operations only touch the config store. Mirrors of removed or
//! replaced repositories stay in the cache until the next refresh pass
//! collects them.

mod store;

pub use store::{
    DEFAULT_REPO_NAME, DEFAULT_REPO_REFERENCE, JsonFileStore, Registry, RegistryStore, StoreError,
    default_registry,
};

#[cfg(test)]
pub(crate) use store::memory::MemoryStore;

use serde::Serialize;

use crate::cache::head_commit;
use crate::context::Context;
use crate::error::RepoError;
use crate::types::{ParseError, RemoteCoordinates, RepoName};

/// One registry entry as shown by `list`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListedRepo {
    Parsed {
        #[serde(flatten)]
        coords: RemoteCoordinates,
        cached: bool,
        commit: Option<String>,
    },
    /// A stored reference that no longer parses.
    Invalid {
        name: String,
        url: String,
        #[serde(serialize_with = "serialize_display")]
        error: ParseError,
    },
}

fn serialize_display<S: serde::Serializer>(
    value: &ParseError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl ListedRepo {
    pub fn name(&self) -> &str {
        match self {
            ListedRepo::Parsed { coords, .. } => coords.name(),
            ListedRepo::Invalid { name, .. } => name,
        }
    }
}

/// Result of `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Replaced,
    /// The registry was not modified: same reference, or replacement declined.
    Unchanged,
}

/// Every registered repository in name order, with its mirror state.
pub fn list(ctx: &Context) -> Result<Vec<ListedRepo>, RepoError> {
    let repos = ctx.store().load()?;

    Ok(repos
        .iter()
        .map(
            |(name, url)| match RemoteCoordinates::parse(url, Some(name), ctx.paths()) {
                Ok(coords) => {
                    let commit = head_commit(coords.path()).ok();
                    ListedRepo::Parsed {
                        cached: coords.path().is_dir(),
                        coords,
                        commit,
                    }
                }
                Err(error) => ListedRepo::Invalid {
                    name: name.clone(),
                    url: url.clone(),
                    error,
                },
            },
        )
        .collect())
}

/// Register `reference` under `name`.
///
/// Replacing an existing entry with a different reference needs `force` or,
/// in interactive mode, a confirmation.
pub fn add(
    ctx: &Context,
    name: &str,
    reference: &str,
    force: bool,
) -> Result<AddOutcome, RepoError> {
    let name: RepoName = name.parse().map_err(|source| RepoError::InvalidName {
        name: name.to_string(),
        source,
    })?;
    RemoteCoordinates::parse(reference, Some(name.as_str()), ctx.paths()).map_err(|source| {
        RepoError::InvalidReference {
            reference: reference.to_string(),
            source,
        }
    })?;

    let mut repos = ctx.store().load()?;
    let outcome = match repos.get(name.as_str()) {
        None => AddOutcome::Added,
        Some(existing) if existing == reference => return Ok(AddOutcome::Unchanged),
        Some(existing) => {
            let replace = if force {
                true
            } else if ctx.mode().is_interactive() {
                ctx.prompter().confirm(&format!(
                    "Repo `{}` already exists ({}), override?",
                    name, existing
                ))?
            } else {
                log::warn!(
                    "repo `{}` already exists ({}), pass --force to replace it",
                    name,
                    existing
                );
                false
            };
            if !replace {
                return Ok(AddOutcome::Unchanged);
            }
            AddOutcome::Replaced
        }
    };

    repos.insert(name.as_str().to_string(), reference.to_string());
    ctx.store().save(&repos)?;
    log::info!("registered {} -> {}", name, reference);
    Ok(outcome)
}

/// Unregister `name`, returning the reference it pointed at.
///
/// A key stored exactly as given wins over its lowercase form, so entries
/// written by hand with capitals can still be removed.
pub fn remove(ctx: &Context, name: &str) -> Result<String, RepoError> {
    let mut repos = ctx.store().load()?;

    let key = if repos.contains_key(name) {
        name.to_string()
    } else {
        name.to_lowercase()
    };
    let reference = repos
        .remove(&key)
        .ok_or_else(|| RepoError::UnknownRepo(key.clone()))?;
    ctx.store().save(&repos)?;
    log::info!("removed {}", key);
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CachePaths;
    use crate::cache::fixtures::{commit_file, init_origin};
    use crate::prompt::Mode;
    use crate::prompt::scripted::ScriptedPrompter;
    use tempfile::{TempDir, tempdir};

    const BENTOVLLM: &str = "git+https://github.com/bojiang/bentovllm@main";
    const NIGHTLY: &str = "git+https://github.com/bentoml/openllm-models@nightly";

    fn context(dir: &TempDir, entries: &[(&str, &str)]) -> Context {
        tracked(dir, entries).0
    }

    /// Context whose store can still be inspected by the test.
    fn tracked(dir: &TempDir, entries: &[(&str, &str)]) -> (Context, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with(entries));
        let ctx = Context::new(CachePaths::new(dir.path()), Arc::clone(&store));
        (ctx, store)
    }

    fn interactive(
        dir: &TempDir,
        entries: &[(&str, &str)],
        answers: &[bool],
    ) -> (Context, Arc<ScriptedPrompter>, Arc<MemoryStore>) {
        let prompter = Arc::new(ScriptedPrompter::answering(answers));
        let (ctx, store) = tracked(dir, entries);
        let ctx = ctx
            .with_mode(Mode::Interactive)
            .with_prompter(Arc::clone(&prompter));
        (ctx, prompter, store)
    }

    #[test]
    fn add_lowercases_name() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[]);

        assert_eq!(add(&ctx, "My_Repo", BENTOVLLM, false).unwrap(), AddOutcome::Added);

        let repos = ctx.store().load().unwrap();
        assert_eq!(repos.get("my_repo").map(String::as_str), Some(BENTOVLLM));
        assert!(!repos.contains_key("My_Repo"));
    }

    #[test]
    fn add_rejects_non_identifier_names() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[]);

        for bad in ["1bad", "", "has-dash", "a b"] {
            let err = add(&ctx, bad, BENTOVLLM, false).unwrap_err();
            assert!(matches!(err, RepoError::InvalidName { .. }), "{bad}: {err}");
        }
        assert!(ctx.store().load().unwrap().is_empty());
    }

    #[test]
    fn add_rejects_invalid_reference_without_mutation() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[("default", BENTOVLLM)]);

        let err = add(&ctx, "other", "not-a-git-url", false).unwrap_err();

        assert!(matches!(
            err,
            RepoError::InvalidReference {
                source: ParseError::MissingScheme,
                ..
            }
        ));
        assert_eq!(ctx.store().load().unwrap().len(), 1);
    }

    #[test]
    fn add_same_reference_is_unchanged_without_prompting() {
        let dir = tempdir().unwrap();
        let (ctx, prompter, store) = interactive(&dir, &[("default", BENTOVLLM)], &[]);

        assert_eq!(add(&ctx, "Default", BENTOVLLM, false).unwrap(), AddOutcome::Unchanged);
        assert!(prompter.asked().is_empty());
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn add_existing_asks_before_replacing() {
        let dir = tempdir().unwrap();
        let (ctx, prompter, _store) = interactive(&dir, &[("default", BENTOVLLM)], &[true]);

        assert_eq!(add(&ctx, "default", NIGHTLY, false).unwrap(), AddOutcome::Replaced);

        assert_eq!(
            prompter.asked(),
            vec![format!("Repo `default` already exists ({}), override?", BENTOVLLM)]
        );
        assert_eq!(ctx.store().load().unwrap()["default"], NIGHTLY);
    }

    #[test]
    fn declining_replacement_keeps_registry() {
        let dir = tempdir().unwrap();
        let (ctx, _prompter, store) = interactive(&dir, &[("default", BENTOVLLM)], &[false]);

        assert_eq!(add(&ctx, "default", NIGHTLY, false).unwrap(), AddOutcome::Unchanged);
        assert_eq!(store.snapshot()["default"], BENTOVLLM);
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn non_interactive_never_prompts() {
        let dir = tempdir().unwrap();
        let prompter = Arc::new(ScriptedPrompter::answering(&[]));
        let ctx = context(&dir, &[("default", BENTOVLLM)]).with_prompter(Arc::clone(&prompter));

        assert_eq!(add(&ctx, "default", NIGHTLY, false).unwrap(), AddOutcome::Unchanged);
        assert_eq!(ctx.store().load().unwrap()["default"], BENTOVLLM);

        assert_eq!(add(&ctx, "default", NIGHTLY, true).unwrap(), AddOutcome::Replaced);
        assert_eq!(ctx.store().load().unwrap()["default"], NIGHTLY);

        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[("default", BENTOVLLM), ("nightly", NIGHTLY)]);

        assert_eq!(remove(&ctx, "NIGHTLY").unwrap(), NIGHTLY);

        let repos = ctx.store().load().unwrap();
        assert_eq!(repos.keys().collect::<Vec<_>>(), vec!["default"]);
    }

    #[test]
    fn remove_unknown_leaves_registry_unchanged() {
        let dir = tempdir().unwrap();
        let (ctx, store) = tracked(&dir, &[("default", BENTOVLLM)]);

        let err = remove(&ctx, "nonexistent").unwrap_err();

        assert!(matches!(err, RepoError::UnknownRepo(name) if name == "nonexistent"));
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn remove_finds_hand_edited_capitalized_key() {
        let dir = tempdir().unwrap();
        let (ctx, store) = tracked(&dir, &[("MyRepo", BENTOVLLM), ("default", NIGHTLY)]);

        assert_eq!(remove(&ctx, "MyRepo").unwrap(), BENTOVLLM);

        assert_eq!(store.snapshot().keys().collect::<Vec<_>>(), vec!["default"]);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn remove_does_not_touch_the_cache() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[("default", BENTOVLLM)]);
        let mirror = dir.path().join("github.com").join("bojiang").join("bentovllm");
        std::fs::create_dir_all(&mirror).unwrap();

        remove(&ctx, "default").unwrap();

        assert!(mirror.is_dir());
    }

    #[test]
    fn list_is_sorted_and_tolerates_bad_entries() {
        let dir = tempdir().unwrap();
        let ctx = context(
            &dir,
            &[("zeta", NIGHTLY), ("broken", "https://github.com/a/b"), ("alpha", BENTOVLLM)],
        );

        let listed = list(&ctx).unwrap();

        let names: Vec<&str> = listed.iter().map(ListedRepo::name).collect();
        assert_eq!(names, vec!["alpha", "broken", "zeta"]);
        assert!(matches!(
            &listed[1],
            ListedRepo::Invalid {
                error: ParseError::MissingScheme,
                ..
            }
        ));
        match &listed[2] {
            ListedRepo::Parsed { coords, cached, commit } => {
                assert_eq!(coords.branch(), "nightly");
                assert_eq!(coords.name(), "zeta");
                assert!(!cached);
                assert!(commit.is_none());
            }
            other => panic!("expected parsed entry, got {:?}", other),
        }
    }

    #[test]
    fn list_reports_mirror_head() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[("alpha", BENTOVLLM)]);
        let mirror = dir.path().join("github.com").join("bojiang").join("bentovllm");
        init_origin(&mirror, "main");
        let sha = commit_file(&mirror, "main", "models.yaml", "llama: {}\n");

        let listed = list(&ctx).unwrap();

        match &listed[0] {
            ListedRepo::Parsed { cached, commit, .. } => {
                assert!(cached);
                assert_eq!(commit.as_deref(), Some(sha.as_str()));
            }
            other => panic!("expected parsed entry, got {:?}", other),
        }
    }

    #[test]
    fn listed_repo_serializes_flat() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir, &[("alpha", BENTOVLLM), ("bad", "nope")]);

        let json = serde_json::to_value(list(&ctx).unwrap()).unwrap();

        assert_eq!(json[0]["name"], "alpha");
        assert_eq!(json[0]["host"], "github.com");
        assert_eq!(json[0]["branch"], "main");
        assert_eq!(json[0]["cached"], false);
        assert_eq!(json[1]["url"], "nope");
        assert_eq!(json[1]["error"], "reference must start with 'git+https://'");
    }
}
