use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::prompt::PromptError;
use crate::registry::StoreError;
use crate::types::{NameError, ParseError};

/// Errors surfaced by registry operations and refresh passes.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("invalid repo reference `{reference}`: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: ParseError,
    },

    #[error(
        "invalid repo name `{name}`: {source} (names may only contain letters, digits and underscores)"
    )]
    InvalidName {
        name: String,
        #[source]
        source: NameError,
    },

    #[error("repo `{0}` does not exist")]
    UnknownRepo(String),

    #[error("config error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error(
        "another update is already running ({}lock {})",
        .holder.map(|pid| format!("pid {}, ", pid)).unwrap_or_default(),
        .lock.display()
    )]
    UpdateInProgress { lock: PathBuf, holder: Option<u32> },

    #[error("update cancelled")]
    Cancelled,
}
