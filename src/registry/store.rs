//! Persistence of the name → reference registry.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::atomic_write;

/// Registered repositories keyed by lowercase name, iterated in name order.
pub type Registry = BTreeMap<String, String>;

pub const DEFAULT_REPO_NAME: &str = "default";
pub const DEFAULT_REPO_REFERENCE: &str = "git+https://github.com/bentoml/openllm-models@main";

/// The registry used when no config file exists yet.
pub fn default_registry() -> Registry {
    let mut repos = Registry::new();
    repos.insert(
        DEFAULT_REPO_NAME.to_string(),
        DEFAULT_REPO_REFERENCE.to_string(),
    );
    repos
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid config file: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Loads and saves the registry.
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<Registry, StoreError>;
    fn save(&self, repos: &Registry) -> Result<(), StoreError>;
}

impl<S: RegistryStore + ?Sized> RegistryStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Registry, StoreError> {
        (**self).load()
    }

    fn save(&self, repos: &Registry) -> Result<(), StoreError> {
        (**self).save(repos)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_registry")]
    repos: Registry,
    /// Settings owned by other tools sharing the file.
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Registry kept in a JSON config file, `{"repos": {name: reference}}`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/modelrepo/config.json`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modelrepo")
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<ConfigFile>, StoreError> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Registry, StoreError> {
        Ok(match self.read()? {
            Some(config) => config.repos,
            None => {
                log::debug!("no config at {}, using defaults", self.path.display());
                default_registry()
            }
        })
    }

    fn save(&self, repos: &Registry) -> Result<(), StoreError> {
        let extra = match self.read() {
            Ok(Some(config)) => config.extra,
            Ok(None) => serde_json::Map::new(),
            Err(e) => {
                log::warn!("overwriting unreadable config: {}", e);
                serde_json::Map::new()
            }
        };
        let config = ConfigFile {
            repos: repos.clone(),
            extra,
        };

        let mut contents = serde_json::to_vec_pretty(&config).map_err(StoreError::Serialize)?;
        contents.push(b'\n');

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        atomic_write(&self.path, &contents).map_err(write_err)
    }
}
