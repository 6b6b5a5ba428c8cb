// src/config.rs

use crate::downloader::DownloadSettings;
use crate::editions::{Edition, EditionRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no editions configured")]
    NoEditions,
}

/// Application settings, read from a JSON file with environment overrides.
///
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Edition used when a caller does not name one.
    pub default_edition: String,
    /// Replaces the built-in edition table when non-empty.
    pub editions: Vec<Edition>,
    pub download: DownloadSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("mushaf.db"),
            cache_dir: PathBuf::from("page-cache"),
            default_edition: "madani".to_owned(),
            editions: Vec::new(),
            download: DownloadSettings::default(),
        }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise starts from defaults, then
    /// applies `MUSHAF_DB`, `MUSHAF_CACHE_DIR` and `MUSHAF_EDITION`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db) = var("MUSHAF_DB") {
            self.db_path = PathBuf::from(db);
        }
        if let Some(dir) = var("MUSHAF_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(edition) = var("MUSHAF_EDITION") {
            self.default_edition = edition;
        }
    }

    pub fn registry(&self) -> Result<EditionRegistry, ConfigError> {
        if self.editions.is_empty() {
            return Ok(EditionRegistry::builtin().with_default(&self.default_edition));
        }
        EditionRegistry::new(self.editions.clone(), &self.default_edition).ok_or(ConfigError::NoEditions)
    }
}
