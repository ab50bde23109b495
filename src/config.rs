//! Persisted configuration: the model to use and the project path.
//!
//! Stored as a small TOML file. Writes go through `toml_edit` so comments
//! and unknown keys survive, and through a temp file so a crash never leaves
//! a half-written config behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Model used when none has been configured.
pub const DEFAULT_MODEL: &str = "llama3.2";

const MODEL_KEY: &str = "model";
const PATH_KEY: &str = "path";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub model: String,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            path: PathBuf::from("."),
        }
    }
}

/// Changes requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub path: Option<PathBuf>,
    /// Restore defaults before applying `model` and `path`.
    pub reset: bool,
}

impl Config {
    /// Apply `overrides` on top of this config.
    pub fn apply(&self, overrides: &Overrides) -> Config {
        let base = if overrides.reset {
            Config::default()
        } else {
            self.clone()
        };

        Config {
            model: overrides.model.clone().unwrap_or(base.model),
            path: overrides.path.clone().unwrap_or(base.path),
        }
    }
}

/// The config file on disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config, returning defaults if the file does not exist.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let Some(doc) = self.read_document()? else {
            debug!("No config at {}, using defaults", self.path.display());
            return Ok(Config::default());
        };

        let defaults = Config::default();
        let model = self.string_key(&doc, MODEL_KEY)?.unwrap_or(defaults.model);
        let path = self
            .string_key(&doc, PATH_KEY)?
            .map(PathBuf::from)
            .unwrap_or(defaults.path);

        Ok(Config { model, path })
    }

    /// Write `config`, keeping any other content of the existing file.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut doc = self.read_document()?.unwrap_or_default();
        doc[MODEL_KEY] = toml_edit::value(config.model.as_str());
        doc[PATH_KEY] = toml_edit::value(config.path.to_string_lossy().into_owned());

        self.write_atomic(&doc.to_string())?;
        info!("Saved config to {}", self.path.display());
        Ok(())
    }

    fn read_document(&self) -> Result<Option<DocumentMut>, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        content
            .parse::<DocumentMut>()
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                path: self.path.clone(),
                reason: format!("Invalid TOML: {}", e),
            })
    }

    fn string_key(&self, doc: &DocumentMut, key: &str) -> Result<Option<String>, ConfigError> {
        match doc.get(key) {
            None => Ok(None),
            Some(item) => item
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| ConfigError::Parse {
                    path: self.path.clone(),
                    reason: format!("'{}' must be a string", key),
                }),
        }
    }

    fn write_atomic(&self, content: &str) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Load the stored config, apply `overrides`, and write back if anything changed.
pub fn resolve(store: &ConfigStore, overrides: &Overrides) -> Result<Config, ConfigError> {
    let stored = store.load()?;
    let config = stored.apply(overrides);

    if overrides.reset || config != stored {
        store.save(&config)?;
    }

    debug!("Using model {} for {}", config.model, config.path.display());
    Ok(config)
}
