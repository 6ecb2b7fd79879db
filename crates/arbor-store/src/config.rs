//! Declarative store configuration, loaded from TOML.
//!
//! ```toml
//! backend = "json"
//! path = "data/app.json"
//!
//! [json]
//! allow_comments = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use arbor_persist::{BackendKind, JsonOptions, TomlOptions};
use arbor_types::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::factory::{make_in_memory_store, make_json_file_store, make_toml_file_store};
use crate::store::Store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Backing file. Required for `json` and `toml`, ignored for `memory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub json: JsonOptions,
    #[serde(default)]
    pub toml: TomlOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: None,
            json: JsonOptions::default(),
            toml: TomlOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Json,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn toml(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Toml,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Parse {
            format: "config",
            reason: e.to_string(),
        })
    }

    /// Read a configuration file. Relative store paths are taken relative
    /// to the directory holding the configuration file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(store_path), Some(dir)) = (&config.path, path.parent()) {
            if store_path.is_relative() {
                config.path = Some(dir.join(store_path));
            }
        }
        debug!(config = %path.display(), backend = %config.backend, "loaded store config");
        Ok(config)
    }
}

/// Open the store `config` describes.
pub fn open_store(config: &StoreConfig) -> StoreResult<Store> {
    let require_path = || {
        config.path.as_deref().ok_or_else(|| {
            StoreError::InvalidArgument(format!("{} backend requires a path", config.backend))
        })
    };

    match config.backend {
        BackendKind::Json => make_json_file_store(require_path()?, config.json.clone()),
        BackendKind::Toml => make_toml_file_store(require_path()?, config.toml.clone()),
        BackendKind::Memory => make_in_memory_store(),
    }
}
