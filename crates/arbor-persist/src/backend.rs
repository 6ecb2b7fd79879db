//! The closed set of persistence backends.

use std::fmt;
use std::path::{Path, PathBuf};

use arbor_tree::NodeTable;
use arbor_types::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::atomic::AtomicFile;
#[cfg(any(test, feature = "failpoints"))]
use crate::atomic::WriteStage;
use crate::journal::RecoveryOutcome;
use crate::options::{JsonOptions, TomlOptions};
use crate::{json_codec, toml_codec};

/// Which backend a store uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Json,
    Toml,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable home of a store's committed tree.
#[derive(Debug)]
pub enum Backend {
    Json {
        file: AtomicFile,
        options: JsonOptions,
    },
    Toml {
        file: AtomicFile,
        options: TomlOptions,
    },
    /// Keeps a copy of the last committed tree; nothing is serialized.
    Memory { saved: Option<NodeTable> },
}

impl Backend {
    pub fn json(path: impl Into<PathBuf>, options: JsonOptions) -> Self {
        let file = AtomicFile::new(path, options.write_options());
        Self::Json { file, options }
    }

    pub fn toml(path: impl Into<PathBuf>, options: TomlOptions) -> Self {
        let file = AtomicFile::new(path, options.write_options());
        Self::Toml { file, options }
    }

    pub fn memory() -> Self {
        Self::Memory { saved: None }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Json { .. } => BackendKind::Json,
            Self::Toml { .. } => BackendKind::Toml,
            Self::Memory { .. } => BackendKind::Memory,
        }
    }

    /// Target file, if this backend writes one.
    pub fn path(&self) -> Option<&Path> {
        self.file().map(AtomicFile::target)
    }

    /// Point a file backend at a different target. No-op for memory.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        if let Some(file) = self.file_mut() {
            file.set_target(path);
        }
    }

    /// Make durable writes fail at `stage` (or stop failing on `None`).
    #[cfg(any(test, feature = "failpoints"))]
    pub fn inject_fault(&mut self, stage: Option<WriteStage>) {
        if let Some(file) = self.file_mut() {
            file.inject_fault(stage);
        }
    }

    /// Load the committed tree, allocating from generation `stamp` onward.
    ///
    /// File backends first recover from any interrupted write. A missing
    /// file yields an empty root object; the file is created on first
    /// [`persist`](Self::persist).
    pub fn load(&mut self, stamp: u32) -> StoreResult<NodeTable> {
        if let Some(file) = self.file() {
            let outcome = file.recover()?;
            if outcome != RecoveryOutcome::Clean {
                info!(path = %file.target().display(), ?outcome, "recovered interrupted write");
            }
        }

        let table = match self {
            Self::Json { file, options } => match file.read()? {
                Some(bytes) => json_codec::decode(&utf8(bytes, "JSON")?, options, stamp)?,
                None => NodeTable::with_stamp(stamp),
            },
            Self::Toml { file, options } => match file.read()? {
                Some(bytes) => toml_codec::decode(&utf8(bytes, "TOML")?, options, stamp)?,
                None => NodeTable::with_stamp(stamp),
            },
            Self::Memory { saved } => match saved {
                Some(saved) => saved.rebuild(stamp)?,
                None => NodeTable::with_stamp(stamp),
            },
        };

        debug!(backend = %self.kind(), nodes = table.len(), "loaded tree");
        Ok(table)
    }

    /// Durably store `table` as the committed tree.
    ///
    /// Serialization happens before any file is touched, so a tree that
    /// cannot be encoded never disturbs the previous file.
    pub fn persist(&mut self, table: &NodeTable) -> StoreResult<()> {
        match self {
            Self::Json { file, .. } => {
                let text = json_codec::encode(table)?;
                file.write(text.as_bytes())
            }
            Self::Toml { file, options } => {
                let text = toml_codec::encode(table, options)?;
                file.write(text.as_bytes())
            }
            Self::Memory { saved } => {
                *saved = Some(table.clone());
                Ok(())
            }
        }
    }

    fn file(&self) -> Option<&AtomicFile> {
        match self {
            Self::Json { file, .. } | Self::Toml { file, .. } => Some(file),
            Self::Memory { .. } => None,
        }
    }

    fn file_mut(&mut self) -> Option<&mut AtomicFile> {
        match self {
            Self::Json { file, .. } | Self::Toml { file, .. } => Some(file),
            Self::Memory { .. } => None,
        }
    }
}

fn utf8(bytes: Vec<u8>, format: &'static str) -> StoreResult<String> {
    String::from_utf8(bytes).map_err(|e| StoreError::Parse {
        format,
        reason: format!("file is not valid UTF-8: {e}"),
    })
}
