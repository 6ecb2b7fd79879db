use serde::{Deserialize, Serialize};

/// Options shared by every file backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    /// Fill the temporary file through a memory map instead of `write`.
    pub write_mmap: bool,
    /// fsync the temporary file and record a journal marker before the rename.
    pub use_journal: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            write_mmap: false,
            use_journal: true,
        }
    }
}

/// Options for the JSON file backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    pub write_mmap: bool,
    pub use_journal: bool,
    /// Accept `//` and `/* */` comments when loading.
    pub allow_comments: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            write_mmap: false,
            use_journal: true,
            allow_comments: false,
        }
    }
}

impl JsonOptions {
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            write_mmap: self.write_mmap,
            use_journal: self.use_journal,
        }
    }
}

/// Options for the TOML file backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlOptions {
    pub write_mmap: bool,
    pub use_journal: bool,
    /// Write keys in declared order instead of sorted order.
    pub preserve_order: bool,
    /// Reject TOML values with no Arbor counterpart (datetimes) when loading.
    pub strict_types: bool,
}

impl Default for TomlOptions {
    fn default() -> Self {
        Self {
            write_mmap: false,
            use_journal: true,
            preserve_order: false,
            strict_types: true,
        }
    }
}

impl TomlOptions {
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            write_mmap: self.write_mmap,
            use_journal: self.use_journal,
        }
    }
}
