//! Persistence backends for Arbor.
//!
//! A [`Backend`] turns a committed [`NodeTable`](arbor_tree::NodeTable) into
//! durable state and back. The set of backends is closed:
//!
//! - JSON file ([`JsonOptions`])
//! - TOML file ([`TomlOptions`])
//! - In-memory (keeps the last committed tree, no serialization)
//!
//! # Durable Write Protocol
//!
//! File backends never write the target in place:
//!
//! 1. Serialize the tree and write it to a temporary file in the target's directory.
//! 2. With journaling, fsync the temporary file and record a [`JournalMarker`].
//! 3. Atomically rename the temporary file over the target.
//! 4. Remove the journal.
//!
//! A failure at any step leaves the previous target file exactly as it was.
//! On load, [`AtomicFile::recover`] finishes or discards an interrupted write.

pub mod atomic;
pub mod backend;
pub mod journal;
pub mod json_codec;
pub mod options;
pub mod toml_codec;

pub use atomic::{AtomicFile, WriteStage};
pub use backend::{Backend, BackendKind};
pub use journal::{JournalMarker, RecoveryOutcome};
pub use options::{JsonOptions, TomlOptions, WriteOptions};
