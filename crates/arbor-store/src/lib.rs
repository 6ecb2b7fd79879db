//! Arbor: a transactional, hierarchical document store.
//!
//! A [`Store`] owns a committed tree of objects, arrays, and scalars and
//! persists it through one backend (JSON file, TOML file, or memory). All
//! access goes through a [`Transaction`], which works on a private copy of
//! the tree and either commits it atomically or rolls it back when dropped.
//!
//! ```ignore
//! let store = arbor_store::make_json_file_store("app.json", JsonOptions::default())?;
//! let mut txn = store.begin_transaction()?;
//! let root = txn.root()?;
//! let server = txn.make_object(root, "server")?;
//! txn.make_int(server, "port", 8080)?;
//! txn.commit()?;
//! ```

pub mod config;
pub mod factory;
pub mod store;
pub mod transaction;

pub use config::{open_store, StoreConfig};
pub use factory::{make_in_memory_store, make_json_file_store, make_toml_file_store};
pub use store::Store;
pub use transaction::{ScalarValue, Transaction};

// Re-export the types callers need alongside the store.
pub use arbor_persist::{BackendKind, JsonOptions, TomlOptions, WriteStage};
pub use arbor_types::{ErrorCode, Handle, NodeKind, Scalar, StoreError, StoreResult};
