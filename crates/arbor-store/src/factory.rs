//! One constructor per backend. Each returns a store that is already open.

use std::path::Path;

use arbor_persist::{Backend, JsonOptions, TomlOptions};
use arbor_types::StoreResult;

use crate::store::Store;

/// Open a store persisted as a JSON file at `path`.
pub fn make_json_file_store(path: impl AsRef<Path>, options: JsonOptions) -> StoreResult<Store> {
    let path = path.as_ref();
    let store = Store::new(Backend::json(path, options));
    store.open(path)?;
    Ok(store)
}

/// Open a store persisted as a TOML file at `path`.
pub fn make_toml_file_store(path: impl AsRef<Path>, options: TomlOptions) -> StoreResult<Store> {
    let path = path.as_ref();
    let store = Store::new(Backend::toml(path, options));
    store.open(path)?;
    Ok(store)
}

/// Open a store that keeps its committed tree in memory only.
pub fn make_in_memory_store() -> StoreResult<Store> {
    let store = Store::new(Backend::memory());
    store.load()?;
    Ok(store)
}
