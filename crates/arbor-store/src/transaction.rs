//! Scoped unit of work over a store's document tree.

use std::fmt;

use arbor_tree::{navigate, Node, NodeTable};
use arbor_types::{Handle, NodeKind, Scalar, StoreError, StoreResult};
use tracing::debug;

use crate::store::Store;

/// A scalar type usable with [`Transaction::get`] and [`Transaction::set`].
pub trait ScalarValue: Sized {
    /// Node kind this type reads from and writes to.
    const KIND: NodeKind;

    fn from_scalar(scalar: &Scalar) -> Option<Self>;

    fn into_scalar(self) -> Scalar;
}

impl ScalarValue for bool {
    const KIND: NodeKind = NodeKind::Bool;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }
}

impl ScalarValue for i64 {
    const KIND: NodeKind = NodeKind::Int;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Int(self)
    }
}

impl ScalarValue for f64 {
    const KIND: NodeKind = NodeKind::Double;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Double(self)
    }
}

impl ScalarValue for String {
    const KIND: NodeKind = NodeKind::String;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn into_scalar(self) -> Scalar {
        Scalar::String(self)
    }
}

/// Exclusive, scoped access to a private copy of the store's tree.
///
/// Changes become visible to later transactions only through
/// [`commit`](Self::commit). A transaction that is dropped without
/// committing rolls back, so early returns and `?` never leak changes.
///
/// Every operation fails with `InvalidState` once the transaction has been
/// committed or rolled back.
pub struct Transaction<'s> {
    store: &'s Store,
    /// `None` once the transaction has ended.
    working: Option<NodeTable>,
    committed: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s Store, working: NodeTable) -> Self {
        Self {
            store,
            working: Some(working),
            committed: false,
        }
    }

    /// Returns `true` until `commit` or `rollback` ends the transaction.
    pub fn is_active(&self) -> bool {
        self.working.is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    // ---- Lifecycle ----

    /// Make the working tree the store's committed tree and persist it.
    ///
    /// Calling `commit` again, or after `rollback`, fails with
    /// `InvalidState`. If the durable write fails the commit still takes
    /// effect in memory, the previous file is left untouched, and the
    /// write error is returned; [`Store::flush`] retries it.
    pub fn commit(&mut self) -> StoreResult<()> {
        let Some(tree) = self.working.take() else {
            return Err(ended(self.committed));
        };

        self.committed = true;
        let stamp = tree.stamp();
        let result = self.store.install(tree);
        self.store.end_transaction(stamp);
        result
    }

    /// Discard the working tree. Further calls are no-ops.
    pub fn rollback(&mut self) {
        if let Some(tree) = self.working.take() {
            debug!(nodes = tree.len(), "rollback");
            self.store.end_transaction(tree.stamp());
        }
    }

    // ---- Navigation ----

    /// Handle of the root object.
    pub fn root(&self) -> StoreResult<Handle> {
        Ok(self.tree()?.root())
    }

    /// Resolve `path` starting at `base`.
    pub fn navigate(&self, base: Handle, path: &str) -> StoreResult<Handle> {
        navigate(self.tree()?, base, path)
    }

    /// Resolve `key` under the object at `parent`.
    pub fn child(&self, parent: Handle, key: &str) -> StoreResult<Handle> {
        self.tree()?.child(parent, key)
    }

    /// Resolve element `index` of the array at `parent`.
    pub fn element(&self, parent: Handle, index: usize) -> StoreResult<Handle> {
        self.tree()?.element(parent, index)
    }

    pub fn has(&self, parent: Handle, key: &str) -> StoreResult<bool> {
        self.tree()?.has(parent, key)
    }

    pub fn has_element(&self, parent: Handle, index: usize) -> StoreResult<bool> {
        self.tree()?.has_element(parent, index)
    }

    pub fn kind(&self, handle: Handle) -> StoreResult<NodeKind> {
        self.tree()?.kind(handle)
    }

    /// Number of children of an object or elements of an array.
    pub fn len(&self, handle: Handle) -> StoreResult<usize> {
        self.tree()?.child_count(handle)
    }

    /// Keys of the object at `handle` in declared order.
    pub fn keys(&self, handle: Handle) -> StoreResult<Vec<String>> {
        self.tree()?.keys(handle)
    }

    // ---- Scalar reads ----

    pub fn get_bool(&self, handle: Handle) -> StoreResult<bool> {
        self.read(handle)
    }

    pub fn get_int(&self, handle: Handle) -> StoreResult<i64> {
        self.read(handle)
    }

    pub fn get_double(&self, handle: Handle) -> StoreResult<f64> {
        self.read(handle)
    }

    pub fn get_string(&self, handle: Handle) -> StoreResult<String> {
        self.read(handle)
    }

    /// The scalar at `handle`, whatever its kind.
    pub fn value(&self, handle: Handle) -> StoreResult<Scalar> {
        match self.tree()?.get(handle)? {
            Node::Scalar(scalar) => Ok(scalar.clone()),
            other => Err(StoreError::NotScalar {
                actual: other.kind(),
            }),
        }
    }

    /// Read the scalar at `path` below `base`.
    ///
    /// ```ignore
    /// let port: i64 = txn.get(root, "server.database.port")?;
    /// ```
    pub fn get<T: ScalarValue>(&self, base: Handle, path: &str) -> StoreResult<T> {
        let handle = self.navigate(base, path)?;
        self.read(handle)
    }

    // ---- Scalar writes ----

    pub fn set_bool(&mut self, handle: Handle, value: bool) -> StoreResult<()> {
        self.write(handle, value)
    }

    pub fn set_int(&mut self, handle: Handle, value: i64) -> StoreResult<()> {
        self.write(handle, value)
    }

    pub fn set_double(&mut self, handle: Handle, value: f64) -> StoreResult<()> {
        self.write(handle, value)
    }

    pub fn set_string(&mut self, handle: Handle, value: impl Into<String>) -> StoreResult<()> {
        self.write(handle, value.into())
    }

    /// Overwrite the existing scalar at `path` below `base`.
    pub fn set<T: ScalarValue>(&mut self, base: Handle, path: &str, value: T) -> StoreResult<()> {
        let handle = self.navigate(base, path)?;
        self.write(handle, value)
    }

    // ---- Creation ----

    pub fn make_object(&mut self, parent: Handle, key: &str) -> StoreResult<Handle> {
        self.tree_mut()?.insert(parent, key, Node::object())
    }

    pub fn make_array(&mut self, parent: Handle, key: &str) -> StoreResult<Handle> {
        self.tree_mut()?.insert(parent, key, Node::array())
    }

    pub fn make_bool(&mut self, parent: Handle, key: &str, value: bool) -> StoreResult<Handle> {
        self.make(parent, key, Scalar::Bool(value))
    }

    pub fn make_int(&mut self, parent: Handle, key: &str, value: i64) -> StoreResult<Handle> {
        self.make(parent, key, Scalar::Int(value))
    }

    pub fn make_double(&mut self, parent: Handle, key: &str, value: f64) -> StoreResult<Handle> {
        self.make(parent, key, Scalar::Double(value))
    }

    pub fn make_string(
        &mut self,
        parent: Handle,
        key: &str,
        value: impl Into<String>,
    ) -> StoreResult<Handle> {
        self.make(parent, key, Scalar::String(value.into()))
    }

    /// Append a scalar to the array at `array`.
    pub fn push_bool(&mut self, array: Handle, value: bool) -> StoreResult<Handle> {
        self.push(array, Scalar::Bool(value))
    }

    pub fn push_int(&mut self, array: Handle, value: i64) -> StoreResult<Handle> {
        self.push(array, Scalar::Int(value))
    }

    pub fn push_double(&mut self, array: Handle, value: f64) -> StoreResult<Handle> {
        self.push(array, Scalar::Double(value))
    }

    pub fn push_string(&mut self, array: Handle, value: impl Into<String>) -> StoreResult<Handle> {
        self.push(array, Scalar::String(value.into()))
    }

    // ---- Removal ----

    /// Delete `key` and everything below it.
    pub fn remove(&mut self, parent: Handle, key: &str) -> StoreResult<()> {
        self.tree_mut()?.remove(parent, key)
    }

    /// Delete element `index`, shifting later elements down.
    pub fn erase_element(&mut self, parent: Handle, index: usize) -> StoreResult<()> {
        self.tree_mut()?.erase_element(parent, index)
    }

    // ---- Internals ----

    fn tree(&self) -> StoreResult<&NodeTable> {
        let committed = self.committed;
        self.working.as_ref().ok_or_else(|| ended(committed))
    }

    fn tree_mut(&mut self) -> StoreResult<&mut NodeTable> {
        let committed = self.committed;
        self.working.as_mut().ok_or_else(|| ended(committed))
    }

    fn read<T: ScalarValue>(&self, handle: Handle) -> StoreResult<T> {
        let scalar = self.tree()?.scalar(handle, T::KIND)?;
        T::from_scalar(scalar).ok_or(StoreError::TypeMismatch {
            expected: T::KIND,
            actual: scalar.kind(),
        })
    }

    fn write<T: ScalarValue>(&mut self, handle: Handle, value: T) -> StoreResult<()> {
        let scalar = checked(value.into_scalar())?;
        self.tree_mut()?.set_scalar(handle, scalar)
    }

    fn make(&mut self, parent: Handle, key: &str, value: Scalar) -> StoreResult<Handle> {
        let value = checked(value)?;
        self.tree_mut()?.insert(parent, key, Node::Scalar(value))
    }

    fn push(&mut self, array: Handle, value: Scalar) -> StoreResult<Handle> {
        let value = checked(value)?;
        self.tree_mut()?.push(array, Node::Scalar(value))
    }
}

fn ended(committed: bool) -> StoreError {
    StoreError::InvalidState(if committed {
        "transaction already committed".into()
    } else {
        "transaction already rolled back".into()
    })
}

/// Reject values neither file format can store.
fn checked(value: Scalar) -> StoreResult<Scalar> {
    match value {
        Scalar::Double(d) if !d.is_finite() => Err(StoreError::InvalidArgument(format!(
            "double {d} is not finite"
        ))),
        other => Ok(other),
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("active", &self.is_active())
            .field("committed", &self.committed)
            .field("nodes", &self.working.as_ref().map(NodeTable::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_persist::{Backend, JsonOptions, TomlOptions, WriteStage};
    use arbor_types::ErrorCode;
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;

    fn memory_store() -> Store {
        let store = Store::new(Backend::memory());
        store.load().unwrap();
        store
    }

    fn json_store(path: &Path) -> Store {
        let store = Store::new(Backend::json(path, JsonOptions::default()));
        store.load().unwrap();
        store
    }

    // ---- Rollback isolation ----

    #[test]
    fn dropped_transaction_is_invisible() {
        let store = memory_store();

        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        txn.make_string(root, "key1", "value1").unwrap();
        txn.make_int(root, "key2", 42).unwrap();
        txn.commit().unwrap();

        {
            let mut txn = store.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            txn.make_string(root, "key3", "value3").unwrap();
        }

        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert!(txn.has(root, "key1").unwrap());
        assert!(txn.has(root, "key2").unwrap());
        assert!(!txn.has(root, "key3").unwrap());
    }

    #[test]
    fn early_return_rolls_back() {
        fn fails(store: &Store) -> StoreResult<()> {
            let mut txn = store.begin_transaction()?;
            let root = txn.root()?;
            txn.make_int(root, "partial", 1)?;
            txn.make_int(root, "bad-key", 2)?;
            txn.commit()
        }

        let store = memory_store();
        assert_eq!(fails(&store).unwrap_err().code(), ErrorCode::PathSyntax);

        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert!(!txn.has(root, "partial").unwrap());
    }

    #[test]
    fn explicit_rollback_discards_changes() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        txn.make_bool(root, "flag", true).unwrap();
        txn.rollback();
        txn.rollback();
        assert!(!txn.is_active());
        assert!(!txn.is_committed());
        drop(txn);

        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert_eq!(txn.len(root).unwrap(), 0);
    }

    // ---- Lifecycle ----

    #[test]
    fn second_commit_is_invalid_state() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        txn.commit().unwrap();
        assert!(txn.is_committed());
        assert_eq!(txn.commit().unwrap_err().code(), ErrorCode::InvalidState);
        txn.rollback();
        assert!(txn.is_committed());
    }

    #[test]
    fn operations_after_end_are_invalid_state() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        txn.rollback();

        assert_eq!(txn.root().unwrap_err().code(), ErrorCode::InvalidState);
        assert_eq!(
            txn.make_int(root, "x", 1).unwrap_err().code(),
            ErrorCode::InvalidState
        );
        assert_eq!(txn.commit().unwrap_err().code(), ErrorCode::InvalidState);
    }

    // ---- Key grammar and duplicates ----

    #[test]
    fn key_grammar_enforced() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        for key in ["123invalid", "has-dash", "", "a.b", "a[0]"] {
            let err = txn.make_string(root, key, "x").unwrap_err();
            assert_eq!(err.code(), ErrorCode::PathSyntax, "{key:?}");
        }
        assert!(txn.make_string(root, "_ok_123", "x").is_ok());

        let long = "k".repeat(256);
        let err = txn.make_string(root, &long, "x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageTooLong);
        assert_eq!(txn.len(root).unwrap(), 1);
    }

    #[test]
    fn duplicate_key_rejected() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let first = txn.make_string(root, "dup", "a").unwrap();
        let err = txn.make_string(root, "dup", "b").unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        assert_eq!(txn.make_object(root, "dup").unwrap_err().code(), ErrorCode::AlreadyExists);
        assert_eq!(txn.get_string(first).unwrap(), "a");
    }

    // ---- Type safety ----

    #[test]
    fn typed_reads_check_kind() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let s = txn.make_string(root, "s", "hello").unwrap();
        assert_eq!(txn.get_int(s).unwrap_err().code(), ErrorCode::TypeMismatch);
        assert_eq!(txn.get_string(s).unwrap(), "hello");
        assert_eq!(txn.get_bool(root).unwrap_err().code(), ErrorCode::TypeMismatch);
        assert_eq!(txn.kind(s).unwrap(), NodeKind::String);
        assert_eq!(txn.value(s).unwrap(), Scalar::String("hello".into()));
        let err = txn.value(root).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        assert!(matches!(err, StoreError::NotScalar { actual: NodeKind::Object }));
        let list = txn.make_array(root, "list").unwrap();
        assert_eq!(
            txn.value(list).unwrap_err().to_string(),
            "type mismatch: expected a scalar, found array"
        );
    }

    #[test]
    fn set_overwrites_same_kind_only() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let n = txn.make_int(root, "n", 1).unwrap();
        txn.set_int(n, 2).unwrap();
        assert_eq!(txn.get_int(n).unwrap(), 2);

        assert_eq!(txn.set_string(n, "two").unwrap_err().code(), ErrorCode::TypeMismatch);
        assert_eq!(txn.set_double(n, 2.0).unwrap_err().code(), ErrorCode::TypeMismatch);
        assert_eq!(txn.set_bool(root, true).unwrap_err().code(), ErrorCode::TypeMismatch);
        assert_eq!(txn.get_int(n).unwrap(), 2);
    }

    #[test]
    fn non_finite_doubles_rejected() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = txn.make_double(root, "d", value).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
        }
        let d = txn.make_double(root, "d", 1.5).unwrap();
        assert_eq!(txn.set_double(d, f64::NAN).unwrap_err().code(), ErrorCode::InvalidArgument);
        assert_eq!(txn.get_double(d).unwrap(), 1.5);
    }

    #[test]
    fn containers_require_object_parent() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let list = txn.make_array(root, "list").unwrap();
        let leaf = txn.make_int(root, "leaf", 0).unwrap();
        for parent in [list, leaf] {
            assert_eq!(txn.make_object(parent, "x").unwrap_err().code(), ErrorCode::TypeMismatch);
            assert_eq!(txn.make_array(parent, "x").unwrap_err().code(), ErrorCode::TypeMismatch);
            assert_eq!(txn.make_int(parent, "x", 1).unwrap_err().code(), ErrorCode::TypeMismatch);
        }
        assert_eq!(txn.push_int(root, 1).unwrap_err().code(), ErrorCode::TypeMismatch);
    }

    // ---- Arrays ----

    #[test]
    fn push_and_erase_elements() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let list = txn.make_array(root, "list").unwrap();
        txn.push_int(list, 10).unwrap();
        txn.push_string(list, "twenty").unwrap();
        txn.push_bool(list, true).unwrap();
        txn.push_double(list, 0.5).unwrap();
        assert_eq!(txn.len(list).unwrap(), 4);

        txn.erase_element(list, 1).unwrap();
        assert!(txn.get_bool(txn.element(list, 1).unwrap()).unwrap());
        assert!(txn.has_element(list, 2).unwrap());
        assert!(!txn.has_element(list, 3).unwrap());

        let err = txn.erase_element(list, 3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IndexOutOfRange);
        assert_eq!(txn.get::<i64>(root, "list[0]").unwrap(), 10);
    }

    // ---- Removal ----

    #[test]
    fn remove_deletes_subtree() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        let server = txn.make_object(root, "server").unwrap();
        let port = txn.make_int(server, "port", 80).unwrap();
        txn.remove(root, "server").unwrap();

        assert!(!txn.has(root, "server").unwrap());
        assert_eq!(txn.get_int(port).unwrap_err().code(), ErrorCode::InvalidHandle);
        assert_eq!(txn.remove(root, "server").unwrap_err().code(), ErrorCode::KeyNotFound);
    }

    // ---- Paths ----

    #[test]
    fn path_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(
            &path,
            r#"{"server": {"database": {"port": 5432}},
               "servers": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}"#,
        )
        .unwrap();
        let store = json_store(&path);
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();

        assert_eq!(txn.get::<i64>(root, "server.database.port").unwrap(), 5432);
        assert_eq!(txn.get::<String>(root, "servers[2].name").unwrap(), "c");

        let err = txn.get::<String>(root, "servers[3].name").unwrap_err();
        assert_eq!(err.code(), ErrorCode::IndexOutOfRange);
        let err = txn.get::<String>(root, "servers[2.name").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PathSyntax);
        let err = txn.get::<String>(root, "server.missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyNotFound);
        let err = txn.get::<String>(root, "server.database.port").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);

        txn.set::<i64>(root, "server.database.port", 6543).unwrap();
        let db = txn.navigate(root, "server.database").unwrap();
        assert_eq!(txn.get::<i64>(db, "port").unwrap(), 6543);
        assert_eq!(txn.keys(root).unwrap(), vec!["server", "servers"]);
    }

    #[test]
    fn navigation_does_not_mutate() {
        let store = memory_store();
        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        txn.make_object(root, "a").unwrap();

        assert!(txn.navigate(root, "a.b.c").is_err());
        assert!(!txn.has(txn.child(root, "a").unwrap(), "b").unwrap());
    }

    // ---- Handles across transactions ----

    #[test]
    fn stale_handles_fail_after_rollback() {
        let store = memory_store();

        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        let kept = txn.make_int(root, "kept", 1).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin_transaction().unwrap();
        let abandoned = txn.make_int(root, "gone", 2).unwrap();
        drop(txn);

        let mut txn = store.begin_transaction().unwrap();
        let fresh = txn.make_int(root, "other", 3).unwrap();
        assert_ne!(fresh, abandoned);
        assert_eq!(txn.get_int(abandoned).unwrap_err().code(), ErrorCode::InvalidHandle);
        assert_eq!(txn.get_int(kept).unwrap(), 1);
        assert_eq!(
            txn.get_int(Handle::INVALID).unwrap_err().code(),
            ErrorCode::InvalidHandle
        );
    }

    #[test]
    fn handles_from_previous_load_do_not_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let store = json_store(&path);

        let mut txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        let a = txn.make_int(root, "a", 1).unwrap();
        txn.commit().unwrap();
        drop(txn);

        store.close().unwrap();
        store.open(&path).unwrap();

        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert_eq!(txn.get_int(a).unwrap_err().code(), ErrorCode::InvalidHandle);
        assert_eq!(txn.get::<i64>(root, "a").unwrap(), 1);
    }

    #[test]
    fn memory_reopen_invalidates_old_handles() {
        let store = memory_store();

        let mut txn = store.begin_transaction().unwrap();
        let old_root = txn.root().unwrap();
        let a = txn.make_int(old_root, "a", 1).unwrap();
        txn.commit().unwrap();
        drop(txn);

        store.close().unwrap();
        store.open("ignored").unwrap();

        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert_ne!(root, old_root);
        assert_eq!(txn.get_int(a).unwrap_err().code(), ErrorCode::InvalidHandle);
        assert_eq!(txn.kind(old_root).unwrap_err().code(), ErrorCode::InvalidHandle);
        assert_eq!(txn.get::<i64>(root, "a").unwrap(), 1);
    }

    // ---- Durability ----

    #[test]
    fn json_durability_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        {
            let store = json_store(&path);
            let mut txn = store.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            txn.make_string(root, "name", "arbor").unwrap();
            let server = txn.make_object(root, "server").unwrap();
            txn.make_int(server, "port", 8080).unwrap();
            txn.make_double(server, "load", 0.25).unwrap();
            txn.make_bool(server, "tls", false).unwrap();
            let tags = txn.make_array(root, "tags").unwrap();
            txn.push_string(tags, "a").unwrap();
            txn.push_int(tags, 2).unwrap();
            txn.commit().unwrap();
            drop(txn);
            store.close().unwrap();
        }

        let store = json_store(&path);
        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert_eq!(txn.get::<String>(root, "name").unwrap(), "arbor");
        assert_eq!(txn.get::<i64>(root, "server.port").unwrap(), 8080);
        assert_eq!(txn.get::<f64>(root, "server.load").unwrap(), 0.25);
        assert!(!txn.get::<bool>(root, "server.tls").unwrap());
        assert_eq!(txn.get::<String>(root, "tags[0]").unwrap(), "a");
        assert_eq!(txn.get::<i64>(root, "tags[1]").unwrap(), 2);
        assert_eq!(txn.keys(root).unwrap(), vec!["name", "server", "tags"]);
    }

    #[test]
    fn toml_durability_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.toml");
        let open = || {
            let store = Store::new(Backend::toml(&path, TomlOptions::default()));
            store.load().unwrap();
            store
        };
        {
            let store = open();
            let mut txn = store.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            let db = txn.make_object(root, "database").unwrap();
            txn.make_int(db, "port", 5432).unwrap();
            txn.make_double(db, "ratio", 1.0).unwrap();
            txn.make_string(root, "title", "t").unwrap();
            txn.commit().unwrap();
        }

        let store = open();
        let txn = store.begin_transaction().unwrap();
        let root = txn.root().unwrap();
        assert_eq!(txn.get::<i64>(root, "database.port").unwrap(), 5432);
        assert_eq!(txn.get::<f64>(root, "database.ratio").unwrap(), 1.0);
        assert_eq!(txn.get::<String>(root, "title").unwrap(), "t");
    }

    // ---- Crash atomicity ----

    #[test]
    fn interrupted_write_leaves_file_unchanged() {
        let stages = [
            WriteStage::CreateTemp,
            WriteStage::WriteTemp,
            WriteStage::SyncTemp,
            WriteStage::Journal,
            WriteStage::Rename,
        ];
        for stage in stages {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("doc.json");
            let store = json_store(&path);

            let mut txn = store.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            txn.make_string(root, "v", "original").unwrap();
            txn.commit().unwrap();
            drop(txn);
            let before = fs::read(&path).unwrap();

            store.inject_fault(Some(stage));
            let mut txn = store.begin_transaction().unwrap();
            txn.set::<String>(root, "v", "changed".into()).unwrap();
            let err = txn.commit().unwrap_err();
            assert_eq!(err.code(), ErrorCode::IoFailure, "{stage}");
            drop(txn);

            assert_eq!(fs::read(&path).unwrap(), before, "{stage}");
            let leftovers = fs::read_dir(dir.path()).unwrap().count();
            assert_eq!(leftovers, 1, "{stage}");

            // Dropping the store retries the write, which still fails.
            drop(store);
            assert_eq!(fs::read(&path).unwrap(), before, "{stage}");
            let reopened = json_store(&path);
            let txn = reopened.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            assert_eq!(txn.get::<String>(root, "v").unwrap(), "original", "{stage}");
        }
    }

    // ---- Properties ----

    proptest! {
        #[test]
        fn rolled_back_keys_never_leak(keys in proptest::collection::hash_set("[a-z_][a-z0-9_]{0,8}", 1..8)) {
            let store = memory_store();
            {
                let mut txn = store.begin_transaction().unwrap();
                let root = txn.root().unwrap();
                for key in &keys {
                    txn.make_int(root, key, 1).unwrap();
                }
            }
            let txn = store.begin_transaction().unwrap();
            let root = txn.root().unwrap();
            prop_assert_eq!(txn.len(root).unwrap(), 0);
        }
    }
}
