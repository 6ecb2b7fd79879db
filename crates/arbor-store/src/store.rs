use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use arbor_persist::{Backend, BackendKind};
#[cfg(any(test, feature = "failpoints"))]
use arbor_persist::WriteStage;
use arbor_tree::NodeTable;
use arbor_types::{StoreError, StoreResult};
use tracing::{debug, info, warn};

use crate::transaction::Transaction;

/// Shown in place of a file path for in-memory stores.
const MEMORY_PATH: &str = ":memory:";

/// A transactional document store over one persistence backend.
///
/// The store owns the committed tree. All reads and writes go through a
/// [`Transaction`] obtained from [`begin_transaction`](Self::begin_transaction);
/// at most one transaction may be live at a time.
///
/// The store is not internally synchronized. Share it across threads only
/// behind the caller's own lock.
#[derive(Debug)]
pub struct Store {
    inner: RefCell<Inner>,
    in_transaction: Cell<bool>,
}

#[derive(Debug)]
struct Inner {
    backend: Backend,
    /// `None` while closed.
    committed: Option<NodeTable>,
    /// Highest generation stamp handed out by any tree this store produced.
    high_water: u32,
    /// The committed tree has not reached the backend yet.
    unflushed: bool,
}

impl Store {
    /// Wrap `backend` in a closed store.
    pub fn new(backend: Backend) -> Self {
        Self {
            inner: RefCell::new(Inner {
                backend,
                committed: None,
                high_water: 1,
                unflushed: false,
            }),
            in_transaction: Cell::new(false),
        }
    }

    /// Open the store, loading the committed tree from `path`.
    ///
    /// A missing file is not an error: the store starts from an empty root
    /// object and the file is created by the first commit. In-memory stores
    /// ignore `path` and come back with whatever was last committed.
    pub fn open(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        if self.is_open() {
            return Err(StoreError::AlreadyOpen {
                path: self.display_path(),
            });
        }
        self.inner.borrow_mut().backend.set_path(path);
        self.load()
    }

    /// Reopen at the backend's current path.
    pub(crate) fn load(&self) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.committed.is_some() {
            drop(inner);
            return Err(StoreError::AlreadyOpen {
                path: self.display_path(),
            });
        }

        let stamp = inner.high_water;
        let tree = inner.backend.load(stamp)?;
        inner.high_water = inner.high_water.max(tree.stamp());
        info!(
            backend = %inner.backend.kind(),
            path = ?inner.backend.path(),
            nodes = tree.len(),
            "store opened"
        );
        inner.committed = Some(tree);
        inner.unflushed = false;
        Ok(())
    }

    /// Flush and close the store.
    ///
    /// Fails with `InvalidState` while a transaction is live. If the final
    /// flush fails the store stays open so the caller can retry.
    pub fn close(&self) -> StoreResult<()> {
        if self.in_transaction.get() {
            return Err(StoreError::InvalidState(
                "cannot close while a transaction is active".into(),
            ));
        }
        if !self.is_open() {
            return Err(StoreError::InvalidState("store is not open".into()));
        }

        self.flush()?;
        let mut inner = self.inner.borrow_mut();
        inner.committed = None;
        info!(backend = %inner.backend.kind(), "store closed");
        Ok(())
    }

    /// Write the committed tree to the backend if an earlier durable write
    /// failed. A no-op when everything committed is already durable.
    pub fn flush(&self) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.unflushed {
            return Ok(());
        }
        inner.write_committed()
    }

    /// Start a transaction over a private copy of the committed tree.
    pub fn begin_transaction(&self) -> StoreResult<Transaction<'_>> {
        if self.in_transaction.get() {
            return Err(StoreError::InvalidState(
                "a transaction is already active on this store".into(),
            ));
        }

        let inner = self.inner.borrow();
        let committed = inner
            .committed
            .as_ref()
            .ok_or_else(|| StoreError::InvalidState("store is not open".into()))?;
        let mut working = committed.clone();
        working.advance_stamp(inner.high_water);
        drop(inner);

        self.in_transaction.set(true);
        debug!(stamp = working.stamp(), "transaction started");
        Ok(Transaction::new(self, working))
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().committed.is_some()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.inner.borrow().backend.kind()
    }

    /// Backing file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.borrow().backend.path().map(Path::to_path_buf)
    }

    /// `true` when the last commit has not been written durably.
    pub fn has_unflushed_commit(&self) -> bool {
        self.inner.borrow().unflushed
    }

    /// Make durable writes fail at `stage` (or stop failing on `None`).
    #[cfg(any(test, feature = "failpoints"))]
    pub fn inject_fault(&self, stage: Option<WriteStage>) {
        self.inner.borrow_mut().backend.inject_fault(stage);
    }

    /// Install `tree` as the committed tree and write it durably.
    ///
    /// The in-memory commit stands even if the write fails; the error is
    /// returned and [`flush`](Self::flush) retries.
    pub(crate) fn install(&self, tree: NodeTable) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.high_water = inner.high_water.max(tree.stamp());
        debug!(nodes = tree.len(), "commit");
        inner.committed = Some(tree);
        inner.unflushed = true;
        inner.write_committed()
    }

    /// Called exactly once when a transaction ends, however it ends.
    pub(crate) fn end_transaction(&self, stamp: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.high_water = inner.high_water.max(stamp);
        self.in_transaction.set(false);
    }

    fn display_path(&self) -> PathBuf {
        self.path().unwrap_or_else(|| PathBuf::from(MEMORY_PATH))
    }
}

impl Inner {
    fn write_committed(&mut self) -> StoreResult<()> {
        let Some(tree) = self.committed.as_ref() else {
            return Err(StoreError::InvalidState("store is not open".into()));
        };
        match self.backend.persist(tree) {
            Ok(()) => {
                self.unflushed = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "durable write failed; commit kept in memory");
                Err(e)
            }
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.committed.is_some() && inner.unflushed {
            if let Err(e) = inner.write_committed() {
                warn!(error = %e, "store dropped with an unflushed commit");
            }
        }
    }
}
