//! The [`NodeTable`] arena.
//!
//! Nodes live in a `Vec` of slots. Freed slots are reused, but every
//! allocation takes a fresh generation stamp from a monotonically increasing
//! counter, so a handle to a freed node never resolves to its replacement.
//! The counter survives cloning and can be advanced past stamps used by
//! another table, which lets a store keep handles from discarded copies of a
//! tree from aliasing nodes in later copies.

use arbor_types::{validate_key, Handle, NodeKind, Scalar, StoreError, StoreResult};
use tracing::trace;

use crate::node::Node;

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Growable arena of nodes addressed by generational handles.
///
/// Generations are `u32` and are never reused. Each allocation, including
/// every node copied in by [`rebuild`](Self::rebuild) or a decoder, takes
/// one. Once the counter reaches `u32::MAX` every further allocation fails
/// with `InvalidState`; reads and removals keep working.
#[derive(Clone, Debug)]
pub struct NodeTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Handle,
    next_stamp: u32,
    live: usize,
}

impl NodeTable {
    /// Create a table holding an empty root object.
    pub fn new() -> Self {
        Self::with_stamp(1)
    }

    /// Create a table holding an empty root object whose allocations start
    /// at generation `stamp`.
    pub fn with_stamp(stamp: u32) -> Self {
        let generation = stamp.min(u32::MAX - 1);
        let root = Handle::from_parts(0, generation).unwrap_or(Handle::INVALID);
        Self {
            slots: vec![Slot {
                generation,
                node: Some(Node::object()),
            }],
            free: Vec::new(),
            root,
            next_stamp: generation + 1,
            live: 1,
        }
    }

    /// Handle of the root object.
    pub fn root(&self) -> Handle {
        self.root
    }

    /// The generation the next allocation will receive.
    pub fn stamp(&self) -> u32 {
        self.next_stamp
    }

    /// Ensure future allocations use generations of at least `stamp`.
    pub fn advance_stamp(&mut self, stamp: u32) {
        self.next_stamp = self.next_stamp.max(stamp);
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Always `false`: the root object is never freed.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns `true` if `handle` resolves to a live node.
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    pub fn get(&self, handle: Handle) -> StoreResult<&Node> {
        let index = self.slot_index(handle)?;
        self.slots[index]
            .node
            .as_ref()
            .ok_or(StoreError::InvalidHandle { raw: handle.raw() })
    }

    fn get_mut(&mut self, handle: Handle) -> StoreResult<&mut Node> {
        let index = self.slot_index(handle)?;
        self.slots[index]
            .node
            .as_mut()
            .ok_or(StoreError::InvalidHandle { raw: handle.raw() })
    }

    pub fn kind(&self, handle: Handle) -> StoreResult<NodeKind> {
        Ok(self.get(handle)?.kind())
    }

    /// The scalar stored at `handle`, which must be of kind `expected`.
    pub fn scalar(&self, handle: Handle, expected: NodeKind) -> StoreResult<&Scalar> {
        match self.get(handle)? {
            Node::Scalar(s) if s.kind() == expected => Ok(s),
            other => Err(StoreError::TypeMismatch {
                expected,
                actual: other.kind(),
            }),
        }
    }

    /// Overwrite a scalar in place. The new value must have the same kind.
    pub fn set_scalar(&mut self, handle: Handle, value: Scalar) -> StoreResult<()> {
        match self.get_mut(handle)? {
            Node::Scalar(current) if current.kind() == value.kind() => {
                *current = value;
                Ok(())
            }
            other => Err(StoreError::TypeMismatch {
                expected: value.kind(),
                actual: other.kind(),
            }),
        }
    }

    /// Resolve `key` under the object at `parent`.
    pub fn child(&self, parent: Handle, key: &str) -> StoreResult<Handle> {
        validate_key(key)?;
        self.lookup_key(parent, key)
    }

    /// Resolve element `index` of the array at `parent`.
    pub fn element(&self, parent: Handle, index: usize) -> StoreResult<Handle> {
        let items = self.array(parent)?;
        items
            .get(index)
            .copied()
            .ok_or(StoreError::IndexOutOfRange {
                index,
                len: items.len(),
            })
    }

    /// Returns `true` if the object at `parent` holds `key`.
    pub fn has(&self, parent: Handle, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        Ok(self.object(parent)?.contains_key(key))
    }

    /// Returns `true` if the array at `parent` has an element at `index`.
    pub fn has_element(&self, parent: Handle, index: usize) -> StoreResult<bool> {
        Ok(index < self.array(parent)?.len())
    }

    /// Number of children of an object or elements of an array.
    pub fn child_count(&self, handle: Handle) -> StoreResult<usize> {
        match self.get(handle)? {
            Node::Object(map) => Ok(map.len()),
            Node::Array(items) => Ok(items.len()),
            Node::Scalar(s) => Err(StoreError::TypeMismatch {
                expected: NodeKind::Object,
                actual: s.kind(),
            }),
        }
    }

    /// Keys of the object at `handle`, in declared order.
    pub fn keys(&self, handle: Handle) -> StoreResult<Vec<String>> {
        Ok(self.object(handle)?.keys().cloned().collect())
    }

    /// Copy the whole tree into a fresh table whose allocations start at
    /// `stamp`.
    ///
    /// Content and key order are preserved, but every node gets a new
    /// generation, so no handle into `self` resolves in the copy.
    pub fn rebuild(&self, stamp: u32) -> StoreResult<NodeTable> {
        let mut copy = NodeTable::with_stamp(stamp.max(self.next_stamp));
        let mut stack = vec![(self.root, copy.root)];
        while let Some((from, to)) = stack.pop() {
            match self.get(from)? {
                Node::Object(map) => {
                    for (key, &child) in map {
                        let node = copy.insert(to, key, shell(self.get(child)?))?;
                        stack.push((child, node));
                    }
                }
                Node::Array(items) => {
                    for &child in items {
                        let node = copy.push(to, shell(self.get(child)?))?;
                        stack.push((child, node));
                    }
                }
                Node::Scalar(_) => {}
            }
        }
        trace!(nodes = copy.len(), stamp = copy.stamp(), "rebuild");
        Ok(copy)
    }

    /// Create `node` under `key` in the object at `parent`.
    ///
    /// All preconditions are checked before anything is allocated, so a
    /// failed insert leaves the table untouched.
    pub fn insert(&mut self, parent: Handle, key: &str, node: Node) -> StoreResult<Handle> {
        validate_key(key)?;
        if self.object(parent)?.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }

        let handle = self.allocate(node)?;
        if let Node::Object(map) = self.get_mut(parent)? {
            map.insert(key.to_string(), handle);
        }
        trace!(?parent, key, ?handle, "insert");
        Ok(handle)
    }

    /// Append `node` to the array at `parent`.
    pub fn push(&mut self, parent: Handle, node: Node) -> StoreResult<Handle> {
        self.array(parent)?;

        let handle = self.allocate(node)?;
        if let Node::Array(items) = self.get_mut(parent)? {
            items.push(handle);
        }
        trace!(?parent, ?handle, "push");
        Ok(handle)
    }

    /// Remove `key` and its whole subtree from the object at `parent`.
    pub fn remove(&mut self, parent: Handle, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let removed = match self.get_mut(parent)? {
            Node::Object(map) => map.shift_remove(key),
            other => {
                return Err(StoreError::TypeMismatch {
                    expected: NodeKind::Object,
                    actual: other.kind(),
                })
            }
        };
        let child = removed.ok_or_else(|| StoreError::KeyNotFound {
            key: key.to_string(),
        })?;
        self.free_subtree(child);
        Ok(())
    }

    /// Remove element `index` from the array at `parent`, shifting later
    /// elements down by one.
    pub fn erase_element(&mut self, parent: Handle, index: usize) -> StoreResult<()> {
        let removed = match self.get_mut(parent)? {
            Node::Array(items) if index < items.len() => items.remove(index),
            Node::Array(items) => {
                return Err(StoreError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })
            }
            other => {
                return Err(StoreError::TypeMismatch {
                    expected: NodeKind::Array,
                    actual: other.kind(),
                })
            }
        };
        self.free_subtree(removed);
        Ok(())
    }

    /// Structural equality of the subtrees at `a` (in `self`) and `b` (in
    /// `other`). Object key order only matters when `ordered` is set.
    pub fn content_eq(&self, a: Handle, other: &NodeTable, b: Handle, ordered: bool) -> bool {
        let (Ok(left), Ok(right)) = (self.get(a), other.get(b)) else {
            return false;
        };
        match (left, right) {
            (Node::Scalar(x), Node::Scalar(y)) => x == y,
            (Node::Array(xs), Node::Array(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(x, y)| self.content_eq(*x, other, *y, ordered))
            }
            (Node::Object(xs), Node::Object(ys)) => {
                if xs.len() != ys.len() {
                    return false;
                }
                if ordered && !xs.keys().eq(ys.keys()) {
                    return false;
                }
                xs.iter().all(|(key, x)| match ys.get(key) {
                    Some(y) => self.content_eq(*x, other, *y, ordered),
                    None => false,
                })
            }
            _ => false,
        }
    }

    pub(crate) fn lookup_key(&self, parent: Handle, key: &str) -> StoreResult<Handle> {
        self.object(parent)?
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn object(&self, handle: Handle) -> StoreResult<&indexmap::IndexMap<String, Handle>> {
        match self.get(handle)? {
            Node::Object(map) => Ok(map),
            other => Err(StoreError::TypeMismatch {
                expected: NodeKind::Object,
                actual: other.kind(),
            }),
        }
    }

    fn array(&self, handle: Handle) -> StoreResult<&Vec<Handle>> {
        match self.get(handle)? {
            Node::Array(items) => Ok(items),
            other => Err(StoreError::TypeMismatch {
                expected: NodeKind::Array,
                actual: other.kind(),
            }),
        }
    }

    fn slot_index(&self, handle: Handle) -> StoreResult<usize> {
        let invalid = || StoreError::InvalidHandle { raw: handle.raw() };
        let index = handle.index().ok_or_else(invalid)? as usize;
        match self.slots.get(index) {
            Some(slot) if slot.generation == handle.generation() && slot.node.is_some() => {
                Ok(index)
            }
            _ => Err(invalid()),
        }
    }

    fn allocate(&mut self, node: Node) -> StoreResult<Handle> {
        let generation = self.next_stamp;
        let next = generation
            .checked_add(1)
            .ok_or_else(|| StoreError::InvalidState("generation space exhausted".into()))?;

        let index = match self.free.pop() {
            Some(index) => index,
            None => u32::try_from(self.slots.len())
                .map_err(|_| StoreError::InvalidState("node table is full".into()))?,
        };
        let handle = Handle::from_parts(index, generation)
            .ok_or_else(|| StoreError::InvalidState("node table is full".into()))?;

        let slot = Slot {
            generation,
            node: Some(node),
        };
        match self.slots.get_mut(index as usize) {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
        self.next_stamp = next;
        self.live += 1;
        Ok(handle)
    }

    fn free_subtree(&mut self, handle: Handle) {
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Ok(index) = self.slot_index(current) else {
                continue;
            };
            if let Some(node) = self.slots[index].node.take() {
                stack.extend(node.children());
                self.free.push(index as u32);
                self.live -= 1;
            }
        }
    }
}

/// `node` without its children.
fn shell(node: &Node) -> Node {
    match node {
        Node::Object(_) => Node::object(),
        Node::Array(_) => Node::array(),
        Node::Scalar(s) => Node::Scalar(s.clone()),
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}
