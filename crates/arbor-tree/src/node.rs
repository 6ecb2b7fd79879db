use arbor_types::{Handle, NodeKind, Scalar};
use indexmap::IndexMap;

/// A node in the document tree.
///
/// Objects keep their keys in declared order so serializers can reproduce
/// it; lookups are by key regardless of position.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Object(IndexMap<String, Handle>),
    Array(Vec<Handle>),
    Scalar(Scalar),
}

impl Node {
    /// An empty object.
    pub fn object() -> Self {
        Self::Object(IndexMap::new())
    }

    /// An empty array.
    pub fn array() -> Self {
        Self::Array(Vec::new())
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Object(_) => NodeKind::Object,
            Self::Array(_) => NodeKind::Array,
            Self::Scalar(s) => s.kind(),
        }
    }

    /// Direct children in declared order. Scalars have none.
    pub fn children(&self) -> Vec<Handle> {
        match self {
            Self::Object(map) => map.values().copied().collect(),
            Self::Array(items) => items.clone(),
            Self::Scalar(_) => Vec::new(),
        }
    }
}

impl From<Scalar> for Node {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}
