//! Document tree storage for Arbor.
//!
//! A document is a single rooted tree of objects, arrays, and scalars held in
//! a [`NodeTable`]: a growable arena of slots addressed by generational
//! [`Handle`](arbor_types::Handle)s. Every non-root node has exactly one
//! parent, so removing a child frees its whole subtree.
//!
//! # Modules
//!
//! - [`node`]: The [`Node`] tagged union
//! - [`table`]: The [`NodeTable`] arena
//! - [`path`]: Dotted/bracketed path parsing and read-only navigation

pub mod node;
pub mod path;
pub mod table;

pub use node::Node;
pub use path::{navigate, parse_path, PathCursor, Segment};
pub use table::NodeTable;
