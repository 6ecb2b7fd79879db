//! Foundation types for the Arbor document store.
//!
//! This crate provides the vocabulary shared by every other Arbor crate. It
//! has no knowledge of trees, transactions, or files.
//!
//! # Key Types
//!
//! - [`Handle`]: Opaque generational reference to a node; raw `0` is never valid
//! - [`Scalar`]: Leaf value: bool, 64-bit integer, double, or string
//! - [`NodeKind`]: Tag of a node (object, array, or one of the scalar kinds)
//! - [`ErrorCode`]: Flat error taxonomy with a static description table
//! - [`StoreError`]: The error type returned by every fallible operation
//!
//! Key grammar validation lives in [`key`].

pub mod error;
pub mod handle;
pub mod key;
pub mod value;

pub use error::{ErrorCode, StoreError, StoreResult};
pub use handle::Handle;
pub use key::{validate_key, MAX_KEY_LEN, MAX_PATH_LEN};
pub use value::{NodeKind, Scalar};
