//! Error taxonomy for store operations.
//!
//! [`StoreError`] carries the context of a failure; [`ErrorCode`] is the flat
//! classification callers branch on.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::NodeKind;

/// Flat classification of every failure the store can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidHandle,
    PathSyntax,
    KeyNotFound,
    IndexOutOfRange,
    TypeMismatch,
    IoFailure,
    ParseError,
    AlreadyExists,
    InvalidState,
    MessageTooLong,
    InvalidArgument,
    Unknown,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 12] = [
        Self::InvalidHandle,
        Self::PathSyntax,
        Self::KeyNotFound,
        Self::IndexOutOfRange,
        Self::TypeMismatch,
        Self::IoFailure,
        Self::ParseError,
        Self::AlreadyExists,
        Self::InvalidState,
        Self::MessageTooLong,
        Self::InvalidArgument,
        Self::Unknown,
    ];

    /// Stable name of the code.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidHandle => "InvalidHandle",
            Self::PathSyntax => "PathSyntax",
            Self::KeyNotFound => "KeyNotFound",
            Self::IndexOutOfRange => "IndexOutOfRange",
            Self::TypeMismatch => "TypeMismatch",
            Self::IoFailure => "IoFailure",
            Self::ParseError => "ParseError",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidState => "InvalidState",
            Self::MessageTooLong => "MessageTooLong",
            Self::InvalidArgument => "InvalidArgument",
            Self::Unknown => "Unknown",
        }
    }

    /// Generic human-readable description of the code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidHandle => "handle does not refer to a live node",
            Self::PathSyntax => "malformed path or key",
            Self::KeyNotFound => "key not found",
            Self::IndexOutOfRange => "array index out of range",
            Self::TypeMismatch => "node has a different type",
            Self::IoFailure => "I/O operation failed",
            Self::ParseError => "persisted document could not be parsed",
            Self::AlreadyExists => "already exists",
            Self::InvalidState => "operation not valid in the current state",
            Self::MessageTooLong => "input exceeds the maximum length",
            Self::InvalidArgument => "invalid argument",
            Self::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors returned by every fallible store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The handle is zero, stale, or belongs to another tree.
    #[error("invalid handle: {raw:#x}")]
    InvalidHandle { raw: u64 },

    /// A key does not match `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A path string is malformed.
    #[error("path syntax error in {path:?} at byte {position}: {reason}")]
    PathSyntax {
        path: String,
        position: usize,
        reason: String,
    },

    /// The key is not present under the object.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// The index is past the end of the array.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A bracketed index does not fit in a machine word.
    #[error("index {digits} is too large to represent")]
    IndexOverflow { digits: String },

    /// The node exists but has a different kind.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: NodeKind, actual: NodeKind },

    /// A scalar of any kind was required but the node is a container.
    #[error("type mismatch: expected a scalar, found {actual}")]
    NotScalar { actual: NodeKind },

    /// A durable write step failed.
    #[error("write to {} failed during {stage}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document (or a configuration file) could not be parsed.
    #[error("{format} parse error: {reason}")]
    Parse { format: &'static str, reason: String },

    /// The key already exists under the object.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    /// The store is already open.
    #[error("store already open at {}", path.display())]
    AlreadyOpen { path: PathBuf },

    /// The operation is not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A key or path exceeds its length limit.
    #[error("{what} is {len} bytes, maximum is {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// An argument is outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure that fits no other category.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// The flat classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidHandle { .. } => ErrorCode::InvalidHandle,
            Self::InvalidKey { .. } | Self::PathSyntax { .. } => ErrorCode::PathSyntax,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::IndexOutOfRange { .. } | Self::IndexOverflow { .. } => {
                ErrorCode::IndexOutOfRange
            }
            Self::TypeMismatch { .. } | Self::NotScalar { .. } => ErrorCode::TypeMismatch,
            Self::WriteFailed { .. } | Self::Io(_) => ErrorCode::IoFailure,
            Self::Parse { .. } => ErrorCode::ParseError,
            Self::AlreadyExists { .. } | Self::AlreadyOpen { .. } => ErrorCode::AlreadyExists,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::TooLong { .. } => ErrorCode::MessageTooLong,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Returns `true` when retrying the same call may succeed.
    ///
    /// Only I/O failures qualify; every other code is a usage or data error.
    pub fn is_retryable(&self) -> bool {
        self.code() == ErrorCode::IoFailure
    }

    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_has_distinct_name() {
        let mut names: Vec<&str> = ErrorCode::ALL.iter().map(|c| c.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn every_code_has_description() {
        for code in ErrorCode::ALL {
            assert!(!code.description().is_empty(), "{code} has no description");
        }
    }

    #[test]
    fn variants_map_to_codes() {
        let cases: Vec<(StoreError, ErrorCode)> = vec![
            (StoreError::InvalidHandle { raw: 0 }, ErrorCode::InvalidHandle),
            (StoreError::invalid_key("1a", "bad"), ErrorCode::PathSyntax),
            (
                StoreError::IndexOverflow { digits: "99999999999999999999999".into() },
                ErrorCode::IndexOutOfRange,
            ),
            (
                StoreError::AlreadyOpen { path: "x.json".into() },
                ErrorCode::AlreadyExists,
            ),
            (
                StoreError::TooLong { what: "key", len: 300, max: 255 },
                ErrorCode::MessageTooLong,
            ),
            (
                StoreError::NotScalar { actual: NodeKind::Array },
                ErrorCode::TypeMismatch,
            ),
            (
                StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
                ErrorCode::IoFailure,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn only_io_is_retryable() {
        let io = StoreError::WriteFailed {
            path: "a.json".into(),
            stage: "rename",
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        assert!(io.is_retryable());
        assert!(!StoreError::KeyNotFound { key: "a".into() }.is_retryable());
        assert!(!StoreError::InvalidState("closed".into()).is_retryable());
    }

    #[test]
    fn display_is_descriptive() {
        let err = StoreError::TypeMismatch {
            expected: NodeKind::Int,
            actual: NodeKind::String,
        };
        assert_eq!(err.to_string(), "type mismatch: expected int, found string");

        let err = StoreError::NotScalar { actual: NodeKind::Object };
        assert_eq!(err.to_string(), "type mismatch: expected a scalar, found object");

        let err = StoreError::WriteFailed {
            path: "data/app.json".into(),
            stage: "rename",
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        assert_eq!(
            err.to_string(),
            "write to data/app.json failed during rename: boom"
        );
    }
}
