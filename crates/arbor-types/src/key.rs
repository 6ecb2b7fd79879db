//! Key grammar validation.
//!
//! Valid keys match `[A-Za-z_][A-Za-z0-9_]*`:
//! - Must be non-empty
//! - Must start with an ASCII letter or `_`
//! - Remaining bytes must be ASCII letters, digits, or `_`
//! - Must be at most [`MAX_KEY_LEN`] bytes
//!
//! There is no quoting or escaping; anything else is rejected, never rewritten.

use crate::error::{StoreError, StoreResult};

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 255;

/// Maximum path string length in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Returns `true` if `b` may start a key.
pub fn is_key_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// Returns `true` if `b` may continue a key.
pub fn is_key_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Validate a key, returning `Ok(())` if it matches the grammar.
///
/// # Examples
///
/// ```
/// use arbor_types::key::validate_key;
///
/// assert!(validate_key("_ok_123").is_ok());
/// assert!(validate_key("123invalid").is_err());
/// assert!(validate_key("has-dash").is_err());
/// ```
pub fn validate_key(key: &str) -> StoreResult<()> {
    let bytes = key.as_bytes();

    let Some(&first) = bytes.first() else {
        return Err(StoreError::invalid_key(key, "key must not be empty"));
    };

    if bytes.len() > MAX_KEY_LEN {
        return Err(StoreError::TooLong {
            what: "key",
            len: bytes.len(),
            max: MAX_KEY_LEN,
        });
    }

    if !is_key_start(first) {
        return Err(StoreError::invalid_key(
            key,
            "must start with an ASCII letter or '_'",
        ));
    }

    if let Some(pos) = bytes.iter().position(|&b| !is_key_continue(b)) {
        return Err(StoreError::invalid_key(
            key,
            format!("forbidden character at byte {pos}"),
        ));
    }

    Ok(())
}
