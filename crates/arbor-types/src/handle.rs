use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a node inside a document tree.
///
/// The raw value packs a slot index (low 32 bits, stored as `index + 1`) and
/// a generation stamp (high 32 bits). A raw value of `0` is always invalid,
/// and a handle whose generation no longer matches its slot fails to resolve
/// instead of aliasing whatever node now lives there.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    raw: u64,
}

impl Handle {
    /// The invalid handle (raw `0`).
    pub const INVALID: Handle = Handle { raw: 0 };

    /// Build a handle from a slot index and generation stamp.
    ///
    /// Returns `None` when the index cannot be encoded (`u32::MAX`).
    pub fn from_parts(index: u32, generation: u32) -> Option<Self> {
        let slot = index.checked_add(1)?;
        Some(Self {
            raw: ((generation as u64) << 32) | slot as u64,
        })
    }

    /// Reconstruct a handle from its raw representation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    /// The raw 64-bit representation.
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Returns `true` unless this handle is structurally invalid.
    ///
    /// A valid-looking handle may still be stale; only the owning node table
    /// can tell.
    pub fn is_valid(&self) -> bool {
        self.raw & 0xFFFF_FFFF != 0
    }

    /// Slot index, or `None` for the invalid handle.
    pub fn index(&self) -> Option<u32> {
        let slot = (self.raw & 0xFFFF_FFFF) as u32;
        slot.checked_sub(1)
    }

    /// Generation stamp encoded in the handle.
    pub fn generation(&self) -> u32 {
        (self.raw >> 32) as u32
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "Handle(#{index}@{})", self.generation()),
            None => write!(f, "Handle(invalid)"),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.raw)
    }
}
