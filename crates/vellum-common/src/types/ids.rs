//! Core identifier types for Vellum.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page identifier - uniquely identifies a page in the database.
///
/// Pages are the fundamental unit of storage and latching. Each page is
/// identified by an opaque 32-bit identifier; `PageId::INVALID` is the
/// sentinel used wherever "no page" must be representable (an empty tree's
/// root, the last leaf's sibling pointer).
///
/// # Example
///
/// ```rust
/// use vellum_common::types::PageId;
///
/// let page = PageId::new(42);
/// assert_eq!(page.as_u32(), 42);
/// assert!(!PageId::INVALID.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageId(u32);

impl PageId {
    /// Invalid page ID constant, used as a sentinel value.
    pub const INVALID: Self = Self(u32::MAX);

    /// First valid page ID.
    pub const FIRST: Self = Self(0);

    /// Creates a new `PageId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks if this is a valid page ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Creates a PageId from bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Converts to bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PageId(INVALID)")
        } else {
            write!(f, "PageId({})", self.0)
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PageId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<PageId> for u32 {
    #[inline]
    fn from(id: PageId) -> Self {
        id.0
    }
}

/// Record identifier - an opaque 64-bit handle to a table row.
///
/// The index stores record identifiers as values; their internal structure
/// (slot/page encoding, tuple pointer, ...) belongs to the table heap and is
/// never interpreted by the index.
///
/// # Example
///
/// ```rust
/// use vellum_common::types::RecordId;
///
/// let rid = RecordId::new(0xDEAD_BEEF);
/// assert_eq!(rid.as_u64(), 0xDEAD_BEEF);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a new `RecordId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a RecordId from bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Converts to bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<RecordId> for u64 {
    #[inline]
    fn from(id: RecordId) -> Self {
        id.0
    }
}
