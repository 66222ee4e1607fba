//! Fixed-width index keys and comparators.
//!
//! The index treats keys as opaque fixed-width byte blobs; all ordering
//! decisions go through an injected [`KeyComparator`]. The width is a const
//! parameter so each instantiation is monomorphized for its key size, the
//! common widths being 4, 8, 16, 32 and 64 bytes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A fixed-width index key.
///
/// Keys are plain `[u8; W]` blobs stored verbatim in tree pages. The blob
/// has no intrinsic ordering; comparisons go through a [`KeyComparator`]
/// chosen at tree construction.
///
/// # Example
///
/// ```rust
/// use vellum_common::types::IndexKey;
///
/// let key: IndexKey<8> = IndexKey::from_u64(42);
/// assert_eq!(key.as_u64(), 42);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey<const W: usize>(#[serde(with = "serde_arrays")] [u8; W]);

/// Serde helpers for const-generic arrays.
///
/// Serde only derives arrays up to length 32; keys go up to 64 bytes, so
/// (de)serialization round-trips through a byte slice.
mod serde_arrays {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const W: usize>(
        bytes: &[u8; W],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const W: usize>(
        deserializer: D,
    ) -> Result<[u8; W], D::Error> {
        let bytes = <&[u8]>::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(bytes.len(), &"fixed-width key"))
    }
}

impl<const W: usize> IndexKey<W> {
    /// Creates an all-zero key.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0u8; W])
    }

    /// Creates a key from a byte array.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; W]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice.
    ///
    /// # Panics
    ///
    /// Panics if the slice length is not exactly `W`.
    #[inline]
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0u8; W];
        buf.copy_from_slice(bytes);
        Self(buf)
    }

    /// Creates a key whose leading 8 bytes hold `value` big-endian.
    ///
    /// Big-endian encoding makes lexicographic byte order coincide with
    /// numeric order, so [`BigEndianComparator`] sorts these keys as
    /// integers. Trailing bytes are zero.
    ///
    /// # Panics
    ///
    /// Panics if `W < 8`.
    #[inline]
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        assert!(W >= 8, "key width {W} too small for a u64");
        let mut buf = [0u8; W];
        buf[..8].copy_from_slice(&value.to_be_bytes());
        Self(buf)
    }

    /// Reads the leading 8 bytes as a big-endian u64.
    ///
    /// # Panics
    ///
    /// Panics if `W < 8`.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        assert!(W >= 8, "key width {W} too small for a u64");
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(buf)
    }

    /// Returns the key as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key as a byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; W] {
        self.0
    }

    /// The key width in bytes.
    #[inline]
    #[must_use]
    pub const fn width() -> usize {
        W
    }
}

impl<const W: usize> Default for IndexKey<W> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const W: usize> AsRef<[u8]> for IndexKey<W> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const W: usize> From<[u8; W]> for IndexKey<W> {
    #[inline]
    fn from(bytes: [u8; W]) -> Self {
        Self(bytes)
    }
}

impl<const W: usize> fmt::Debug for IndexKey<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if W >= 8 && self.0[8..].iter().all(|b| *b == 0) {
            write!(f, "IndexKey({})", self.as_u64())
        } else {
            write!(f, "IndexKey(0x")?;
            for byte in &self.0 {
                write!(f, "{byte:02x}")?;
            }
            write!(f, ")")
        }
    }
}

impl<const W: usize> fmt::Display for IndexKey<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if W >= 8 && self.0[8..].iter().all(|b| *b == 0) {
            write!(f, "{}", self.as_u64())
        } else {
            for byte in &self.0 {
                write!(f, "{byte:02x}")?;
            }
            Ok(())
        }
    }
}

/// Comparator over fixed-width keys.
///
/// The tree never compares key bytes directly; every ordering decision is
/// delegated to the comparator injected at construction, so the same byte
/// blob can be ordered as a signed integer, a composite column tuple, or
/// anything else the caller encodes.
pub trait KeyComparator<const W: usize>: Send + Sync {
    /// Compares two keys, returning their relative order.
    fn compare(&self, a: &IndexKey<W>, b: &IndexKey<W>) -> Ordering;
}

/// Comparator that orders keys by raw byte content.
///
/// For keys produced by [`IndexKey::from_u64`] (big-endian encoding) this
/// coincides with unsigned numeric order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigEndianComparator;

impl<const W: usize> KeyComparator<W> for BigEndianComparator {
    #[inline]
    fn compare(&self, a: &IndexKey<W>, b: &IndexKey<W>) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}
