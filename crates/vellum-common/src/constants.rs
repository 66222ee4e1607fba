//! System-wide constants for Vellum.
//!
//! This module defines constants used across the database.

// =============================================================================
// Page Constants
// =============================================================================

/// Default page size in bytes (4 KB).
///
/// Matches the typical OS page size and SSD block size; every page in the
/// cache is exactly this many bytes unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum page size in bytes (512 B).
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Page Cache Constants
// =============================================================================

/// Default number of frames in the page cache.
pub const DEFAULT_FRAME_COUNT: usize = 1024;

/// Minimum number of frames the page cache accepts.
///
/// A mutating tree operation can hold the header page, a root-to-leaf path,
/// two siblings, and a freshly allocated page at once; anything below this
/// makes the cache unusable for an index.
pub const MIN_FRAME_COUNT: usize = 16;
