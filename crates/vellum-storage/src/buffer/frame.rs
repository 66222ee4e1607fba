//! Buffer frame - a slot in the page cache that holds one page.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use vellum_common::types::PageId;

/// Shared-latch handle on a frame's page buffer.
pub type FrameReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8]>>;

/// Exclusive-latch handle on a frame's page buffer.
pub type FrameWriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>;

/// Frame identifier - index into the page cache's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: Self = Self(usize::MAX);

    /// Creates a new frame ID.
    #[inline]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Checks if this is a valid frame ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != usize::MAX
    }
}

impl From<usize> for FrameId {
    fn from(id: usize) -> Self {
        Self::new(id)
    }
}

/// A buffer frame holds a single page in memory.
///
/// Each frame has:
/// - The page buffer behind an `Arc<RwLock<..>>` - the lock doubles as the
///   page latch, and the `Arc` lets guards own the latch handle across
///   scopes
/// - The id of the resident page (`INVALID` when the frame is free)
/// - An atomic pin count (number of active guards)
///
/// Pin count and page id use atomics so fetches do not contend on the latch.
pub struct BufferFrame {
    /// Frame ID (index in the frame array).
    frame_id: FrameId,
    /// Page data buffer; the RwLock is the page latch.
    data: Arc<RwLock<Box<[u8]>>>,
    /// Page ID stored in this frame (INVALID if free).
    page_id: AtomicU32,
    /// Pin count (number of active guards).
    pin_count: AtomicU32,
}

impl BufferFrame {
    /// Creates a new empty buffer frame.
    pub fn new(frame_id: FrameId, page_size: usize) -> Self {
        Self {
            frame_id,
            data: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
            page_id: AtomicU32::new(PageId::INVALID.as_u32()),
            pin_count: AtomicU32::new(0),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID stored in this frame.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    /// Sets the page ID for this frame.
    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    /// Returns true if this frame is free (no page assigned).
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.page_id().is_valid()
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "unpinned frame with pin_count = 0");
        old - 1
    }

    /// Returns true if the frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Acquires the page latch in shared mode, blocking until granted.
    #[inline]
    pub fn latch_shared(&self) -> FrameReadLatch {
        self.data.read_arc()
    }

    /// Acquires the page latch in exclusive mode, blocking until granted.
    #[inline]
    pub fn latch_exclusive(&self) -> FrameWriteLatch {
        self.data.write_arc()
    }

    /// Resets the frame to the free state, zeroing the buffer.
    ///
    /// Caller must ensure the frame is unpinned and unlatched.
    pub fn reset(&self) {
        self.data.write().fill(0);
        self.page_id
            .store(PageId::INVALID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);
        assert_eq!(frame.frame_id().index(), 0);
        assert!(!frame.page_id().is_valid());
        assert!(frame.is_free());
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_pin_unpin() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);
        assert!(!frame.is_pinned());

        assert_eq!(frame.pin(), 1);
        assert!(frame.is_pinned());

        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), 1);
        assert!(frame.is_pinned());

        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_page_id() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);
        assert!(frame.is_free());

        frame.set_page_id(PageId::new(42));
        assert!(!frame.is_free());
        assert_eq!(frame.page_id(), PageId::new(42));
    }

    #[test]
    fn test_latch_data_access() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);

        {
            let mut data = frame.latch_exclusive();
            data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        }

        {
            let data = frame.latch_shared();
            assert_eq!(&data[0..4], &[1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_shared_latches_coexist() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);
        let a = frame.latch_shared();
        let b = frame.latch_shared();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_reset() {
        let frame = BufferFrame::new(FrameId::new(0), 4096);
        frame.set_page_id(PageId::new(42));
        frame.latch_exclusive()[0] = 0xFF;

        frame.reset();

        assert!(frame.is_free());
        assert_eq!(frame.pin_count(), 0);
        assert_eq!(frame.latch_shared()[0], 0);
    }

    #[test]
    fn test_frame_id() {
        assert!(!FrameId::INVALID.is_valid());
        assert!(FrameId::new(0).is_valid());
        assert_eq!(FrameId::new(42).index(), 42);
    }
}
