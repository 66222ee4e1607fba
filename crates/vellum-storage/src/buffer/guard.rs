//! Page guards: scoped acquisition of (pin, optional latch) on a page.
//!
//! Three guard flavors share one contract - a guard owns exactly one pin and
//! at most one latch on its page, and releases both on every exit path:
//!
//! - [`BasicPageGuard`]: pin only; convertible into the latched flavors
//! - [`ReadPageGuard`]: pin + shared latch, immutable page access
//! - [`WritePageGuard`]: pin + exclusive latch, mutable page access
//!
//! Guards are move-only. Field order guarantees the latch handle drops
//! before the pin is released.

use std::sync::Arc;

use vellum_common::types::PageId;

use super::frame::{BufferFrame, FrameReadLatch, FrameWriteLatch};

/// Owned pin on a buffer frame, released on drop.
struct FramePin {
    frame: Arc<BufferFrame>,
}

impl FramePin {
    /// Takes ownership of one pin already counted on `frame`.
    fn new(frame: Arc<BufferFrame>) -> Self {
        Self { frame }
    }
}

impl Drop for FramePin {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

/// Pin-only guard on a page.
///
/// Keeps the page resident without taking its latch. Used for pages that
/// are about to be latched (see [`upgrade_read`](Self::upgrade_read) /
/// [`upgrade_write`](Self::upgrade_write)), such as freshly allocated pages
/// whose layout the caller still has to initialize.
pub struct BasicPageGuard {
    page_id: PageId,
    pin: FramePin,
}

impl BasicPageGuard {
    /// Creates a guard over a frame that has already been pinned once on
    /// behalf of this guard.
    pub(crate) fn new(frame: Arc<BufferFrame>, page_id: PageId) -> Self {
        Self {
            page_id,
            pin: FramePin::new(frame),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Acquires the page's shared latch, converting into a read guard.
    ///
    /// Blocks until the latch is granted. The pin is carried over.
    pub fn upgrade_read(self) -> ReadPageGuard {
        let latch = self.pin.frame.latch_shared();
        ReadPageGuard {
            page_id: self.page_id,
            latch,
            pin: self.pin,
        }
    }

    /// Acquires the page's exclusive latch, converting into a write guard.
    ///
    /// Blocks until the latch is granted. The pin is carried over.
    pub fn upgrade_write(self) -> WritePageGuard {
        let latch = self.pin.frame.latch_exclusive();
        WritePageGuard {
            page_id: self.page_id,
            latch,
            pin: self.pin,
        }
    }
}

impl std::fmt::Debug for BasicPageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicPageGuard")
            .field("page_id", &self.page_id)
            .finish()
    }
}

/// Read guard on a page: pin + shared latch.
///
/// Any number of read guards may coexist on one page in the absence of a
/// write guard. Dropping the guard releases the latch, then the pin.
pub struct ReadPageGuard {
    page_id: PageId,
    // Declared before `pin`: the latch must release before the unpin.
    latch: FrameReadLatch,
    pin: FramePin,
}

impl ReadPageGuard {
    pub(crate) fn new(frame: Arc<BufferFrame>, page_id: PageId) -> Self {
        let latch = frame.latch_shared();
        Self {
            page_id,
            latch,
            pin: FramePin::new(frame),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page buffer.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.latch
    }
}

impl std::fmt::Debug for ReadPageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPageGuard")
            .field("page_id", &self.page_id)
            .finish()
    }
}

/// Write guard on a page: pin + exclusive latch.
///
/// At most one write guard exists on a page at a time, excluding all read
/// guards. Dropping the guard releases the latch, then the pin.
pub struct WritePageGuard {
    page_id: PageId,
    // Declared before `pin`: the latch must release before the unpin.
    latch: FrameWriteLatch,
    pin: FramePin,
}

impl WritePageGuard {
    pub(crate) fn new(frame: Arc<BufferFrame>, page_id: PageId) -> Self {
        let latch = frame.latch_exclusive();
        Self {
            page_id,
            latch,
            pin: FramePin::new(frame),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page buffer.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.latch
    }

    /// Returns the page buffer mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.latch
    }
}

impl std::fmt::Debug for WritePageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePageGuard")
            .field("page_id", &self.page_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::frame::FrameId;

    fn pinned_frame() -> Arc<BufferFrame> {
        let frame = Arc::new(BufferFrame::new(FrameId::new(0), 4096));
        frame.set_page_id(PageId::new(42));
        frame.pin();
        frame
    }

    #[test]
    fn test_basic_guard_unpins_on_drop() {
        let frame = pinned_frame();
        assert_eq!(frame.pin_count(), 1);
        {
            let guard = BasicPageGuard::new(Arc::clone(&frame), PageId::new(42));
            assert_eq!(guard.page_id(), PageId::new(42));
        }
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_read_guard_releases_latch_and_pin() {
        let frame = pinned_frame();
        {
            let guard = ReadPageGuard::new(Arc::clone(&frame), PageId::new(42));
            let _ = guard.data();
        }
        assert_eq!(frame.pin_count(), 0);
        // Latch must be free again
        let _relatch = frame.latch_exclusive();
    }

    #[test]
    fn test_write_guard_mutates_data() {
        let frame = pinned_frame();
        {
            let mut guard = WritePageGuard::new(Arc::clone(&frame), PageId::new(42));
            guard.data_mut()[0..4].copy_from_slice(&[5, 6, 7, 8]);
        }
        assert_eq!(frame.pin_count(), 0);
        assert_eq!(&frame.latch_shared()[0..4], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_upgrade_keeps_single_pin() {
        let frame = pinned_frame();
        let basic = BasicPageGuard::new(Arc::clone(&frame), PageId::new(42));
        assert_eq!(frame.pin_count(), 1);

        let read = basic.upgrade_read();
        assert_eq!(frame.pin_count(), 1);
        drop(read);
        assert_eq!(frame.pin_count(), 0);

        frame.pin();
        let basic = BasicPageGuard::new(Arc::clone(&frame), PageId::new(42));
        let mut write = basic.upgrade_write();
        assert_eq!(frame.pin_count(), 1);
        write.data_mut()[0] = 1;
        drop(write);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_two_read_guards_coexist() {
        let frame = pinned_frame();
        frame.pin();
        let a = ReadPageGuard::new(Arc::clone(&frame), PageId::new(42));
        let b = ReadPageGuard::new(Arc::clone(&frame), PageId::new(42));
        assert_eq!(a.data().len(), b.data().len());
    }
}
