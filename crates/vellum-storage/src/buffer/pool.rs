//! Page cache implementation.
//!
//! The cache owns a fixed array of frames and a page table mapping resident
//! page ids to frames. Pages are created with `new_page`, fetched with one
//! of the `fetch_*` flavors, and returned to the free list with
//! `delete_page` once merged away and unpinned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;
use vellum_common::types::PageId;

use super::config::PageCacheConfig;
use super::error::{BufferError, BufferResult};
use super::frame::{BufferFrame, FrameId};
use super::guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
use super::PageCacheStats;

/// The page cache for the storage engine.
///
/// All page access goes through guards handed out by this type; the cache
/// itself is shared by `Arc` and passed to every component that needs pages.
/// There is deliberately no replacement policy here - the engine's working
/// set is bounded by the frame count, and `new_page` fails with
/// [`BufferError::PoolExhausted`] once every frame holds a page.
pub struct PageCache {
    /// Configuration.
    config: PageCacheConfig,
    /// Array of buffer frames.
    frames: Vec<Arc<BufferFrame>>,
    /// Page table: maps PageId -> FrameId for resident pages.
    page_table: RwLock<HashMap<PageId, FrameId>>,
    /// Frames not currently holding a page.
    free_frames: Mutex<Vec<FrameId>>,
    /// Next page ID to hand out.
    next_page_id: AtomicU32,
    /// Fetch counter for statistics.
    fetch_count: AtomicU64,
    /// Allocation counter for statistics.
    alloc_count: AtomicU64,
    /// Deletion counter for statistics.
    delete_count: AtomicU64,
}

impl PageCache {
    /// Creates a new page cache with the given configuration.
    pub fn new(config: PageCacheConfig) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames: Vec<Arc<BufferFrame>> = (0..config.num_frames)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i), config.page_size)))
            .collect();

        // Hand frames out from the front of the array
        let free_frames = (0..config.num_frames).rev().map(FrameId::new).collect();

        Ok(Self {
            config,
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_frames: Mutex::new(free_frames),
            next_page_id: AtomicU32::new(0),
            fetch_count: AtomicU64::new(0),
            alloc_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        })
    }

    /// Fetches a page with a pin but no latch.
    pub fn fetch_basic(&self, page_id: PageId) -> BufferResult<BasicPageGuard> {
        let frame = self.lookup_and_pin(page_id)?;
        Ok(BasicPageGuard::new(frame, page_id))
    }

    /// Fetches a page with a pin and its shared latch.
    ///
    /// Blocks until the latch is granted.
    pub fn fetch_read(&self, page_id: PageId) -> BufferResult<ReadPageGuard> {
        let frame = self.lookup_and_pin(page_id)?;
        Ok(ReadPageGuard::new(frame, page_id))
    }

    /// Fetches a page with a pin and its exclusive latch.
    ///
    /// Blocks until the latch is granted.
    pub fn fetch_write(&self, page_id: PageId) -> BufferResult<WritePageGuard> {
        let frame = self.lookup_and_pin(page_id)?;
        Ok(WritePageGuard::new(frame, page_id))
    }

    /// Allocates a fresh zeroed page and returns it pinned.
    ///
    /// The caller initializes the page's layout before making its id
    /// reachable from any other page.
    pub fn new_page(&self) -> BufferResult<(PageId, BasicPageGuard)> {
        let frame_id = self
            .free_frames
            .lock()
            .pop()
            .ok_or(BufferError::PoolExhausted)?;
        let frame = Arc::clone(&self.frames[frame_id.index()]);

        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));
        // Free frames are unlatched; this cannot block.
        frame.latch_exclusive().fill(0);
        frame.set_page_id(page_id);
        frame.pin();

        self.page_table.write().insert(page_id, frame_id);
        self.alloc_count.fetch_add(1, Ordering::Relaxed);
        trace!(page_id = page_id.as_u32(), "allocated page");

        Ok((page_id, BasicPageGuard::new(frame, page_id)))
    }

    /// Returns an unpinned page's frame to the free list.
    ///
    /// Returns `Ok(false)` without side effects if the page is pinned.
    /// Deleting a page that is not resident is a no-op reported as `Ok(true)`.
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<bool> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId);
        }

        let mut table = self.page_table.write();
        let Some(&frame_id) = table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return Ok(false);
        }

        table.remove(&page_id);
        frame.reset();
        drop(table);

        self.free_frames.lock().push(frame_id);
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        trace!(page_id = page_id.as_u32(), "deleted page");
        Ok(true)
    }

    /// Returns true if the page is resident in the cache.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.read().contains_key(&page_id)
    }

    /// Returns the configured page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns the number of frames in the cache.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns statistics about the page cache.
    pub fn stats(&self) -> PageCacheStats {
        let pinned = self.frames.iter().filter(|f| f.is_pinned()).count();
        PageCacheStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            allocations: self.alloc_count.load(Ordering::Relaxed),
            deletions: self.delete_count.load(Ordering::Relaxed),
            pinned_frames: pinned,
            free_frames: self.free_frames.lock().len(),
        }
    }

    /// Looks up a resident page and pins its frame.
    ///
    /// The pin happens under the page-table lock so a concurrent
    /// `delete_page` cannot free the frame between lookup and pin. The latch
    /// (if any) is acquired by the guard after the lock is released.
    fn lookup_and_pin(&self, page_id: PageId) -> BufferResult<Arc<BufferFrame>> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId);
        }
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let table = self.page_table.read();
        let frame_id = *table
            .get(&page_id)
            .ok_or(BufferError::PageNotFound { page_id })?;
        let frame = Arc::clone(&self.frames[frame_id.index()]);
        frame.pin();
        Ok(frame)
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("num_frames", &self.config.num_frames)
            .field("page_size", &self.config.page_size)
            .field("resident_pages", &self.page_table.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cache(num_frames: usize) -> PageCache {
        PageCache::new(PageCacheConfig::new(num_frames)).unwrap()
    }

    #[test]
    fn test_cache_creation() {
        let cache = create_test_cache(16);
        assert_eq!(cache.num_frames(), 16);
        assert_eq!(cache.page_size(), 4096);
        assert_eq!(cache.stats().free_frames, 16);
    }

    #[test]
    fn test_new_page() {
        let cache = create_test_cache(16);
        let (page_id, guard) = cache.new_page().unwrap();
        assert_eq!(guard.page_id(), page_id);
        assert!(cache.contains(page_id));

        drop(guard);
        // Still resident after unpinning
        assert!(cache.contains(page_id));
    }

    #[test]
    fn test_new_page_ids_unique() {
        let cache = create_test_cache(16);
        let (a, _ga) = cache.new_page().unwrap();
        let (b, _gb) = cache.new_page().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fetch_round_trip() {
        let cache = create_test_cache(16);
        let (page_id, guard) = cache.new_page().unwrap();
        {
            let mut w = guard.upgrade_write();
            w.data_mut()[0..4].copy_from_slice(&[9, 8, 7, 6]);
        }

        let r = cache.fetch_read(page_id).unwrap();
        assert_eq!(&r.data()[0..4], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_fetch_invalid_page_id() {
        let cache = create_test_cache(16);
        assert!(matches!(
            cache.fetch_read(PageId::INVALID),
            Err(BufferError::InvalidPageId)
        ));
    }

    #[test]
    fn test_fetch_missing_page() {
        let cache = create_test_cache(16);
        assert!(matches!(
            cache.fetch_read(PageId::new(123)),
            Err(BufferError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_pool_exhaustion() {
        let cache = create_test_cache(16);
        let mut guards = Vec::new();
        for _ in 0..16 {
            guards.push(cache.new_page().unwrap());
        }
        assert!(matches!(
            cache.new_page(),
            Err(BufferError::PoolExhausted)
        ));
    }

    #[test]
    fn test_delete_page() {
        let cache = create_test_cache(16);
        let (page_id, guard) = cache.new_page().unwrap();

        // Pinned pages cannot be deleted
        assert!(!cache.delete_page(page_id).unwrap());
        drop(guard);

        assert!(cache.delete_page(page_id).unwrap());
        assert!(!cache.contains(page_id));
        assert_eq!(cache.stats().free_frames, 16);

        // Deleting again is a no-op
        assert!(cache.delete_page(page_id).unwrap());
    }

    #[test]
    fn test_delete_frees_frame_for_reuse() {
        let cache = create_test_cache(16);
        let mut pages = Vec::new();
        for _ in 0..16 {
            let (pid, guard) = cache.new_page().unwrap();
            drop(guard);
            pages.push(pid);
        }
        assert!(matches!(cache.new_page(), Err(BufferError::PoolExhausted)));

        cache.delete_page(pages[0]).unwrap();
        let (fresh, _guard) = cache.new_page().unwrap();
        assert_ne!(fresh, pages[0]);
    }

    #[test]
    fn test_new_page_zeroed_after_reuse() {
        let cache = create_test_cache(16);
        let (pid, guard) = cache.new_page().unwrap();
        {
            let mut w = guard.upgrade_write();
            w.data_mut().fill(0xAB);
        }
        cache.delete_page(pid).unwrap();

        // The freed frame is handed out again; its buffer must come back clean
        let (fresh, guard) = cache.new_page().unwrap();
        assert_ne!(fresh, pid);
        let r = guard.upgrade_read();
        assert!(r.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_stats() {
        let cache = create_test_cache(16);
        let (page_id, guard) = cache.new_page().unwrap();
        let _r = cache.fetch_read(page_id).unwrap();
        drop(guard);

        let stats = cache.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.pinned_frames, 1);
        assert_eq!(stats.free_frames, 15);
    }

    #[test]
    fn test_concurrent_fetches() {
        use std::thread;

        let cache = Arc::new(create_test_cache(16));
        let (page_id, guard) = cache.new_page().unwrap();
        {
            let mut w = guard.upgrade_write();
            w.data_mut()[0] = 0x5A;
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let r = cache.fetch_read(page_id).unwrap();
                    assert_eq!(r.data()[0], 0x5A);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.stats().pinned_frames, 0);
    }
}
