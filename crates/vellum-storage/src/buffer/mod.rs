//! Page cache for Vellum.
//!
//! The page cache manages a fixed-size pool of in-memory page frames and is
//! the only shared mutable state in the engine. It provides:
//!
//! - **Pinning**: reference counting keeps a page's frame resident while any
//!   guard holds it
//! - **Latching**: a reader-writer latch per page, acquired and released
//!   through RAII guards
//! - **Allocation**: `new_page` hands out fresh pinned pages; `delete_page`
//!   returns unpinned pages to the free list
//!
//! Replacement policy, eviction, and the disk manager live outside this
//! contract; the pool fails with [`BufferError::PoolExhausted`] when every
//! frame is in use.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                   PageCache                   │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │     Page Table: HashMap<PageId, FrameId>│  │
//! │  └─────────────────────────────────────────┘  │
//! │                      │                        │
//! │                      ▼                        │
//! │  ┌─────────┐ ┌─────────┐     ┌─────────┐      │
//! │  │ Frame 0 │ │ Frame 1 │ ... │ Frame N │      │
//! │  │ page_id │ │ page_id │     │ page_id │      │
//! │  │ pin_cnt │ │ pin_cnt │     │ pin_cnt │      │
//! │  │ latch   │ │ latch   │     │ latch   │      │
//! │  │ data[]  │ │ data[]  │     │ data[]  │      │
//! │  └─────────┘ └─────────┘     └─────────┘      │
//! └───────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod frame;
mod guard;
mod pool;

pub use config::PageCacheConfig;
pub use error::{BufferError, BufferResult};
pub use frame::{BufferFrame, FrameId, FrameReadLatch, FrameWriteLatch};
pub use guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
pub use pool::PageCache;

/// Statistics for page cache monitoring.
#[derive(Debug, Clone, Default)]
pub struct PageCacheStats {
    /// Total number of page fetches.
    pub fetches: u64,
    /// Number of pages allocated via `new_page`.
    pub allocations: u64,
    /// Number of pages returned to the free list.
    pub deletions: u64,
    /// Current number of pinned frames.
    pub pinned_frames: usize,
    /// Current number of free frames.
    pub free_frames: usize,
}

impl PageCacheStats {
    /// Returns the number of frames currently holding a page.
    pub fn resident_pages(&self, num_frames: usize) -> usize {
        num_frames - self.free_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_resident_pages() {
        let stats = PageCacheStats {
            free_frames: 3,
            ..Default::default()
        };
        assert_eq!(stats.resident_pages(10), 7);
    }
}
