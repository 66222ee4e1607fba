//! Page cache configuration.

use vellum_common::constants::{
    DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_FRAME_COUNT, MIN_PAGE_SIZE,
};

/// Configuration for the page cache.
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Number of page frames in the cache.
    pub num_frames: usize,
    /// Page size in bytes.
    pub page_size: usize,
}

impl PageCacheConfig {
    /// Creates a new configuration with the specified number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the total memory used by the frame buffers.
    pub fn memory_usage(&self) -> usize {
        self.num_frames * self.page_size
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.num_frames < MIN_FRAME_COUNT {
            return Err("num_frames below minimum");
        }
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err("page_size below minimum");
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err("page_size above maximum");
        }
        Ok(())
    }
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_COUNT)
    }
}
