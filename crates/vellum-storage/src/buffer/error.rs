//! Page cache errors.

use thiserror::Error;
use vellum_common::types::PageId;

/// Result type for page cache operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during page cache operations.
#[derive(Debug, Clone, Error)]
pub enum BufferError {
    /// Every frame is pinned or resident; `new_page` cannot allocate.
    #[error("page cache exhausted, no free frames available")]
    PoolExhausted,

    /// Fetch of the invalid sentinel page id.
    #[error("attempted to fetch the invalid page id")]
    InvalidPageId,

    /// Fetch of a page id that was never allocated (or was deleted).
    #[error("page {page_id} not present in the cache")]
    PageNotFound {
        /// The missing page id.
        page_id: PageId,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a page not found error.
    pub fn page_not_found(page_id: PageId) -> Self {
        Self::PageNotFound { page_id }
    }

    /// Returns true if this error indicates a caller bug rather than an
    /// operational condition.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self, Self::InvalidPageId | Self::PageNotFound { .. })
    }
}
