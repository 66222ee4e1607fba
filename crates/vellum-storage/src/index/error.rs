//! Error types for the B+ tree index.

use thiserror::Error;
use vellum_common::types::PageId;

use crate::buffer::BufferError;

/// Result type for index operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur in B+ tree operations.
///
/// Duplicate keys and absent keys are not errors: `insert` reports a
/// duplicate as `Ok(false)`, `get_value` reports absence as `Ok(None)`, and
/// `remove` of an absent key is an `Ok(())` no-op. The error channel carries
/// only operational page-cache failures and corruption detected by the
/// integrity checker.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Page cache error, surfaced unchanged after all guards are released.
    #[error("page cache error: {0}")]
    Buffer(#[from] BufferError),

    /// The tree violates a structural invariant.
    #[error("corrupted tree at page {page_id}: {reason}")]
    Corrupted {
        /// The page where the violation was detected.
        page_id: PageId,
        /// Description of the violated invariant.
        reason: String,
    },
}

impl TreeError {
    /// Creates a corruption error.
    pub fn corrupted(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            page_id,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreeError::corrupted(PageId::new(42), "leaf depth mismatch");
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("leaf depth mismatch"));
    }

    #[test]
    fn test_error_from_buffer() {
        let err: TreeError = BufferError::PoolExhausted.into();
        assert!(matches!(err, TreeError::Buffer(BufferError::PoolExhausted)));
    }
}
