//! Index header page format.
//!
//! A tree's header page lives at a caller-supplied page id and records the
//! current root. It is mutated only when the root changes (first insert,
//! root split, root collapse, tree emptied).
//!
//! # Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       4   root_page_id (u32 LE, INVALID when the tree is empty)
//! ```
//!
//! The rest of the page is padding.

use vellum_common::types::PageId;

const ROOT_PAGE_ID_OFFSET: usize = 0;

/// Size of the meaningful header page prefix in bytes.
pub const HEADER_PAGE_SIZE: usize = 4;

/// Read-only view of a header page.
#[derive(Debug)]
pub struct HeaderPage<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPage<'a> {
    /// Creates a view into the given page buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`HEADER_PAGE_SIZE`].
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        assert!(
            data.len() >= HEADER_PAGE_SIZE,
            "buffer too small for header page"
        );
        Self { data }
    }

    /// Returns the current root page id.
    #[inline]
    pub fn root_page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[ROOT_PAGE_ID_OFFSET..ROOT_PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        PageId::from_le_bytes(bytes)
    }
}

/// Mutable view of a header page.
#[derive(Debug)]
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    /// Creates a mutable view into the given page buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`HEADER_PAGE_SIZE`].
    #[inline]
    pub fn new(data: &'a mut [u8]) -> Self {
        assert!(
            data.len() >= HEADER_PAGE_SIZE,
            "buffer too small for header page"
        );
        Self { data }
    }

    /// Initializes the header for an empty tree.
    pub fn init(&mut self) {
        self.set_root_page_id(PageId::INVALID);
    }

    /// Returns the current root page id.
    #[inline]
    pub fn root_page_id(&self) -> PageId {
        HeaderPage::new(self.data).root_page_id()
    }

    /// Records a new root page id.
    #[inline]
    pub fn set_root_page_id(&mut self, page_id: PageId) {
        self.data[ROOT_PAGE_ID_OFFSET..ROOT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&page_id.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        let mut buffer = vec![0u8; 4096];
        let mut header = HeaderPageMut::new(&mut buffer);
        header.init();
        assert!(!header.root_page_id().is_valid());
    }

    #[test]
    fn test_set_root() {
        let mut buffer = vec![0u8; 4096];
        {
            let mut header = HeaderPageMut::new(&mut buffer);
            header.init();
            header.set_root_page_id(PageId::new(7));
        }
        let header = HeaderPage::new(&buffer);
        assert_eq!(header.root_page_id(), PageId::new(7));
    }

    #[test]
    #[should_panic(expected = "buffer too small")]
    fn test_buffer_too_small() {
        let buffer = vec![0u8; 2];
        let _ = HeaderPage::new(&buffer);
    }
}
