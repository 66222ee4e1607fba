//! Ordered iteration over the leaf chain.
//!
//! An iterator is either *pointing* - holding a read guard on a leaf and a
//! slot index within it - or *end*. Advancing off the last slot of a leaf
//! drops the current guard before latching the next leaf, so an iterator
//! never holds two latches and never waits on a latch while holding one.

use std::sync::Arc;

use vellum_common::types::{IndexKey, PageId, RecordId};

use crate::buffer::{PageCache, ReadPageGuard};

use super::error::TreeResult;
use super::node::LeafNode;

/// Cursor over a tree's leaf chain in key order.
///
/// Obtained from `BPlusTree::begin` / `begin_at`; compares equal to another
/// iterator when both point at the same `(page, slot)` or both are at the
/// end.
pub struct TreeIterator<const W: usize> {
    cache: Arc<PageCache>,
    /// Current leaf guard and slot index, or `None` at the end.
    position: Option<(ReadPageGuard, usize)>,
}

impl<const W: usize> TreeIterator<W> {
    /// Creates an iterator pointing at `slot` of the given leaf.
    pub(crate) fn pointing(cache: Arc<PageCache>, guard: ReadPageGuard, slot: usize) -> Self {
        debug_assert!((slot as u32) < LeafNode::<W>::new(guard.data()).size());
        Self {
            cache,
            position: Some((guard, slot)),
        }
    }

    /// Creates an end iterator.
    pub(crate) fn end(cache: Arc<PageCache>) -> Self {
        Self {
            cache,
            position: None,
        }
    }

    /// Returns true if the iterator is past the last entry.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.position.is_none()
    }

    /// Returns the page id of the current leaf, or `INVALID` at the end.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.position
            .as_ref()
            .map_or(PageId::INVALID, |(guard, _)| guard.page_id())
    }

    /// Returns the current slot index, or 0 at the end.
    #[inline]
    pub fn slot(&self) -> usize {
        self.position.as_ref().map_or(0, |&(_, slot)| slot)
    }

    /// Returns the current entry, or `None` at the end.
    pub fn entry(&self) -> Option<(IndexKey<W>, RecordId)> {
        let (guard, slot) = self.position.as_ref()?;
        let leaf = LeafNode::<W>::new(guard.data());
        Some((leaf.key_at(*slot), leaf.record_at(*slot)))
    }

    /// Returns the current key.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is at the end.
    pub fn key(&self) -> IndexKey<W> {
        self.entry().expect("dereferenced an end iterator").0
    }

    /// Returns the current record id.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is at the end.
    pub fn record_id(&self) -> RecordId {
        self.entry().expect("dereferenced an end iterator").1
    }

    /// Moves to the next entry.
    ///
    /// Walking off the last slot releases the current leaf, then follows the
    /// sibling chain; drained leaves left behind by merges are skipped. A
    /// no-op at the end.
    pub fn advance(&mut self) -> TreeResult<()> {
        let Some((guard, slot)) = self.position.take() else {
            return Ok(());
        };

        let mut guard = guard;
        let mut slot = slot + 1;
        loop {
            let (size, next) = {
                let leaf = LeafNode::<W>::new(guard.data());
                (leaf.size() as usize, leaf.next_page_id())
            };
            if slot < size {
                self.position = Some((guard, slot));
                return Ok(());
            }
            drop(guard);
            if !next.is_valid() {
                return Ok(());
            }
            guard = self.cache.fetch_read(next)?;
            slot = 0;
        }
    }
}

impl<const W: usize> PartialEq for TreeIterator<W> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.position, &other.position) {
            (None, None) => true,
            (Some((a, i)), Some((b, j))) => a.page_id() == b.page_id() && i == j,
            _ => false,
        }
    }
}

impl<const W: usize> std::fmt::Debug for TreeIterator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.position {
            Some((guard, slot)) => f
                .debug_struct("TreeIterator")
                .field("page_id", &guard.page_id())
                .field("slot", slot)
                .finish(),
            None => write!(f, "TreeIterator(end)"),
        }
    }
}

impl<const W: usize> Iterator for TreeIterator<W> {
    type Item = (IndexKey<W>, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entry()?;
        self.advance().ok()?;
        Some(entry)
    }
}
