//! Concurrent B+ tree over the page cache.
//!
//! Every mutating operation opens a latch-coupling context rooted at the
//! tree's header page, descends to the target leaf holding the full path
//! under exclusive latches, performs the leaf mutation, then walks back up
//! the retained ancestor stack applying structural repair (split promotion
//! on insert, redistribute/merge and separator repair on delete). Readers
//! latch-couple downward with shared latches and never hold more than two
//! levels at once.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;
use vellum_common::types::{IndexKey, KeyComparator, PageId, RecordId};

use crate::buffer::{PageCache, WritePageGuard};

use super::error::{TreeError, TreeResult};
use super::header::{HeaderPage, HeaderPageMut};
use super::iterator::TreeIterator;
use super::node::{
    internal_capacity, leaf_capacity, node_type_of, InternalNode, InternalNodeMut, LeafNode,
    LeafNodeMut, NodeType,
};

/// Per-operation bookkeeping for a mutating descent.
///
/// Holds the write-latched header page, the stack of ancestor write guards
/// retained from root to the target leaf's parent, and (for deletes) the
/// parallel stack of child slots taken at each ancestor. Dropping the
/// context releases every retained latch and pin.
struct Context {
    header: WritePageGuard,
    root_page_id: PageId,
    write_set: Vec<WritePageGuard>,
    slot_set: Vec<usize>,
}

impl Context {
    fn new(header: WritePageGuard, root_page_id: PageId) -> Self {
        Self {
            header,
            root_page_id,
            write_set: Vec::new(),
            slot_set: Vec::new(),
        }
    }
}

/// A disk-resident B+ tree index mapping fixed-width keys to record ids.
///
/// Keys are unique; ordering is delegated to the injected comparator. The
/// tree is safe under arbitrary thread interleaving: writers serialize on
/// the header page's exclusive latch and retain the root-to-leaf path while
/// mutating, readers couple shared latches down the same paths.
pub struct BPlusTree<const W: usize, C: KeyComparator<W>> {
    /// Index name, used only for diagnostics.
    name: String,
    /// Page holding the root pointer.
    header_page_id: PageId,
    /// The shared page cache.
    cache: Arc<PageCache>,
    /// Injected key ordering.
    comparator: C,
    /// Split threshold for leaf nodes.
    leaf_max_size: u32,
    /// Split threshold for internal nodes.
    internal_max_size: u32,
}

impl<const W: usize, C: KeyComparator<W>> BPlusTree<W, C> {
    /// Creates a tree over an already-allocated header page, initializing
    /// it to the empty state.
    ///
    /// # Panics
    ///
    /// Panics if the configured node sizes cannot fit a page or are too
    /// small for the rebalancing algorithms.
    pub fn new(
        name: impl Into<String>,
        header_page_id: PageId,
        cache: Arc<PageCache>,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> TreeResult<Self> {
        let page_size = cache.page_size();
        assert!(
            leaf_max_size >= 2 && (leaf_max_size as usize) <= leaf_capacity(page_size, W),
            "leaf_max_size {leaf_max_size} out of range for page size {page_size}"
        );
        assert!(
            internal_max_size >= 3
                && (internal_max_size as usize) <= internal_capacity(page_size, W),
            "internal_max_size {internal_max_size} out of range for page size {page_size}"
        );

        let mut guard = cache.fetch_write(header_page_id)?;
        HeaderPageMut::new(guard.data_mut()).init();
        drop(guard);

        Ok(Self {
            name: name.into(),
            header_page_id,
            cache,
            comparator,
            leaf_max_size,
            internal_max_size,
        })
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current root page id (`INVALID` for an empty tree).
    pub fn root_page_id(&self) -> TreeResult<PageId> {
        let guard = self.cache.fetch_read(self.header_page_id)?;
        Ok(HeaderPage::new(guard.data()).root_page_id())
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> TreeResult<bool> {
        let header = self.cache.fetch_read(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(true);
        }
        let guard = self.cache.fetch_read(root_id)?;
        drop(header);
        Ok(match node_type_of(guard.data()) {
            Some(NodeType::Leaf) => LeafNode::<W>::new(guard.data()).size() == 0,
            _ => false,
        })
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Point lookup: returns the record id stored under `key`, if any.
    ///
    /// Descends with shared-latch coupling; at most two pages are latched
    /// at any moment.
    pub fn get_value(&self, key: &IndexKey<W>) -> TreeResult<Option<RecordId>> {
        let header = self.cache.fetch_read(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(None);
        }
        let mut guard = self.cache.fetch_read(root_id)?;
        drop(header);

        loop {
            match node_type_of(guard.data()) {
                Some(NodeType::Leaf) => {
                    let leaf = LeafNode::<W>::new(guard.data());
                    let size = leaf.size() as usize;
                    for i in 0..size {
                        if self.comparator.compare(key, &leaf.key_at(i)) == Ordering::Equal {
                            return Ok(Some(leaf.record_at(i)));
                        }
                    }
                    return Ok(None);
                }
                Some(NodeType::Internal) => {
                    let node = InternalNode::<W>::new(guard.data());
                    let child = node.child_at(self.child_slot(&node, key));
                    // Acquire the child before releasing the parent
                    guard = self.cache.fetch_read(child)?;
                }
                None => unreachable!("tree page without a layout tag"),
            }
        }
    }

    /// Returns the slot of the child to descend into for `key`.
    ///
    /// The smallest `i` with `key < key_at(i)` sends the search to child
    /// `i - 1`; keys at or beyond the last separator go to the last child.
    /// Slot 0's key is never compared.
    fn child_slot(&self, node: &InternalNode<'_, W>, key: &IndexKey<W>) -> usize {
        let size = node.size() as usize;
        for i in 1..size {
            if self.comparator.compare(key, &node.key_at(i)) == Ordering::Less {
                return i - 1;
            }
        }
        size - 1
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a unique `(key, record)` pair.
    ///
    /// Returns `Ok(false)` without modifying the tree if the key is already
    /// present. Page-cache exhaustion surfaces as an error after all held
    /// latches are released.
    pub fn insert(&self, key: &IndexKey<W>, record: RecordId) -> TreeResult<bool> {
        let mut header = self.cache.fetch_write(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();

        if !root_id.is_valid() {
            // Start a new tree: a single leaf root
            let (leaf_id, basic) = self.cache.new_page()?;
            let mut leaf_guard = basic.upgrade_write();
            let mut leaf = LeafNodeMut::<W>::init(leaf_guard.data_mut(), self.leaf_max_size);
            leaf.insert_slot_at(0, key, record);
            HeaderPageMut::new(header.data_mut()).set_root_page_id(leaf_id);
            debug!(index = %self.name, root = leaf_id.as_u32(), "started new tree");
            return Ok(true);
        }

        let mut ctx = Context::new(header, root_id);
        let mut leaf_guard = self.descend_write(key, &mut ctx, false)?;

        let (dup, size, max_size) = {
            let leaf = LeafNode::<W>::new(leaf_guard.data());
            let size = leaf.size() as usize;
            let dup = (0..size)
                .any(|i| self.comparator.compare(key, &leaf.key_at(i)) == Ordering::Equal);
            (dup, size, leaf.max_size() as usize)
        };
        if dup {
            return Ok(false);
        }

        if size < max_size {
            let mut leaf = LeafNodeMut::<W>::new(leaf_guard.data_mut());
            let pos = self.leaf_insert_slot(&leaf, key);
            leaf.insert_slot_at(pos, key, record);
            return Ok(true);
        }

        // The leaf is full: split it, keeping the first ⌈m/2⌉ entries in
        // place and moving the rest to a fresh right sibling. The promoted
        // separator is the moved half's first key, taken before the
        // incoming pair is placed.
        let m = size;
        let split_at = m.div_ceil(2);
        let promoted = LeafNode::<W>::new(leaf_guard.data()).key_at(split_at);

        let (new_leaf_id, basic) = self.cache.new_page()?;
        let mut new_guard = basic.upgrade_write();
        {
            let old = LeafNode::<W>::new(leaf_guard.data());
            let mut new_leaf = LeafNodeMut::<W>::init(new_guard.data_mut(), self.leaf_max_size);
            new_leaf.increase_size((m - split_at) as i32);
            for (idx, i) in (split_at..m).enumerate() {
                new_leaf.set_key_at(idx, &old.key_at(i));
                new_leaf.set_record_at(idx, old.record_at(i));
            }
            new_leaf.set_next_page_id(old.next_page_id());
        }
        {
            let mut old = LeafNodeMut::<W>::new(leaf_guard.data_mut());
            old.increase_size(-((m - split_at) as i32));
            old.set_next_page_id(new_leaf_id);
        }
        debug!(
            index = %self.name,
            left = leaf_guard.page_id().as_u32(),
            right = new_leaf_id.as_u32(),
            "split leaf"
        );

        // Place the incoming pair on the side the promoted key assigns it
        {
            let target = if self.comparator.compare(key, &promoted) == Ordering::Greater {
                &mut new_guard
            } else {
                &mut leaf_guard
            };
            let mut leaf = LeafNodeMut::<W>::new(target.data_mut());
            let pos = self.leaf_insert_slot(&leaf, key);
            leaf.insert_slot_at(pos, key, record);
        }

        self.propagate_split(&mut ctx, promoted, new_leaf_id)?;
        Ok(true)
    }

    /// Carries a pending `(separator, right-page)` promotion up the
    /// retained ancestor stack, splitting full internal nodes on the way.
    /// When the stack empties with a promotion outstanding, a fresh root is
    /// created.
    fn propagate_split(
        &self,
        ctx: &mut Context,
        mut pending_key: IndexKey<W>,
        mut pending_child: PageId,
    ) -> TreeResult<()> {
        loop {
            let Some(mut parent_guard) = ctx.write_set.pop() else {
                // The split reached the old root: grow the tree by one level
                let (new_root_id, basic) = self.cache.new_page()?;
                let mut root_guard = basic.upgrade_write();
                let mut root =
                    InternalNodeMut::<W>::init(root_guard.data_mut(), self.internal_max_size);
                root.increase_size(2);
                root.set_child_at(0, ctx.root_page_id);
                root.set_key_at(1, &pending_key);
                root.set_child_at(1, pending_child);
                HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(new_root_id);
                debug!(index = %self.name, root = new_root_id.as_u32(), "grew new root");
                return Ok(());
            };

            let (size, max_size) = {
                let parent = InternalNode::<W>::new(parent_guard.data());
                (parent.size() as usize, parent.max_size() as usize)
            };
            if size < max_size {
                let mut parent = InternalNodeMut::<W>::new(parent_guard.data_mut());
                let pos = self.internal_insert_slot(&parent, &pending_key);
                parent.insert_slot_at(pos, &pending_key, pending_child);
                return Ok(());
            }

            // Split the full internal node. The naive middle is ⌈m/2⌉; if
            // the pending key belongs left of it the split point shifts to
            // ⌊m/2⌋, and if the pending key then falls between the halves
            // it is itself promoted, with the displaced middle entry
            // re-inserted into the left half.
            let m = size;
            let mut middle = m.div_ceil(2);
            let mut middle_key = InternalNode::<W>::new(parent_guard.data()).key_at(middle);
            let pending_goes_left =
                self.comparator.compare(&pending_key, &middle_key) == Ordering::Less;
            let mut displaced_middle = false;
            if pending_goes_left {
                middle = m / 2;
                middle_key = InternalNode::<W>::new(parent_guard.data()).key_at(middle);
                if self.comparator.compare(&pending_key, &middle_key) != Ordering::Less {
                    displaced_middle = true;
                    std::mem::swap(&mut pending_key, &mut middle_key);
                }
            }

            let (new_id, basic) = self.cache.new_page()?;
            let mut new_guard = basic.upgrade_write();
            {
                let parent = InternalNode::<W>::new(parent_guard.data());
                let mut new_node =
                    InternalNodeMut::<W>::init(new_guard.data_mut(), self.internal_max_size);
                new_node.increase_size((m - middle) as i32);
                if displaced_middle {
                    new_node.set_child_at(0, pending_child);
                    pending_child = parent.child_at(middle);
                } else {
                    new_node.set_child_at(0, parent.child_at(middle));
                }
                for (idx, i) in (middle + 1..m).enumerate() {
                    new_node.set_key_at(idx + 1, &parent.key_at(i));
                    new_node.set_child_at(idx + 1, parent.child_at(i));
                }
            }
            InternalNodeMut::<W>::new(parent_guard.data_mut())
                .increase_size(-((m - middle) as i32));
            debug!(
                index = %self.name,
                left = parent_guard.page_id().as_u32(),
                right = new_id.as_u32(),
                "split internal node"
            );

            {
                let target = if pending_goes_left {
                    &mut parent_guard
                } else {
                    &mut new_guard
                };
                let mut node = InternalNodeMut::<W>::new(target.data_mut());
                let pos = self.internal_insert_slot(&node, &pending_key);
                node.insert_slot_at(pos, &pending_key, pending_child);
            }

            pending_key = middle_key;
            pending_child = new_id;
        }
    }

    /// Sorted position for a key in a leaf (no duplicates present).
    fn leaf_insert_slot(&self, leaf: &LeafNodeMut<'_, W>, key: &IndexKey<W>) -> usize {
        let size = leaf.size() as usize;
        for i in 0..size {
            if self.comparator.compare(key, &leaf.key_at(i)) == Ordering::Less {
                return i;
            }
        }
        size
    }

    /// Sorted position for a separator among an internal node's keys
    /// `[1, size)`.
    fn internal_insert_slot(&self, node: &InternalNodeMut<'_, W>, key: &IndexKey<W>) -> usize {
        let size = node.size() as usize;
        for i in 1..size {
            if self.comparator.compare(key, &node.key_at(i)) == Ordering::Less {
                return i;
            }
        }
        size
    }

    /// Descends from the root to the target leaf, retaining every ancestor
    /// write guard in the context. Records the child slot taken at each
    /// ancestor when `record_slots` is set.
    fn descend_write(
        &self,
        key: &IndexKey<W>,
        ctx: &mut Context,
        record_slots: bool,
    ) -> TreeResult<WritePageGuard> {
        let mut guard = self.cache.fetch_write(ctx.root_page_id)?;
        loop {
            match node_type_of(guard.data()) {
                Some(NodeType::Leaf) => return Ok(guard),
                Some(NodeType::Internal) => {
                    let (slot, child) = {
                        let node = InternalNode::<W>::new(guard.data());
                        let slot = self.child_slot(&node, key);
                        (slot, node.child_at(slot))
                    };
                    let child_guard = self.cache.fetch_write(child)?;
                    ctx.write_set.push(guard);
                    if record_slots {
                        ctx.slot_set.push(slot);
                    }
                    guard = child_guard;
                }
                None => unreachable!("tree page without a layout tag"),
            }
        }
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes `key` from the tree; a no-op if the key is absent.
    pub fn remove(&self, key: &IndexKey<W>) -> TreeResult<()> {
        let header = self.cache.fetch_write(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(());
        }

        let mut ctx = Context::new(header, root_id);
        let mut leaf_guard = self.descend_write(key, &mut ctx, true)?;

        let found = {
            let leaf = LeafNode::<W>::new(leaf_guard.data());
            let size = leaf.size() as usize;
            (0..size).find(|&i| self.comparator.compare(key, &leaf.key_at(i)) == Ordering::Equal)
        };
        let Some(pos) = found else {
            return Ok(());
        };
        LeafNodeMut::<W>::new(leaf_guard.data_mut()).remove_slot_at(pos);

        let (size, min_size) = {
            let leaf = LeafNode::<W>::new(leaf_guard.data());
            (leaf.size(), leaf.min_size())
        };

        if ctx.write_set.is_empty() {
            // The root leaf may shrink below min_size, down to empty
            if size == 0 {
                HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(PageId::INVALID);
                let old_root = leaf_guard.page_id();
                drop(leaf_guard);
                self.cache.delete_page(old_root)?;
                debug!(index = %self.name, "tree emptied");
            }
            return Ok(());
        }

        if size >= min_size {
            // No underflow; ancestors that used the removed key as a
            // separator still need it replaced with the leaf's first key
            let first = LeafNode::<W>::new(leaf_guard.data()).key_at(0);
            self.repair_separators(&mut ctx, key, &first);
            return Ok(());
        }

        self.rebalance_leaf(ctx, leaf_guard, key)
    }

    /// Repairs an underflowing non-root leaf by stealing from or merging
    /// with a sibling, then propagates structural repair upward.
    fn rebalance_leaf(
        &self,
        mut ctx: Context,
        mut leaf_guard: WritePageGuard,
        key: &IndexKey<W>,
    ) -> TreeResult<()> {
        let mut parent_guard = ctx.write_set.pop().expect("non-root leaf has a parent");
        let leaf_slot = ctx.slot_set.pop().expect("slot stack parallels ancestors");

        let (parent_size, prev_id, next_id) = {
            let parent = InternalNode::<W>::new(parent_guard.data());
            let size = parent.size() as usize;
            let prev = (leaf_slot > 0).then(|| parent.child_at(leaf_slot - 1));
            let next = (leaf_slot + 1 < size).then(|| parent.child_at(leaf_slot + 1));
            (size, prev, next)
        };
        debug_assert!(leaf_slot < parent_size);

        let mut prev_guard = prev_id.map(|id| self.cache.fetch_write(id)).transpose()?;
        let mut next_guard = next_id.map(|id| self.cache.fetch_write(id)).transpose()?;
        let prev_size = prev_guard
            .as_ref()
            .map_or(0, |g| LeafNode::<W>::new(g.data()).size());
        let next_size = next_guard
            .as_ref()
            .map_or(0, |g| LeafNode::<W>::new(g.data()).size());
        let min_size = LeafNode::<W>::new(leaf_guard.data()).min_size();

        if prev_size.max(next_size) > min_size {
            // Redistribute: the larger sibling can spare an entry. Ties and
            // the single-sibling cases prefer the left neighbor.
            let steal_from_prev = match (&prev_guard, &next_guard) {
                (Some(_), Some(_)) => next_size <= prev_size,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => unreachable!("underflowing leaf with no siblings"),
            };

            if steal_from_prev {
                let prev_g = prev_guard.as_mut().unwrap();
                {
                    let prev = LeafNode::<W>::new(prev_g.data());
                    let donor = prev.size() as usize - 1;
                    let (k, r) = (prev.key_at(donor), prev.record_at(donor));
                    LeafNodeMut::<W>::new(leaf_guard.data_mut()).insert_slot_at(0, &k, r);
                }
                LeafNodeMut::<W>::new(prev_g.data_mut()).increase_size(-1);
                let first = LeafNode::<W>::new(leaf_guard.data()).key_at(0);
                InternalNodeMut::<W>::new(parent_guard.data_mut()).set_key_at(leaf_slot, &first);
            } else {
                let next_g = next_guard.as_mut().unwrap();
                {
                    let next = LeafNode::<W>::new(next_g.data());
                    let (k, r) = (next.key_at(0), next.record_at(0));
                    let mut leaf = LeafNodeMut::<W>::new(leaf_guard.data_mut());
                    let end = leaf.size() as usize;
                    leaf.insert_slot_at(end, &k, r);
                }
                LeafNodeMut::<W>::new(next_g.data_mut()).remove_slot_at(0);
                let next_first = LeafNode::<W>::new(next_g.data()).key_at(0);
                let mut parent = InternalNodeMut::<W>::new(parent_guard.data_mut());
                parent.set_key_at(leaf_slot + 1, &next_first);
                if leaf_slot > 0 {
                    let first = LeafNode::<W>::new(leaf_guard.data()).key_at(0);
                    parent.set_key_at(leaf_slot, &first);
                }
            }
            debug!(
                index = %self.name,
                leaf = leaf_guard.page_id().as_u32(),
                "redistributed leaf entries"
            );

            let first = LeafNode::<W>::new(leaf_guard.data()).key_at(0);
            self.repair_separators(&mut ctx, key, &first);
            return Ok(());
        }

        // Merge into the left page of the pair; the left sibling is the
        // partner whenever it exists. The drained page keeps its forward
        // pointer so an in-flight scan still pinning it walks off through
        // the chain.
        let (mut into_guard, mut from_guard, sep_slot) = if leaf_slot > 0 {
            (prev_guard.take().unwrap(), leaf_guard, leaf_slot)
        } else {
            (leaf_guard, next_guard.take().unwrap(), leaf_slot + 1)
        };
        let delete_key = InternalNode::<W>::new(parent_guard.data()).key_at(sep_slot);
        {
            let from = LeafNode::<W>::new(from_guard.data());
            let mut into = LeafNodeMut::<W>::new(into_guard.data_mut());
            let base = into.size() as usize;
            let count = from.size() as usize;
            into.increase_size(count as i32);
            for i in 0..count {
                into.set_key_at(base + i, &from.key_at(i));
                into.set_record_at(base + i, from.record_at(i));
            }
            into.set_next_page_id(from.next_page_id());
        }
        {
            let mut from = LeafNodeMut::<W>::new(from_guard.data_mut());
            let count = from.size() as i32;
            from.increase_size(-count);
        }
        debug!(
            index = %self.name,
            into = into_guard.page_id().as_u32(),
            drained = from_guard.page_id().as_u32(),
            "merged leaves"
        );

        // The drained page is unreachable once the chain bypasses it; a
        // scan still pinning it keeps the frame alive and delete_page
        // leaves it behind, so the reclaim is best effort.
        let drained = from_guard.page_id();
        drop(from_guard);
        self.cache.delete_page(drained)?;

        let update_key = LeafNode::<W>::new(into_guard.data()).key_at(0);
        self.propagate_merge(ctx, parent_guard, delete_key, update_key, key)
    }

    /// Removes the separator of a merged-away child from its parent and
    /// repairs underflow up the ancestor stack.
    fn propagate_merge(
        &self,
        mut ctx: Context,
        mut current_guard: WritePageGuard,
        mut delete_key: IndexKey<W>,
        update_key: IndexKey<W>,
        removed_key: &IndexKey<W>,
    ) -> TreeResult<()> {
        loop {
            // Drop the separator that referenced the drained page
            {
                let node = InternalNode::<W>::new(current_guard.data());
                let size = node.size() as usize;
                let pos = (1..size)
                    .find(|&i| {
                        self.comparator.compare(&delete_key, &node.key_at(i)) == Ordering::Equal
                    })
                    .expect("separator of a merged child is present in its parent");
                InternalNodeMut::<W>::new(current_guard.data_mut()).remove_slot_at(pos);
            }

            let (size, min_size) = {
                let node = InternalNode::<W>::new(current_guard.data());
                (node.size(), node.min_size())
            };

            if ctx.write_set.is_empty() {
                // Root level: an internal root down to a single child hands
                // the tree over to that child
                if size == 1 {
                    let child = InternalNode::<W>::new(current_guard.data()).child_at(0);
                    HeaderPageMut::new(ctx.header.data_mut()).set_root_page_id(child);
                    let old_root = current_guard.page_id();
                    drop(current_guard);
                    self.cache.delete_page(old_root)?;
                    debug!(index = %self.name, root = child.as_u32(), "collapsed root");
                }
                return Ok(());
            }

            if size >= min_size {
                self.repair_separators(&mut ctx, removed_key, &update_key);
                return Ok(());
            }

            let mut grand_guard = ctx.write_set.pop().expect("non-root node has a parent");
            let cur_slot = ctx.slot_set.pop().expect("slot stack parallels ancestors");

            let (grand_size, prev_id, next_id) = {
                let grand = InternalNode::<W>::new(grand_guard.data());
                let gsize = grand.size() as usize;
                let prev = (cur_slot > 0).then(|| grand.child_at(cur_slot - 1));
                let next = (cur_slot + 1 < gsize).then(|| grand.child_at(cur_slot + 1));
                (gsize, prev, next)
            };
            debug_assert!(cur_slot < grand_size);

            let mut prev_guard = prev_id.map(|id| self.cache.fetch_write(id)).transpose()?;
            let mut next_guard = next_id.map(|id| self.cache.fetch_write(id)).transpose()?;
            let prev_size = prev_guard
                .as_ref()
                .map_or(0, |g| InternalNode::<W>::new(g.data()).size());
            let next_size = next_guard
                .as_ref()
                .map_or(0, |g| InternalNode::<W>::new(g.data()).size());

            if prev_size.max(next_size) > min_size {
                // Internal redistribute: the grandparent separator rotates
                // through the underflowing node
                let steal_from_prev = match (&prev_guard, &next_guard) {
                    (Some(_), Some(_)) => next_size <= prev_size,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => unreachable!("underflowing node with no siblings"),
                };

                if steal_from_prev {
                    let prev_g = prev_guard.as_mut().unwrap();
                    let sep = InternalNode::<W>::new(grand_guard.data()).key_at(cur_slot);
                    let (donor_key, donor_child) = {
                        let prev = InternalNode::<W>::new(prev_g.data());
                        let donor = prev.size() as usize - 1;
                        (prev.key_at(donor), prev.child_at(donor))
                    };
                    {
                        let mut cur = InternalNodeMut::<W>::new(current_guard.data_mut());
                        let child0 = cur.child_at(0);
                        cur.insert_slot_at(1, &sep, child0);
                        cur.set_child_at(0, donor_child);
                    }
                    InternalNodeMut::<W>::new(grand_guard.data_mut())
                        .set_key_at(cur_slot, &donor_key);
                    InternalNodeMut::<W>::new(prev_g.data_mut()).increase_size(-1);
                } else {
                    let next_g = next_guard.as_mut().unwrap();
                    let sep = InternalNode::<W>::new(grand_guard.data()).key_at(cur_slot + 1);
                    let (riser, first_child) = {
                        let next = InternalNode::<W>::new(next_g.data());
                        (next.key_at(1), next.child_at(0))
                    };
                    {
                        let mut cur = InternalNodeMut::<W>::new(current_guard.data_mut());
                        let end = cur.size() as usize;
                        cur.increase_size(1);
                        cur.set_key_at(end, &sep);
                        cur.set_child_at(end, first_child);
                    }
                    InternalNodeMut::<W>::new(grand_guard.data_mut())
                        .set_key_at(cur_slot + 1, &riser);
                    {
                        let mut next = InternalNodeMut::<W>::new(next_g.data_mut());
                        let second = next.child_at(1);
                        next.set_child_at(0, second);
                        next.remove_slot_at(1);
                    }
                }
                debug!(
                    index = %self.name,
                    node = current_guard.page_id().as_u32(),
                    "redistributed internal entries"
                );

                self.repair_separators(&mut ctx, removed_key, &update_key);
                return Ok(());
            }

            // Internal merge: fold the grandparent's separator down between
            // the two halves
            let (mut into_guard, from_guard, sep_slot) = if cur_slot > 0 {
                (prev_guard.take().unwrap(), current_guard, cur_slot)
            } else {
                (current_guard, next_guard.take().unwrap(), cur_slot + 1)
            };
            let folded = InternalNode::<W>::new(grand_guard.data()).key_at(sep_slot);
            {
                let from = InternalNode::<W>::new(from_guard.data());
                let mut into = InternalNodeMut::<W>::new(into_guard.data_mut());
                let base = into.size() as usize;
                let count = from.size() as usize;
                into.increase_size(count as i32);
                into.set_key_at(base, &folded);
                into.set_child_at(base, from.child_at(0));
                for i in 1..count {
                    into.set_key_at(base + i, &from.key_at(i));
                    into.set_child_at(base + i, from.child_at(i));
                }
            }
            let drained = from_guard.page_id();
            {
                let mut from_guard = from_guard;
                let mut from = InternalNodeMut::<W>::new(from_guard.data_mut());
                let count = from.size() as i32;
                from.increase_size(-count);
            }
            self.cache.delete_page(drained)?;
            debug!(
                index = %self.name,
                into = into_guard.page_id().as_u32(),
                drained = drained.as_u32(),
                "merged internal nodes"
            );

            delete_key = folded;
            current_guard = grand_guard;
            drop(into_guard);
        }
    }

    /// Walks the remaining ancestors replacing any descent-slot separator
    /// equal to the removed key with the surviving first key.
    fn repair_separators(
        &self,
        ctx: &mut Context,
        removed_key: &IndexKey<W>,
        update_key: &IndexKey<W>,
    ) {
        while let Some(mut guard) = ctx.write_set.pop() {
            let slot = ctx.slot_set.pop().expect("slot stack parallels ancestors");
            if slot == 0 {
                continue;
            }
            let matches = {
                let node = InternalNode::<W>::new(guard.data());
                self.comparator.compare(&node.key_at(slot), removed_key) == Ordering::Equal
            };
            if matches {
                InternalNodeMut::<W>::new(guard.data_mut()).set_key_at(slot, update_key);
            }
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Returns an iterator positioned at the leftmost entry, or the end
    /// iterator for an empty tree.
    pub fn begin(&self) -> TreeResult<TreeIterator<W>> {
        let header = self.cache.fetch_read(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(TreeIterator::end(Arc::clone(&self.cache)));
        }
        let mut guard = self.cache.fetch_read(root_id)?;
        drop(header);

        loop {
            match node_type_of(guard.data()) {
                Some(NodeType::Leaf) => break,
                Some(NodeType::Internal) => {
                    let child = InternalNode::<W>::new(guard.data()).child_at(0);
                    guard = self.cache.fetch_read(child)?;
                }
                None => unreachable!("tree page without a layout tag"),
            }
        }

        if LeafNode::<W>::new(guard.data()).size() == 0 {
            return Ok(TreeIterator::end(Arc::clone(&self.cache)));
        }
        Ok(TreeIterator::pointing(Arc::clone(&self.cache), guard, 0))
    }

    /// Returns an iterator positioned at the entry with exactly `key`, or
    /// the end iterator if the key is absent.
    pub fn begin_at(&self, key: &IndexKey<W>) -> TreeResult<TreeIterator<W>> {
        let header = self.cache.fetch_read(self.header_page_id)?;
        let root_id = HeaderPage::new(header.data()).root_page_id();
        if !root_id.is_valid() {
            return Ok(TreeIterator::end(Arc::clone(&self.cache)));
        }
        let mut guard = self.cache.fetch_read(root_id)?;
        drop(header);

        loop {
            match node_type_of(guard.data()) {
                Some(NodeType::Leaf) => {
                    let slot = {
                        let leaf = LeafNode::<W>::new(guard.data());
                        let size = leaf.size() as usize;
                        (0..size).find(|&i| {
                            self.comparator.compare(key, &leaf.key_at(i)) == Ordering::Equal
                        })
                    };
                    return Ok(match slot {
                        Some(slot) => TreeIterator::pointing(Arc::clone(&self.cache), guard, slot),
                        None => TreeIterator::end(Arc::clone(&self.cache)),
                    });
                }
                Some(NodeType::Internal) => {
                    let node = InternalNode::<W>::new(guard.data());
                    let child = node.child_at(self.child_slot(&node, key));
                    guard = self.cache.fetch_read(child)?;
                }
                None => unreachable!("tree page without a layout tag"),
            }
        }
    }

    /// Returns the end iterator.
    pub fn end(&self) -> TreeIterator<W> {
        TreeIterator::end(Arc::clone(&self.cache))
    }

    // =========================================================================
    // Utilities and debug
    // =========================================================================

    /// Renders the tree as a Graphviz `digraph`.
    ///
    /// Debug aid only; takes no latch-coupling care beyond per-page read
    /// guards.
    pub fn to_graphviz(&self) -> TreeResult<String> {
        let mut out = String::from("digraph btree {\n");
        out.push_str("  node [shape=record];\n");
        let root_id = self.root_page_id()?;
        if root_id.is_valid() {
            self.graphviz_subtree(root_id, &mut out)?;
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn graphviz_subtree(&self, page_id: PageId, out: &mut String) -> TreeResult<()> {
        let guard = self.cache.fetch_read(page_id)?;
        match node_type_of(guard.data()) {
            Some(NodeType::Leaf) => {
                let leaf = LeafNode::<W>::new(guard.data());
                let keys: Vec<String> = (0..leaf.size() as usize)
                    .map(|i| leaf.key_at(i).to_string())
                    .collect();
                let _ = writeln!(
                    out,
                    "  leaf_{page_id} [label=\"P{page_id}|{}\"];",
                    keys.join("|")
                );
                if leaf.next_page_id().is_valid() {
                    let _ = writeln!(
                        out,
                        "  leaf_{page_id} -> leaf_{} [style=dashed];",
                        leaf.next_page_id()
                    );
                }
            }
            Some(NodeType::Internal) => {
                let node = InternalNode::<W>::new(guard.data());
                let size = node.size() as usize;
                let keys: Vec<String> = (1..size).map(|i| node.key_at(i).to_string()).collect();
                let _ = writeln!(
                    out,
                    "  int_{page_id} [label=\"P{page_id}|{}\"];",
                    keys.join("|")
                );
                let children: Vec<PageId> = (0..size).map(|i| node.child_at(i)).collect();
                drop(guard);
                for child in children {
                    let child_guard = self.cache.fetch_read(child)?;
                    let prefix = match node_type_of(child_guard.data()) {
                        Some(NodeType::Leaf) => "leaf",
                        _ => "int",
                    };
                    drop(child_guard);
                    let _ = writeln!(out, "  int_{page_id} -> {prefix}_{child};");
                    self.graphviz_subtree(child, out)?;
                }
            }
            None => unreachable!("tree page without a layout tag"),
        }
        Ok(())
    }

    /// Renders the tree as an indented string, one node per line.
    ///
    /// Returns `"()"` for an empty tree.
    pub fn pretty_print(&self) -> TreeResult<String> {
        let root_id = self.root_page_id()?;
        if !root_id.is_valid() {
            return Ok("()".to_string());
        }
        let mut out = String::new();
        self.pretty_subtree(root_id, 0, &mut out)?;
        Ok(out)
    }

    fn pretty_subtree(&self, page_id: PageId, depth: usize, out: &mut String) -> TreeResult<()> {
        let guard = self.cache.fetch_read(page_id)?;
        let indent = "  ".repeat(depth);
        match node_type_of(guard.data()) {
            Some(NodeType::Leaf) => {
                let leaf = LeafNode::<W>::new(guard.data());
                let keys: Vec<String> = (0..leaf.size() as usize)
                    .map(|i| leaf.key_at(i).to_string())
                    .collect();
                let next = leaf.next_page_id();
                let _ = writeln!(
                    out,
                    "{indent}Leaf[{page_id}] next={next} keys=({})",
                    keys.join(",")
                );
            }
            Some(NodeType::Internal) => {
                let node = InternalNode::<W>::new(guard.data());
                let size = node.size() as usize;
                let keys: Vec<String> = (1..size).map(|i| node.key_at(i).to_string()).collect();
                let _ = writeln!(out, "{indent}Internal[{page_id}] keys=({})", keys.join(","));
                let children: Vec<PageId> = (0..size).map(|i| node.child_at(i)).collect();
                drop(guard);
                for child in children {
                    self.pretty_subtree(child, depth + 1, out)?;
                }
            }
            None => unreachable!("tree page without a layout tag"),
        }
        Ok(())
    }

    /// Checks the structural invariants of the whole tree: uniform leaf
    /// depth, size bounds, in-node ordering, separator fences, and the
    /// leaf chain. Returns a corruption error naming the offending page.
    pub fn verify_integrity(&self) -> TreeResult<()> {
        let root_id = self.root_page_id()?;
        if !root_id.is_valid() {
            return Ok(());
        }

        let mut leaves = Vec::new();
        self.check_subtree(root_id, None, None, true, &mut leaves)?;

        // The chain must visit every leaf once, left to right
        for window in leaves.windows(2) {
            let guard = self.cache.fetch_read(window[0])?;
            let next = LeafNode::<W>::new(guard.data()).next_page_id();
            if next != window[1] {
                return Err(TreeError::corrupted(
                    window[0],
                    format!("leaf chain skips to {next}, expected {}", window[1]),
                ));
            }
        }
        let last = *leaves.last().expect("non-empty tree has a leaf");
        let guard = self.cache.fetch_read(last)?;
        let next = LeafNode::<W>::new(guard.data()).next_page_id();
        if next.is_valid() {
            return Err(TreeError::corrupted(
                last,
                "last leaf still points at a sibling",
            ));
        }
        Ok(())
    }

    /// Recursively checks one subtree; returns its leaf depth.
    fn check_subtree(
        &self,
        page_id: PageId,
        lower: Option<&IndexKey<W>>,
        upper: Option<&IndexKey<W>>,
        is_root: bool,
        leaves: &mut Vec<PageId>,
    ) -> TreeResult<usize> {
        let guard = self.cache.fetch_read(page_id)?;
        match node_type_of(guard.data()) {
            Some(NodeType::Leaf) => {
                let leaf = LeafNode::<W>::new(guard.data());
                let size = leaf.size() as usize;
                if !is_root && (size as u32) < leaf.min_size() {
                    return Err(TreeError::corrupted(page_id, "leaf below minimum size"));
                }
                if size as u32 > leaf.max_size() {
                    return Err(TreeError::corrupted(page_id, "leaf above maximum size"));
                }
                for i in 0..size {
                    let k = leaf.key_at(i);
                    if i > 0
                        && self.comparator.compare(&leaf.key_at(i - 1), &k) != Ordering::Less
                    {
                        return Err(TreeError::corrupted(page_id, "leaf keys out of order"));
                    }
                    if let Some(lo) = lower {
                        if self.comparator.compare(&k, lo) == Ordering::Less {
                            return Err(TreeError::corrupted(page_id, "leaf key below fence"));
                        }
                    }
                    if let Some(hi) = upper {
                        if self.comparator.compare(&k, hi) != Ordering::Less {
                            return Err(TreeError::corrupted(page_id, "leaf key above fence"));
                        }
                    }
                }
                leaves.push(page_id);
                Ok(1)
            }
            Some(NodeType::Internal) => {
                let node = InternalNode::<W>::new(guard.data());
                let size = node.size() as usize;
                if is_root {
                    if size < 2 {
                        return Err(TreeError::corrupted(page_id, "internal root below size 2"));
                    }
                } else if (size as u32) < node.min_size() {
                    return Err(TreeError::corrupted(page_id, "internal below minimum size"));
                }
                if size as u32 > node.max_size() {
                    return Err(TreeError::corrupted(page_id, "internal above maximum size"));
                }
                for i in 2..size {
                    if self.comparator.compare(&node.key_at(i - 1), &node.key_at(i))
                        != Ordering::Less
                    {
                        return Err(TreeError::corrupted(page_id, "separators out of order"));
                    }
                }

                let mut child_bounds = Vec::with_capacity(size);
                for i in 0..size {
                    let lo = if i == 0 { None } else { Some(node.key_at(i)) };
                    let hi = if i + 1 == size {
                        None
                    } else {
                        Some(node.key_at(i + 1))
                    };
                    child_bounds.push((node.child_at(i), lo, hi));
                }
                drop(guard);

                let mut depth = None;
                for (child, lo, hi) in child_bounds {
                    let lo = lo.as_ref().or(lower);
                    let hi = hi.as_ref().or(upper);
                    let d = self.check_subtree(child, lo, hi, false, leaves)?;
                    if let Some(expect) = depth {
                        if d != expect {
                            return Err(TreeError::corrupted(
                                page_id,
                                "leaves at unequal depths",
                            ));
                        }
                    }
                    depth = Some(d);
                }
                Ok(depth.expect("internal node has children") + 1)
            }
            None => Err(TreeError::corrupted(page_id, "page without a layout tag")),
        }
    }
}

impl<const W: usize, C: KeyComparator<W>> std::fmt::Debug for BPlusTree<W, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("name", &self.name)
            .field("header_page_id", &self.header_page_id)
            .field("leaf_max_size", &self.leaf_max_size)
            .field("internal_max_size", &self.internal_max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PageCacheConfig;
    use vellum_common::types::BigEndianComparator;

    fn make_tree(
        leaf_max: u32,
        internal_max: u32,
    ) -> (Arc<PageCache>, BPlusTree<8, BigEndianComparator>) {
        let cache = Arc::new(PageCache::new(PageCacheConfig::new(256)).unwrap());
        let (header_id, guard) = cache.new_page().unwrap();
        drop(guard);
        let tree = BPlusTree::new(
            "test_index",
            header_id,
            Arc::clone(&cache),
            BigEndianComparator,
            leaf_max,
            internal_max,
        )
        .unwrap();
        (cache, tree)
    }

    fn key(v: u64) -> IndexKey<8> {
        IndexKey::from_u64(v)
    }

    fn rid(v: u64) -> RecordId {
        RecordId::new(v)
    }

    #[test]
    fn test_empty_tree() {
        let (_cache, tree) = make_tree(4, 4);
        assert!(tree.is_empty().unwrap());
        assert!(!tree.root_page_id().unwrap().is_valid());
        assert_eq!(tree.get_value(&key(1)).unwrap(), None);
        assert!(tree.begin().unwrap().is_end());
        assert_eq!(tree.pretty_print().unwrap(), "()");
    }

    #[test]
    fn test_single_leaf_insert_get() {
        let (_cache, tree) = make_tree(4, 4);
        assert!(tree.insert(&key(1), rid(10)).unwrap());
        assert!(tree.insert(&key(2), rid(20)).unwrap());
        assert!(tree.insert(&key(3), rid(30)).unwrap());

        assert!(!tree.is_empty().unwrap());
        assert_eq!(tree.get_value(&key(2)).unwrap(), Some(rid(20)));
        assert_eq!(tree.get_value(&key(4)).unwrap(), None);
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_cache, tree) = make_tree(4, 4);
        assert!(tree.insert(&key(1), rid(10)).unwrap());
        assert!(!tree.insert(&key(1), rid(99)).unwrap());
        assert_eq!(tree.get_value(&key(1)).unwrap(), Some(rid(10)));
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_leaf_split_promotes_middle_key() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=5 {
            assert!(tree.insert(&key(v), rid(v * 10)).unwrap());
        }
        // Leaf [1,2,3,4] splits on inserting 5: old keeps [1,2], new gets
        // [3,4,5], promoted separator is 3
        let root_id = tree.root_page_id().unwrap();
        let guard = tree.cache.fetch_read(root_id).unwrap();
        let root = InternalNode::<8>::new(guard.data());
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), key(3));

        let left = tree.cache.fetch_read(root.child_at(0)).unwrap();
        let right = tree.cache.fetch_read(root.child_at(1)).unwrap();
        let left_leaf = LeafNode::<8>::new(left.data());
        let right_leaf = LeafNode::<8>::new(right.data());
        assert_eq!(left_leaf.size(), 2);
        assert_eq!(right_leaf.size(), 3);
        assert_eq!(right_leaf.key_at(0), key(3));
        assert_eq!(left_leaf.next_page_id(), right.page_id());

        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_sequential_inserts_shape() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=7 {
            assert!(tree.insert(&key(v), rid(v)).unwrap());
        }
        // Expected: root separators [3, 5], leaves [1,2] [3,4] [5,6,7]
        let root_id = tree.root_page_id().unwrap();
        let guard = tree.cache.fetch_read(root_id).unwrap();
        let root = InternalNode::<8>::new(guard.data());
        assert_eq!(root.size(), 3);
        assert_eq!(root.key_at(1), key(3));
        assert_eq!(root.key_at(2), key(5));
        drop(guard);

        let collected: Vec<u64> = tree.begin().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(collected, vec![1, 2, 3, 4, 5, 6, 7]);
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_remove_without_underflow_repairs_separator() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=5 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        // Leaves [1,2] and [3,4,5] under separator 3; removing 3 leaves
        // [4,5] and the separator is repaired to 4
        tree.remove(&key(3)).unwrap();
        assert_eq!(tree.get_value(&key(3)).unwrap(), None);

        let root_id = tree.root_page_id().unwrap();
        let guard = tree.cache.fetch_read(root_id).unwrap();
        let root = InternalNode::<8>::new(guard.data());
        assert_eq!(root.key_at(1), key(4));
        drop(guard);
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_remove_merges_and_collapses_root() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=5 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        // [3,4,5] -> remove 5, 4: right leaf underflows with no donor
        // available, merges left, and the root hands over to the leaf
        tree.remove(&key(5)).unwrap();
        tree.verify_integrity().unwrap();
        tree.remove(&key(4)).unwrap();
        tree.verify_integrity().unwrap();

        let root_id = tree.root_page_id().unwrap();
        let guard = tree.cache.fetch_read(root_id).unwrap();
        assert_eq!(node_type_of(guard.data()), Some(NodeType::Leaf));
        let leaf = LeafNode::<8>::new(guard.data());
        assert_eq!(leaf.size(), 3);
        drop(guard);

        let collected: Vec<u64> = tree.begin().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(collected, vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_redistributes_from_larger_sibling() {
        let (_cache, tree) = make_tree(4, 4);
        for v in [1, 2, 3, 4, 5, 6] {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        // Leaves [1,2] [3,4,5,6]; removing 1 underflows the left leaf and
        // the right leaf can donate its first entry
        tree.remove(&key(1)).unwrap();
        tree.verify_integrity().unwrap();

        let collected: Vec<u64> = tree.begin().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(collected, vec![2, 3, 4, 5, 6]);

        let root_id = tree.root_page_id().unwrap();
        let guard = tree.cache.fetch_read(root_id).unwrap();
        let root = InternalNode::<8>::new(guard.data());
        assert_eq!(root.key_at(1), key(4));
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=5 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        tree.remove(&key(99)).unwrap();
        let collected: Vec<u64> = tree.begin().unwrap().map(|(k, _)| k.as_u64()).collect();
        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn test_empty_after_removing_everything() {
        let (_cache, tree) = make_tree(3, 3);
        for v in 1..=10 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        for v in 1..=10 {
            tree.remove(&key(v)).unwrap();
            tree.verify_integrity().unwrap();
        }
        assert!(tree.is_empty().unwrap());
        assert!(!tree.root_page_id().unwrap().is_valid());
        assert!(tree.begin().unwrap().is_end());
    }

    #[test]
    fn test_begin_at_positions_on_equal_key() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=7 {
            tree.insert(&key(v), rid(v * 10)).unwrap();
        }
        let it = tree.begin_at(&key(4)).unwrap();
        assert!(!it.is_end());
        assert_eq!(it.key(), key(4));
        assert_eq!(it.record_id(), rid(40));

        let missing = tree.begin_at(&key(42)).unwrap();
        assert!(missing.is_end());
        assert_eq!(missing, tree.end());
    }

    #[test]
    fn test_iterator_equality() {
        let (_cache, tree) = make_tree(4, 4);
        tree.insert(&key(1), rid(1)).unwrap();

        let a = tree.begin().unwrap();
        let b = tree.begin().unwrap();
        assert_eq!(a, b);

        let mut c = tree.begin().unwrap();
        c.advance().unwrap();
        assert!(c.is_end());
        assert_eq!(c, tree.end());
    }

    #[test]
    fn test_graphviz_and_pretty_print() {
        let (_cache, tree) = make_tree(4, 4);
        for v in 1..=5 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        let dot = tree.to_graphviz().unwrap();
        assert!(dot.starts_with("digraph btree {"));
        assert!(dot.contains("->"));

        let printed = tree.pretty_print().unwrap();
        assert!(printed.contains("Internal"));
        assert!(printed.contains("Leaf"));
    }

    #[test]
    fn test_interleaved_insert_remove_randomized() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use std::collections::BTreeMap;

        let (_cache, tree) = make_tree(3, 4);
        let mut oracle = BTreeMap::new();
        let mut rng = StdRng::seed_from_u64(0xB7EE);

        for _ in 0..600 {
            let v = rng.gen_range(0..120u64);
            if rng.gen_bool(0.6) {
                let inserted = tree.insert(&key(v), rid(v)).unwrap();
                assert_eq!(inserted, oracle.insert(v, v).is_none());
            } else {
                tree.remove(&key(v)).unwrap();
                oracle.remove(&v);
            }
            tree.verify_integrity().unwrap();
        }

        let collected: Vec<u64> = tree.begin().unwrap().map(|(k, _)| k.as_u64()).collect();
        let expected: Vec<u64> = oracle.keys().copied().collect();
        assert_eq!(collected, expected);
    }
}
