//! B+ tree index over the page cache.
//!
//! The index maps fixed-width keys to opaque record identifiers with a
//! disk-page node layout:
//!
//! - **Header page** (`header.rs`): a singleton page holding the root
//!   pointer, mutated only on root change
//! - **Node layouts** (`node.rs`): internal and leaf page formats with
//!   zero-copy typed views over raw page bytes
//! - **Tree algorithms** (`tree.rs`): search, insert with split
//!   propagation, delete with redistribute/merge propagation
//! - **Iterator** (`iterator.rs`): ordered traversal of the leaf chain
//!
//! ## Concurrency
//!
//! Writers take the header page's exclusive latch first and retain the full
//! root-to-leaf path under exclusive latches while mutating (pessimistic
//! crab-latching); readers couple shared latches from parent to child and
//! hold at most two at a time. Structural changes install separators into
//! parents before any exclusive latch is released, so concurrent readers
//! only ever observe consistent trees.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use vellum_common::types::{BigEndianComparator, IndexKey, RecordId};
//! use vellum_storage::buffer::{PageCache, PageCacheConfig};
//! use vellum_storage::index::BPlusTree;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(PageCache::new(PageCacheConfig::new(64))?);
//! let (header_id, guard) = cache.new_page()?;
//! drop(guard);
//!
//! let tree: BPlusTree<8, _> = BPlusTree::new(
//!     "orders_pk",
//!     header_id,
//!     Arc::clone(&cache),
//!     BigEndianComparator,
//!     64,
//!     64,
//! )?;
//!
//! tree.insert(&IndexKey::from_u64(42), RecordId::new(7))?;
//! assert_eq!(tree.get_value(&IndexKey::from_u64(42))?, Some(RecordId::new(7)));
//! # Ok(())
//! # }
//! ```

mod error;
mod header;
mod iterator;
mod node;
mod tree;

pub use error::{TreeError, TreeResult};
pub use header::{HeaderPage, HeaderPageMut, HEADER_PAGE_SIZE};
pub use iterator::TreeIterator;
pub use node::{
    internal_capacity, leaf_capacity, node_type_of, InternalNode, InternalNodeMut, LeafNode,
    LeafNodeMut, NodeType, LEAF_HEADER_SIZE, NODE_HEADER_SIZE,
};
pub use tree::BPlusTree;
