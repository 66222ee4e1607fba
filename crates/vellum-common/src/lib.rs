//! # vellum-common
//!
//! Common types and constants for the Vellum embedded database.
//!
//! This crate provides the foundational types shared by all Vellum
//! components:
//!
//! - **Types**: Core identifiers (`PageId`, `RecordId`), fixed-width index
//!   keys and comparators
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use vellum_common::types::{IndexKey, PageId, RecordId};
//!
//! let page_id = PageId::new(42);
//! let rid = RecordId::new(7);
//! let key: IndexKey<8> = IndexKey::from_u64(1234);
//! assert!(page_id.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::{BigEndianComparator, IndexKey, KeyComparator, PageId, RecordId};
