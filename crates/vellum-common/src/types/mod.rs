//! Core types for Vellum.

mod ids;
mod keys;

pub use ids::{PageId, RecordId};
pub use keys::{BigEndianComparator, IndexKey, KeyComparator};
