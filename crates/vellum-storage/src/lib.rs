//! # vellum-storage
//!
//! Storage engine for the Vellum embedded database: a fixed-size page cache
//! handing out pinned, latched page guards, and a concurrent B+ tree index
//! built on top of it.
//!
//! The index maps fixed-width keys to opaque 64-bit record identifiers and
//! supports point lookup, insertion of unique keys, deletion, and ordered
//! leaf iteration under arbitrary thread interleaving.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Page cache: frames, guards, and the pool
pub mod buffer;

/// B+ tree index: node layouts and tree algorithms
pub mod index;
