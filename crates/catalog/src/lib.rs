//! Run catalog client abstraction for Outsource.
//!
//! This crate provides the read-only query interface the selection layer
//! consumes, plus a snapshot-backed reference implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod snapshot;

pub use trait_::{Catalog, CatalogError, CatalogQuery, Projection, SortOrder, Result};
pub use snapshot::SnapshotCatalog;
