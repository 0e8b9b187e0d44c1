//! POI Store - persistent store boundary
//!
//! The node treats its persistent store as an external collaborator with a
//! small capability set ([`DocumentStore`]). [`MemoryDocumentStore`] backs
//! tests and single-process deployments; the typed databases layer chain
//! namespacing and JSON encoding on top.

#![forbid(unsafe_code)]

pub mod collection;
pub mod databases;
pub mod store;

pub use collection::Collection;
pub use databases::*;
pub use store::{DocumentStore, KeyRange, MemoryDocumentStore, StoreError, StoreResult};
