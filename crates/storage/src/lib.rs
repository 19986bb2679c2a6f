//! Blob store adapters: a local directory tree and an in-process map.

pub mod fs;
pub mod memory;

pub use fs::FsBlobStore;
pub use memory::{BlobOp, MemoryBlobStore, StoredObject};
