//! Stores.
//!
//! A store is a key/value store of byte values:
//!  - [`MemoryStore`]: an in-memory store backing transient arrays, and
//!  - [`FilesystemStore`]: a filesystem store backing persistent arrays.

mod filesystem_store;
mod memory_store;

pub use filesystem_store::{FilesystemStore, FilesystemStoreCreateError};
pub use memory_store::MemoryStore;
