//! Storage.
//!
//! Storage is layered:
//!  - a [store] is a key/value store of byte values ([`MemoryStore`](store::MemoryStore), [`FilesystemStore`](store::FilesystemStore)), and
//!  - a [chunk store](chunk_store) persists the encoded chunks and metadata of one array on top of a store, with either a sparse (one value per chunk) or contiguous (one frame) layout.
//!
//! [`remove`] deletes persisted array storage at a path.

pub mod chunk_store;
mod storage_sync;
pub mod store;
mod store_key;

use std::path::Path;

use thiserror::Error;

use crate::byte_range::{ByteOffset, InvalidByteRangeError};

pub use chunk_store::{
    ChunkStoreTraits, ContiguousChunkStore, SparseChunkStore,
};
pub use store_key::{StoreKey, StoreKeyError, StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ReadableStorageTraits, ReadableWritableStorageTraits, WritableStorageTraits,
};

/// [`Option<Vec<u8>>`]
pub type MaybeBytes = Option<Vec<u8>>;

/// A [`StoreKey`], [`ByteOffset`], and value (bytes).
#[derive(Debug, Clone)]
#[must_use]
pub struct StoreKeyStartValue<'a> {
    /// The key.
    key: StoreKey,
    /// The starting byte offset.
    start: ByteOffset,
    /// The store value.
    value: &'a [u8],
}

impl StoreKeyStartValue<'_> {
    /// Create a new [`StoreKeyStartValue`].
    pub const fn new(key: StoreKey, start: ByteOffset, value: &[u8]) -> StoreKeyStartValue {
        StoreKeyStartValue { key, start, value }
    }

    /// Get the offset of exclusive end of the [`StoreKeyStartValue`].
    #[must_use]
    pub const fn end(&self) -> ByteOffset {
        self.start + self.value.len() as u64
    }
}

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An error parsing the metadata for a key.
    #[error("error parsing metadata for {0}: {1}")]
    InvalidMetadata(StoreKey, String),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid byte range.
    #[error("invalid byte range {0}")]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// A chunk recorded by a contiguous frame is missing or truncated.
    #[error("chunk {0:?} is missing from the frame")]
    MissingChunk(Vec<u64>),
    /// A contiguous frame is corrupt.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Returns true if the error reports a chunk that is expected but absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MissingChunk(_))
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Remove the persisted storage at `path`.
///
/// A directory (sparse layout) is removed recursively, and a file (contiguous layout) is removed.
/// Removing a path that does not exist succeeds.
///
/// # Errors
/// Returns a [`StorageError`] if the path exists but cannot be removed.
pub fn remove<P: AsRef<Path>>(path: P) -> Result<(), StorageError> {
    let path = path.as_ref();
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => {
            log::debug!("removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
