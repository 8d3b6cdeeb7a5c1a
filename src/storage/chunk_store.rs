//! Chunk stores.
//!
//! A chunk store persists the encoded chunks and the metadata of a single array.
//! Chunks are addressed by their chunk grid indices, so growing an array never renumbers existing chunks.
//!
//! Two layouts are provided, each over any [`ReadableWritableStorageTraits`](super::ReadableWritableStorageTraits) store:
//!  - [`SparseChunkStore`]: one store value per chunk, and
//!  - [`ContiguousChunkStore`]: all chunks packed into a single frame value with an offset table.

mod contiguous_chunk_store;
mod sparse_chunk_store;

pub use contiguous_chunk_store::ContiguousChunkStore;
pub use sparse_chunk_store::SparseChunkStore;

use crate::array::ArrayMetadata;

use super::StorageError;

/// Traits for a chunk store.
///
/// The slice and append engines of an [`Array`](crate::array::Array) only depend on this interface.
pub trait ChunkStoreTraits: Send + Sync + core::fmt::Debug {
    /// Retrieve the encoded bytes of the chunk at `chunk_indices`.
    ///
    /// Returns [`None`] if the chunk has not been stored.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store the encoded bytes of the chunk at `chunk_indices`, replacing any existing chunk.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn store_chunk(&self, chunk_indices: &[u64], encoded_chunk: &[u8]) -> Result<(), StorageError>;

    /// Erase the chunk at `chunk_indices`.
    ///
    /// Returns true if the chunk existed.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn erase_chunk(&self, chunk_indices: &[u64]) -> Result<bool, StorageError>;

    /// Erase all chunks. The metadata is retained.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn erase_chunks(&self) -> Result<(), StorageError>;

    /// Returns true if the chunk at `chunk_indices` has been stored.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn chunk_exists(&self, chunk_indices: &[u64]) -> Result<bool, StorageError>;

    /// Store the array metadata.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn store_metadata(&self, metadata: &ArrayMetadata) -> Result<(), StorageError>;

    /// Retrieve the array metadata, or [`None`] if it has not been stored.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error or the metadata is invalid.
    fn retrieve_metadata(&self) -> Result<Option<ArrayMetadata>, StorageError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        array::{codec::BlockCodecChain, ARRAY_METADATA_VERSION},
        storage::store::{FilesystemStore, MemoryStore},
    };

    pub(super) fn test_metadata() -> ArrayMetadata {
        ArrayMetadata {
            version: ARRAY_METADATA_VERSION,
            item_size: 2,
            shape: vec![4, 4],
            chunk_shape: vec![2, 2],
            block_shape: vec![1, 2],
            fill_value: vec![0, 0],
            contiguous: false,
            codecs: BlockCodecChain::new_bytes().metadata().clone(),
        }
    }

    fn check_chunk_store(
        chunk_store: &dyn ChunkStoreTraits,
    ) -> Result<(), Box<dyn std::error::Error>> {
        assert!(chunk_store.retrieve_metadata()?.is_none());
        assert!(chunk_store.retrieve_chunk(&[0, 1])?.is_none());
        assert!(!chunk_store.chunk_exists(&[0, 1])?);

        chunk_store.store_chunk(&[0, 1], &[1, 2, 3])?;
        chunk_store.store_chunk(&[1, 0], &[4, 5])?;
        chunk_store.store_metadata(&test_metadata())?;
        assert!(chunk_store.chunk_exists(&[0, 1])?);
        assert_eq!(chunk_store.retrieve_chunk(&[0, 1])?, Some(vec![1, 2, 3]));
        assert_eq!(chunk_store.retrieve_chunk(&[1, 0])?, Some(vec![4, 5]));

        chunk_store.store_chunk(&[0, 1], &[6])?;
        assert_eq!(chunk_store.retrieve_chunk(&[0, 1])?, Some(vec![6]));
        assert_eq!(chunk_store.retrieve_chunk(&[1, 0])?, Some(vec![4, 5]));

        assert!(chunk_store.erase_chunk(&[0, 1])?);
        assert!(!chunk_store.erase_chunk(&[0, 1])?);
        assert!(chunk_store.retrieve_chunk(&[0, 1])?.is_none());

        chunk_store.erase_chunks()?;
        assert!(chunk_store.retrieve_chunk(&[1, 0])?.is_none());
        assert_eq!(chunk_store.retrieve_metadata()?, Some(test_metadata()));
        Ok(())
    }

    #[test]
    fn chunk_store_sparse_memory() -> Result<(), Box<dyn std::error::Error>> {
        check_chunk_store(&SparseChunkStore::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn chunk_store_sparse_filesystem() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = Arc::new(FilesystemStore::new(path.path().join("array.nd"))?);
        check_chunk_store(&SparseChunkStore::new(store))
    }

    #[test]
    fn chunk_store_contiguous_memory() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        check_chunk_store(&ContiguousChunkStore::create(store, "frame".try_into()?)?)
    }

    #[test]
    fn chunk_store_contiguous_filesystem() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = Arc::new(FilesystemStore::new(path.path())?);
        check_chunk_store(&ContiguousChunkStore::create(store, "array.nd".try_into()?)?)
    }

    #[test]
    fn chunk_store_zero_dimensional() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let chunk_store = SparseChunkStore::new(store.clone());
        chunk_store.store_chunk(&[], &[1])?;
        assert_eq!(chunk_store.retrieve_chunk(&[])?, Some(vec![1]));
        chunk_store.erase_chunks()?;
        assert!(store.is_empty());
        Ok(())
    }
}
