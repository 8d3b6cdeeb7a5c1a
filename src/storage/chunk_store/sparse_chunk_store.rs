use std::sync::Arc;

use itertools::Itertools;

use crate::{
    array::ArrayMetadata,
    storage::{ReadableWritableStorageTraits, StorageError, StoreKey, StorePrefix},
};

use super::ChunkStoreTraits;

/// The key of the array metadata in a sparse chunk store.
const METADATA_KEY: &str = "array.json";

/// The prefix of the chunk keys in a sparse chunk store.
const CHUNK_KEY_PREFIX: &str = "c";

/// A chunk store with one store value per chunk.
///
/// The chunk at indices `[i, j, k]` is stored at key `c/i/j/k`, and the only chunk of a zero dimensional array at `c`.
/// The metadata is stored at `array.json`.
#[derive(Debug)]
pub struct SparseChunkStore<TStorage: ?Sized> {
    storage: Arc<TStorage>,
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> SparseChunkStore<TStorage> {
    /// Create a new sparse chunk store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// Return the store key of the chunk at `chunk_indices`.
    #[must_use]
    pub fn chunk_key(chunk_indices: &[u64]) -> StoreKey {
        let key = if chunk_indices.is_empty() {
            CHUNK_KEY_PREFIX.to_string()
        } else {
            format!("{CHUNK_KEY_PREFIX}/{}", chunk_indices.iter().join("/"))
        };
        unsafe { StoreKey::new_unchecked(key) }
    }

    fn metadata_key() -> StoreKey {
        unsafe { StoreKey::new_unchecked(METADATA_KEY) }
    }
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> ChunkStoreTraits
    for SparseChunkStore<TStorage>
{
    fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Option<Vec<u8>>, StorageError> {
        log::trace!("retrieve chunk {chunk_indices:?}");
        self.storage.get(&Self::chunk_key(chunk_indices))
    }

    fn store_chunk(&self, chunk_indices: &[u64], encoded_chunk: &[u8]) -> Result<(), StorageError> {
        log::trace!(
            "store chunk {chunk_indices:?} ({} bytes)",
            encoded_chunk.len()
        );
        let key = Self::chunk_key(chunk_indices);
        self.storage.set(&key, encoded_chunk)
    }

    fn erase_chunk(&self, chunk_indices: &[u64]) -> Result<bool, StorageError> {
        self.storage.erase(&Self::chunk_key(chunk_indices))
    }

    fn erase_chunks(&self) -> Result<(), StorageError> {
        let prefix = StorePrefix::new(format!("{CHUNK_KEY_PREFIX}/"))?;
        self.storage.erase_prefix(&prefix)?;
        self.storage.erase(&Self::chunk_key(&[]))?;
        Ok(())
    }

    fn chunk_exists(&self, chunk_indices: &[u64]) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .size_key(&Self::chunk_key(chunk_indices))?
            .is_some())
    }

    fn store_metadata(&self, metadata: &ArrayMetadata) -> Result<(), StorageError> {
        let key = Self::metadata_key();
        let bytes = metadata
            .to_json_vec()
            .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
        self.storage.set(&key, &bytes)
    }

    fn retrieve_metadata(&self) -> Result<Option<ArrayMetadata>, StorageError> {
        let key = Self::metadata_key();
        self.storage
            .get(&key)?
            .map(|bytes| {
                ArrayMetadata::from_json_slice(&bytes)
                    .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))
            })
            .transpose()
    }
}
