use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    array::ArrayMetadata,
    byte_range::ByteRange,
    storage::{ReadableWritableStorageTraits, StorageError, StoreKey, StoreKeyStartValue},
};

use super::ChunkStoreTraits;

const FRAME_MAGIC: [u8; 8] = *b"NDFRAME1";

const FRAME_HEADER_SIZE: u64 = 24;

/// The footer of a frame: the metadata and the offset table of its chunks.
#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct FrameFooter {
    metadata: Option<ArrayMetadata>,
    chunks: Vec<FrameChunk>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct FrameChunk {
    indices: Vec<u64>,
    offset: u64,
    size: u64,
}

#[derive(Debug)]
struct FrameState {
    metadata: Option<ArrayMetadata>,
    chunks: BTreeMap<Vec<u64>, ByteRange>,
    /// The end of the live footer, where the next chunk or footer is written.
    end: u64,
}

impl FrameState {
    fn new() -> Self {
        Self {
            metadata: None,
            chunks: BTreeMap::new(),
            end: FRAME_HEADER_SIZE,
        }
    }

    fn footer(&self) -> FrameFooter {
        FrameFooter {
            metadata: self.metadata.clone(),
            chunks: self
                .chunks
                .iter()
                .map(|(indices, byte_range)| FrameChunk {
                    indices: indices.clone(),
                    offset: byte_range.start(0),
                    size: byte_range.length(0),
                })
                .collect(),
        }
    }
}

/// A chunk store packing all chunks into a single frame value.
///
/// The frame is laid out as
/// ```text
/// [b"NDFRAME1"][u64 LE footer offset][u64 LE footer length]
/// [encoded chunks]
/// [JSON footer: metadata and chunk offset table]
/// ```
///
/// A stored chunk is written after the live footer and a new footer is written after the chunk.
/// The header is updated to point at the new footer last, so the previous footer stays valid until then.
/// Replaced or erased chunks and superseded footers are not reclaimed.
/// Erasing all chunks rewrites the frame with a single write.
#[derive(Debug)]
pub struct ContiguousChunkStore<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    key: StoreKey,
    state: Mutex<FrameState>,
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> ContiguousChunkStore<TStorage> {
    /// Create a new, empty frame at `key` in `storage`, replacing any existing value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the frame cannot be written.
    pub fn create(storage: Arc<TStorage>, key: StoreKey) -> Result<Self, StorageError> {
        let mut state = FrameState::new();
        write_frame(&*storage, &key, &mut state)?;
        Ok(Self {
            storage,
            key,
            state: Mutex::new(state),
        })
    }

    /// Open an existing frame at `key` in `storage`.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidFrame`] if the frame does not exist or is corrupt.
    pub fn open(storage: Arc<TStorage>, key: StoreKey) -> Result<Self, StorageError> {
        let size = storage
            .size_key(&key)?
            .ok_or_else(|| StorageError::InvalidFrame(format!("frame {key} does not exist")))?;
        if size < FRAME_HEADER_SIZE {
            return Err(StorageError::InvalidFrame(format!(
                "frame {key} of {size} bytes is truncated"
            )));
        }
        let header = storage
            .get_partial_values_key(&key, &[ByteRange::FromStart(0, Some(FRAME_HEADER_SIZE))])?
            .and_then(|values| values.into_iter().next())
            .ok_or_else(|| StorageError::InvalidFrame(format!("frame {key} does not exist")))?;
        let Some((footer_offset, footer_size)) = decode_header(&header) else {
            return Err(StorageError::InvalidFrame(format!(
                "frame {key} has an invalid header"
            )));
        };
        let footer_range = ByteRange::FromStart(footer_offset, Some(footer_size));
        if footer_offset < FRAME_HEADER_SIZE || !footer_range.is_within(size) {
            return Err(StorageError::InvalidFrame(format!(
                "frame {key} footer {footer_range} is outside of {size} bytes"
            )));
        }
        let footer = storage
            .get_partial_values_key(&key, &[footer_range])?
            .and_then(|values| values.into_iter().next())
            .ok_or_else(|| StorageError::InvalidFrame(format!("frame {key} does not exist")))?;
        let footer: FrameFooter = serde_json::from_slice(&footer)
            .map_err(|err| StorageError::InvalidFrame(format!("frame {key} footer: {err}")))?;

        let state = FrameState {
            metadata: footer.metadata,
            chunks: footer
                .chunks
                .into_iter()
                .map(|chunk| {
                    let range = ByteRange::FromStart(chunk.offset, Some(chunk.size));
                    (chunk.indices, range)
                })
                .collect(),
            end: footer_offset + footer_size,
        };
        log::debug!(
            "opened frame {key} with {} chunks in {size} bytes",
            state.chunks.len()
        );
        Ok(Self {
            storage,
            key,
            state: Mutex::new(state),
        })
    }

    /// Write a new footer after the live footer, then point the header at it.
    fn write_footer(&self, state: &mut FrameState) -> Result<(), StorageError> {
        let footer = encode_footer(state)?;
        let footer_offset = state.end;
        self.storage.set_partial_values(&[StoreKeyStartValue::new(
            self.key.clone(),
            footer_offset,
            &footer,
        )])?;
        let header = encode_header(footer_offset, footer.len() as u64);
        self.storage
            .set_partial_values(&[StoreKeyStartValue::new(self.key.clone(), 0, &header)])?;
        state.end = footer_offset + footer.len() as u64;
        Ok(())
    }

    /// Apply `update` to the frame state and persist the footer, restoring the previous state on failure.
    fn update_state(
        &self,
        state: &mut FrameState,
        update: impl FnOnce(&mut FrameState),
    ) -> Result<(), StorageError> {
        let chunks = state.chunks.clone();
        let metadata = state.metadata.clone();
        let end = state.end;
        update(state);
        if let Err(err) = self.write_footer(state) {
            state.chunks = chunks;
            state.metadata = metadata;
            state.end = end;
            return Err(err);
        }
        Ok(())
    }
}

fn encode_footer(state: &FrameState) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(&state.footer()).map_err(|err| StorageError::InvalidFrame(err.to_string()))
}

/// Replace the value at `key` with a frame holding no chunk data.
fn write_frame<TStorage: ?Sized + ReadableWritableStorageTraits>(
    storage: &TStorage,
    key: &StoreKey,
    state: &mut FrameState,
) -> Result<(), StorageError> {
    debug_assert!(state.chunks.is_empty());
    let footer = encode_footer(state)?;
    let mut frame = encode_header(FRAME_HEADER_SIZE, footer.len() as u64).to_vec();
    frame.extend_from_slice(&footer);
    storage.set(key, &frame)?;
    state.end = frame.len() as u64;
    Ok(())
}

fn encode_header(footer_offset: u64, footer_size: u64) -> [u8; FRAME_HEADER_SIZE as usize] {
    let mut header = [0; FRAME_HEADER_SIZE as usize];
    header[..8].copy_from_slice(&FRAME_MAGIC);
    header[8..16].copy_from_slice(&footer_offset.to_le_bytes());
    header[16..24].copy_from_slice(&footer_size.to_le_bytes());
    header
}

fn decode_header(header: &[u8]) -> Option<(u64, u64)> {
    if header.len() != FRAME_HEADER_SIZE as usize || header[..8] != FRAME_MAGIC {
        return None;
    }
    let footer_offset = u64::from_le_bytes(header[8..16].try_into().ok()?);
    let footer_size = u64::from_le_bytes(header[16..24].try_into().ok()?);
    Some((footer_offset, footer_size))
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> ChunkStoreTraits
    for ContiguousChunkStore<TStorage>
{
    fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(byte_range) = self.state.lock().chunks.get(chunk_indices).copied() else {
            return Ok(None);
        };
        log::trace!("retrieve chunk {chunk_indices:?} at {byte_range}");
        match self
            .storage
            .get_partial_values_key(&self.key, &[byte_range])
        {
            Ok(Some(values)) => values
                .into_iter()
                .next()
                .map(Some)
                .ok_or_else(|| StorageError::MissingChunk(chunk_indices.to_vec())),
            Ok(None) | Err(StorageError::InvalidByteRangeError(_)) => {
                Err(StorageError::MissingChunk(chunk_indices.to_vec()))
            }
            Err(err) => Err(err),
        }
    }

    fn store_chunk(&self, chunk_indices: &[u64], encoded_chunk: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let offset = state.end;
        log::trace!(
            "store chunk {chunk_indices:?} at offset {offset} ({} bytes)",
            encoded_chunk.len()
        );
        self.storage.set_partial_values(&[StoreKeyStartValue::new(
            self.key.clone(),
            offset,
            encoded_chunk,
        )])?;
        let size = encoded_chunk.len() as u64;
        self.update_state(&mut state, |state| {
            state.chunks.insert(
                chunk_indices.to_vec(),
                ByteRange::FromStart(offset, Some(size)),
            );
            state.end = offset + size;
        })
    }

    fn erase_chunk(&self, chunk_indices: &[u64]) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if !state.chunks.contains_key(chunk_indices) {
            return Ok(false);
        }
        self.update_state(&mut state, |state| {
            state.chunks.remove(chunk_indices);
        })?;
        Ok(true)
    }

    fn erase_chunks(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let mut erased = FrameState::new();
        erased.metadata = state.metadata.clone();
        write_frame(&*self.storage, &self.key, &mut erased)?;
        *state = erased;
        Ok(())
    }

    fn chunk_exists(&self, chunk_indices: &[u64]) -> Result<bool, StorageError> {
        Ok(self.state.lock().chunks.contains_key(chunk_indices))
    }

    fn store_metadata(&self, metadata: &ArrayMetadata) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.update_state(&mut state, |state| {
            state.metadata = Some(metadata.clone());
        })
    }

    fn retrieve_metadata(&self) -> Result<Option<ArrayMetadata>, StorageError> {
        Ok(self.state.lock().metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::{
        chunk_store::tests::test_metadata,
        store::{FilesystemStore, MemoryStore},
        MaybeBytes, ReadableStorageTraits, StorePrefix, WritableStorageTraits,
    };

    /// A memory store whose partial writes fail once `remaining_partial_writes` are exhausted.
    #[derive(Debug)]
    struct FailingStore {
        inner: MemoryStore,
        remaining_partial_writes: AtomicUsize,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                remaining_partial_writes: AtomicUsize::new(usize::MAX),
            }
        }

        fn fail_after(&self, partial_writes: usize) {
            self.remaining_partial_writes
                .store(partial_writes, Ordering::SeqCst);
        }
    }

    impl ReadableStorageTraits for FailingStore {
        fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
            self.inner.get(key)
        }

        fn get_partial_values_key(
            &self,
            key: &StoreKey,
            byte_ranges: &[ByteRange],
        ) -> Result<Option<Vec<Vec<u8>>>, StorageError> {
            self.inner.get_partial_values_key(key, byte_ranges)
        }

        fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
            self.inner.size_key(key)
        }
    }

    impl WritableStorageTraits for FailingStore {
        fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }

        fn set_partial_values(
            &self,
            key_start_values: &[StoreKeyStartValue],
        ) -> Result<(), StorageError> {
            let remaining = self.remaining_partial_writes.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StorageError::Other("write failed".to_string()));
            }
            self.remaining_partial_writes
                .store(remaining - 1, Ordering::SeqCst);
            self.inner.set_partial_values(key_start_values)
        }

        fn erase(&self, key: &StoreKey) -> Result<bool, StorageError> {
            self.inner.erase(key)
        }

        fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StorageError> {
            self.inner.erase_prefix(prefix)
        }
    }

    impl ReadableWritableStorageTraits for FailingStore {}

    #[test]
    fn contiguous_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = Arc::new(FilesystemStore::new(path.path())?);
        let key: StoreKey = "array.nd".try_into()?;
        {
            let chunk_store = ContiguousChunkStore::create(store.clone(), key.clone())?;
            chunk_store.store_chunk(&[0, 0], &[1, 2, 3, 4])?;
            chunk_store.store_chunk(&[1, 1], &[5, 6])?;
            chunk_store.store_chunk(&[0, 0], &[7])?;
            chunk_store.store_metadata(&test_metadata())?;
        }
        let chunk_store = ContiguousChunkStore::open(store, key)?;
        assert_eq!(chunk_store.retrieve_metadata()?, Some(test_metadata()));
        assert_eq!(chunk_store.retrieve_chunk(&[0, 0])?, Some(vec![7]));
        assert_eq!(chunk_store.retrieve_chunk(&[1, 1])?, Some(vec![5, 6]));
        assert_eq!(chunk_store.retrieve_chunk(&[1, 0])?, None);
        assert!(path.path().join("array.nd").is_file());
        Ok(())
    }

    #[test]
    fn contiguous_invalid_frame() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let key: StoreKey = "frame".try_into()?;
        assert!(ContiguousChunkStore::open(store.clone(), key.clone()).is_err());
        store.set(&key, b"NDFRAME1")?;
        assert!(ContiguousChunkStore::open(store.clone(), key.clone()).is_err());
        store.set(&key, &encode_header(24, 100))?;
        assert!(ContiguousChunkStore::open(store.clone(), key.clone()).is_err());
        Ok(())
    }

    #[test]
    fn contiguous_missing_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let key: StoreKey = "frame".try_into()?;
        {
            let chunk_store = ContiguousChunkStore::create(store.clone(), key.clone())?;
            chunk_store.store_chunk(&[0], &[1, 2, 3, 4])?;
        }
        // Point the chunk table beyond the end of the frame
        let frame = store.get(&key)?.unwrap();
        let (footer_offset, footer_size) = decode_header(&frame[..24]).unwrap();
        let footer_range = ByteRange::FromStart(footer_offset, Some(footer_size));
        let mut footer: FrameFooter =
            serde_json::from_slice(&frame[footer_range.to_range_usize(frame.len() as u64)])?;
        footer.chunks[0].offset = 9999;
        let footer = serde_json::to_vec(&footer)?;
        let value = StoreKeyStartValue::new(key.clone(), footer_offset, &footer);
        store.set_partial_values(&[value])?;
        store.set_partial_values(&[StoreKeyStartValue::new(
            key.clone(),
            0,
            &encode_header(footer_offset, footer.len() as u64),
        )])?;

        let chunk_store = ContiguousChunkStore::open(store, key)?;
        let err = chunk_store.retrieve_chunk(&[0]).unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[test]
    fn contiguous_failed_writes_keep_frame_readable() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(FailingStore::new());
        let key: StoreKey = "frame".try_into()?;
        let chunk_store = ContiguousChunkStore::create(store.clone(), key.clone())?;
        chunk_store.store_metadata(&test_metadata())?;
        chunk_store.store_chunk(&[0], &[1, 2, 3, 4])?;

        // chunk data, footer, header
        for partial_writes in 0..3 {
            store.fail_after(partial_writes);
            assert!(chunk_store.store_chunk(&[1], &[5, 6, 7]).is_err());
            // footer, header
            store.fail_after(partial_writes.min(1));
            assert!(chunk_store.erase_chunk(&[0]).is_err());
            store.fail_after(usize::MAX);

            let reopened = ContiguousChunkStore::open(store.clone(), key.clone())?;
            assert_eq!(reopened.retrieve_metadata()?, Some(test_metadata()));
            assert_eq!(reopened.retrieve_chunk(&[0])?, Some(vec![1, 2, 3, 4]));
            assert_eq!(reopened.retrieve_chunk(&[1])?, None);
            assert_eq!(chunk_store.retrieve_chunk(&[0])?, Some(vec![1, 2, 3, 4]));
            assert!(!chunk_store.chunk_exists(&[1])?);
        }

        // the in-memory state still extends the frame correctly after failures
        chunk_store.store_chunk(&[1], &[5, 6, 7])?;
        let reopened = ContiguousChunkStore::open(store, key)?;
        assert_eq!(reopened.retrieve_chunk(&[0])?, Some(vec![1, 2, 3, 4]));
        assert_eq!(reopened.retrieve_chunk(&[1])?, Some(vec![5, 6, 7]));
        Ok(())
    }
}
