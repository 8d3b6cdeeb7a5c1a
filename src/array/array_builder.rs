use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::storage::{
    store::{FilesystemStore, MemoryStore},
    ChunkStoreTraits, ContiguousChunkStore, SparseChunkStore, StorageError, StoreKey,
};

use super::{
    validate_layout, Array, ArrayCreateError, ArrayMetadata, BlockCodecChain, FillValue,
    ARRAY_METADATA_VERSION,
};

/// The key of the frame of an in-memory contiguous array.
const MEMORY_FRAME_KEY: &str = "frame";

/// An [`Array`] builder.
///
/// The array builder is initialised from an item size, array shape, chunk shape, and block shape.
///  - The array lives in memory unless a [`path`](ArrayBuilder::path) is set.
///  - Chunks use the sparse layout unless [`contiguous`](ArrayBuilder::contiguous) is set.
///  - Blocks are compressed with the default [`BlockCodecChain`].
///
/// The array is created by [`build_full`](ArrayBuilder::build_full), [`build_zeros`](ArrayBuilder::build_zeros) or [`build_empty`](ArrayBuilder::build_empty).
/// None of these materialise any chunk.
///
/// For example:
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use ndstore::array::{ArrayBuilder, FillValue};
/// let mut array = ArrayBuilder::new(
///     4,              // item size
///     vec![100, 100], // array shape
///     vec![32, 32],   // chunk shape
///     vec![8, 32],    // block shape
/// )
/// .contiguous(true)
/// .build_full(FillValue::from(1.0f32))?;
///
/// array.store_array_subset_elements::<f32>(
///     &ndstore::array_subset::ArraySubset::new_with_start_end_exc(&[0, 0], &[2, 2])?,
///     &[0.0, 1.0, 2.0, 3.0],
/// )?;
/// array.append(&vec![0u8; 4 * 100 * 10], 0)?;
/// assert_eq!(array.shape(), &[110, 100]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    /// Item size in bytes.
    pub item_size: usize,
    /// Array shape.
    pub shape: Vec<u64>,
    /// Chunk shape.
    pub chunk_shape: Vec<u64>,
    /// Block shape.
    pub block_shape: Vec<u64>,
    /// Persistence path.
    pub path: Option<PathBuf>,
    /// Contiguous layout.
    pub contiguous: bool,
    /// Block codecs.
    pub codecs: BlockCodecChain,
}

impl ArrayBuilder {
    /// Create a new array builder.
    #[must_use]
    pub fn new(
        item_size: usize,
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        block_shape: Vec<u64>,
    ) -> Self {
        Self {
            item_size,
            shape,
            chunk_shape,
            block_shape,
            path: None,
            contiguous: false,
            codecs: BlockCodecChain::default(),
        }
    }

    /// Persist the array at `path`.
    ///
    /// A sparse array is persisted as a directory and a contiguous array as a single file.
    pub fn path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the layout to contiguous (`true`) or sparse (`false`).
    pub fn contiguous(&mut self, contiguous: bool) -> &mut Self {
        self.contiguous = contiguous;
        self
    }

    /// Set the block codecs.
    pub fn codec(&mut self, codecs: BlockCodecChain) -> &mut Self {
        self.codecs = codecs;
        self
    }

    /// Validate the array layout.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if the dimensionality, item size, chunk shape or block shape is invalid.
    pub fn validate(&self) -> Result<(), ArrayCreateError> {
        validate_layout(
            self.item_size,
            &self.shape,
            &self.chunk_shape,
            &self.block_shape,
            self.item_size,
        )
    }

    /// Build an array with every element equal to `fill_value`.
    ///
    /// No chunk is materialised until it is first written.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - the layout is invalid or the fill value size differs from the item size,
    ///  - the path already exists or is not a valid array path, or
    ///  - there is an underlying storage error.
    pub fn build_full(&self, fill_value: impl Into<FillValue>) -> Result<Array, ArrayCreateError> {
        let fill_value: FillValue = fill_value.into();
        validate_layout(
            self.item_size,
            &self.shape,
            &self.chunk_shape,
            &self.block_shape,
            fill_value.size(),
        )?;

        let chunk_store = self.create_chunk_store()?;
        let metadata = ArrayMetadata {
            version: ARRAY_METADATA_VERSION,
            item_size: self.item_size,
            shape: self.shape.clone(),
            chunk_shape: self.chunk_shape.clone(),
            block_shape: self.block_shape.clone(),
            fill_value: fill_value.as_ne_bytes().to_vec(),
            contiguous: self.contiguous,
            codecs: self.codecs.metadata().clone(),
        };
        chunk_store.store_metadata(&metadata)?;
        let array = Array::new_with_metadata(chunk_store, self.path.clone(), &metadata, false)?;
        log::debug!(
            "created {} {} array: shape {:?}, chunks {:?}, blocks {:?}, fill value {}",
            if array.is_persistent() { "persistent" } else { "in-memory" },
            if array.is_contiguous() { "contiguous" } else { "sparse" },
            array.shape(),
            array.chunk_shape(),
            array.block_shape(),
            array.fill_value()
        );
        Ok(array)
    }

    /// Build an array with every element equal to zero.
    ///
    /// # Errors
    /// See [`build_full`](ArrayBuilder::build_full).
    pub fn build_zeros(&self) -> Result<Array, ArrayCreateError> {
        self.build_full(FillValue::new_zeros(self.item_size))
    }

    /// Build an array without initialising its elements.
    ///
    /// Unwritten elements read as zero, exactly as with [`build_zeros`](ArrayBuilder::build_zeros).
    ///
    /// # Errors
    /// See [`build_full`](ArrayBuilder::build_full).
    pub fn build_empty(&self) -> Result<Array, ArrayCreateError> {
        self.build_zeros()
    }

    fn create_chunk_store(&self) -> Result<Arc<dyn ChunkStoreTraits>, ArrayCreateError> {
        let chunk_store: Arc<dyn ChunkStoreTraits> = match (&self.path, self.contiguous) {
            (None, false) => Arc::new(SparseChunkStore::new(Arc::new(MemoryStore::new()))),
            (None, true) => {
                let key = StoreKey::new(MEMORY_FRAME_KEY).map_err(StorageError::from)?;
                let storage = Arc::new(MemoryStore::new());
                Arc::new(ContiguousChunkStore::create(storage, key)?)
            }
            (Some(path), _) if path.exists() => {
                return Err(ArrayCreateError::ExistingPath(path.clone()));
            }
            (Some(path), false) => {
                Arc::new(SparseChunkStore::new(Arc::new(FilesystemStore::new(path)?)))
            }
            (Some(path), true) => {
                let (store, key) = frame_store(path)?;
                Arc::new(ContiguousChunkStore::create(store, key)?)
            }
        };
        Ok(chunk_store)
    }
}

/// Return the filesystem store holding the frame file at `path` and the key of the frame.
pub(super) fn frame_store(
    path: &Path,
) -> Result<(Arc<FilesystemStore>, StoreKey), ArrayCreateError> {
    let key = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .and_then(|name| StoreKey::new(name).ok())
        .ok_or_else(|| ArrayCreateError::InvalidPath(path.to_path_buf()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((Arc::new(FilesystemStore::new(parent)?), key))
}
