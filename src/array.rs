//! N-dimensional arrays.
//!
//! An [`Array`] is a dense N-dimensional array of fixed size elements.
//! It is partitioned into chunks by a chunk [`RegularGrid`], and each chunk is partitioned into independently compressed blocks by a block [`RegularGrid`].
//!
//! Use [`ArrayBuilder`] to create a new array, or [`Array::open`] for a persisted array.
//! The documentation for [`Array`] details how to interact with arrays.

mod array_append;
mod array_builder;
mod array_bytes;
mod array_errors;
mod array_metadata;
mod array_sync_readable;
mod array_sync_writable;
pub mod chunk;
pub mod chunk_grid;
pub mod codec;
pub mod concurrency;
mod fill_value;
mod slice_options;
mod unsafe_cell_slice;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub use self::{
    array_builder::ArrayBuilder,
    array_errors::{ArrayCreateError, ArrayError},
    array_metadata::{ArrayMetadata, ARRAY_METADATA_VERSION},
    chunk::Chunk,
    chunk_grid::RegularGrid,
    codec::BlockCodecChain,
    fill_value::FillValue,
    slice_options::SliceOptions,
    unsafe_cell_slice::UnsafeCellSlice,
};

use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    config::global_config,
    storage::{
        store::FilesystemStore, ChunkStoreTraits, ContiguousChunkStore, SparseChunkStore,
        StorageError,
    },
};

/// The maximum dimensionality of an array.
pub const MAX_DIM: usize = 8;

/// An ND index to an element in an array.
pub type ArrayIndices = tinyvec::ArrayVec<[u64; MAX_DIM]>;

/// The shape of an array.
pub type ArrayShape = tinyvec::ArrayVec<[u64; MAX_DIM]>;

/// Convert `indices` to [`ArrayIndices`].
///
/// # Panics
/// Panics if the length of `indices` exceeds [`MAX_DIM`].
#[must_use]
pub fn array_indices(indices: &[u64]) -> ArrayIndices {
    assert!(
        indices.len() <= MAX_DIM,
        "dimensionality {} exceeds the maximum dimensionality {MAX_DIM}",
        indices.len()
    );
    indices.iter().copied().collect()
}

/// Convert ND `indices` to a linearised index in C (row-major) order given an array `shape`.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    debug_assert_eq!(indices.len(), shape.len());
    std::iter::zip(indices, shape).fold(0, |index, (i, s)| index * s + i)
}

/// Convert a linearised `index` in C (row-major) order to ND indices given an array `shape`.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices: ArrayIndices = shape.iter().map(|_| 0).collect();
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        if dim != 0 {
            *indices_i = index % dim;
            index /= dim;
        }
    }
    indices
}

/// Validate the layout of an array.
///
/// # Errors
/// Returns an [`ArrayCreateError`] if
///  - the dimensionality exceeds [`MAX_DIM`] or the chunk and block shapes have a different dimensionality to the array,
///  - the item size is zero or exceeds 255 bytes,
///  - a chunk extent is zero where the array extent is non-zero,
///  - a block extent exceeds the chunk extent or is zero where the chunk extent is non-zero, or
///  - the fill value size differs from the item size.
pub(crate) fn validate_layout(
    item_size: usize,
    shape: &[u64],
    chunk_shape: &[u64],
    block_shape: &[u64],
    fill_value_size: usize,
) -> Result<(), ArrayCreateError> {
    validate_dimensionality(shape, chunk_shape, block_shape)?;
    if item_size == 0 || item_size > 255 {
        return Err(ArrayCreateError::InvalidItemSize(item_size));
    }
    if std::iter::zip(shape, chunk_shape).any(|(&size, &chunk)| chunk == 0 && size != 0) {
        return Err(ArrayCreateError::InvalidChunkShape(
            chunk_shape.to_vec(),
            shape.to_vec(),
        ));
    }
    if std::iter::zip(chunk_shape, block_shape)
        .any(|(&chunk, &block)| block > chunk || (block == 0 && chunk != 0))
    {
        return Err(ArrayCreateError::InvalidBlockShape(
            block_shape.to_vec(),
            chunk_shape.to_vec(),
        ));
    }
    if fill_value_size != item_size {
        return Err(ArrayCreateError::InvalidFillValue(
            fill_value_size,
            item_size,
        ));
    }
    Ok(())
}

fn validate_dimensionality(
    shape: &[u64],
    chunk_shape: &[u64],
    block_shape: &[u64],
) -> Result<(), ArrayCreateError> {
    if shape.len() > MAX_DIM {
        return Err(ArrayCreateError::InvalidDimensionality(shape.len()));
    }
    for other in [chunk_shape, block_shape] {
        if other.len() != shape.len() {
            return Err(IncompatibleDimensionalityError::new(other.len(), shape.len()).into());
        }
    }
    Ok(())
}

/// An N-dimensional array.
///
/// ### Layout
///
/// An array is defined by:
///  - **item size**: the size in bytes of one element,
///  - **shape**: the extent of each dimension (up to [`MAX_DIM`] dimensions),
///  - **chunk shape**: the shape of the chunks partitioning the array,
///  - **block shape**: the shape of the compression blocks partitioning each chunk,
///  - **fill value**: the value of every element that has not been written, and
///  - **codecs**: the [`BlockCodecChain`] compressing each block.
///
/// Trailing chunks and blocks may extend past the array shape; such padding is never observable.
///
/// ### Storage
///
/// Chunks are persisted in a [chunk store](crate::storage::chunk_store) with one of two layouts:
///  - *sparse*: one value per chunk (a directory when persistent), or
///  - *contiguous*: all chunks packed into a single frame (a file when persistent).
///
/// An array without a path lives in memory and its storage is released by [`free`](Array::free).
/// An array with a path can be reopened with [`Array::open`] and deleted with [`remove`](crate::storage::remove).
///
/// A chunk that has never been written is [`Chunk::Uniform`]: it occupies no storage and reads as the fill value.
/// A chunk is materialised by the first write touching it, and only [`refill`](Array::refill) demotes materialised chunks back to uniform.
///
/// ### Methods
///  - read: [`retrieve_slice_into`](Array::retrieve_slice_into), [`retrieve_array_subset`](Array::retrieve_array_subset), [`retrieve_array_subset_elements`](Array::retrieve_array_subset_elements)
///  - write: [`store_slice`](Array::store_slice), [`store_array_subset`](Array::store_array_subset), [`store_array_subset_elements`](Array::store_array_subset_elements)
///  - grow and shrink: [`append`](Array::append), [`resize`](Array::resize)
///  - inspect: [`chunk`](Array::chunk), [`chunk_is_materialized`](Array::chunk_is_materialized)
///
/// With the `ndarray` feature, [`retrieve_array_subset_ndarray`](Array::retrieve_array_subset_ndarray) returns an [`ndarray::ArrayD`].
///
/// Methods with an `_opt` suffix accept [`SliceOptions`].
///
/// ### Concurrency
///
/// Chunks touched by one operation are processed in parallel, as are the blocks within each chunk.
/// Reads take `&self`, while writes take `&mut self` so there is only ever a single writer.
///
/// ### Failure
///
/// [`store_slice`](Array::store_slice), [`append`](Array::append) and [`resize`](Array::resize) are all-or-nothing.
/// If any chunk fails to encode or store, every chunk already overwritten by the operation is restored and the shape is reset.
#[derive(Debug)]
pub struct Array {
    /// The chunk store.
    chunk_store: Arc<dyn ChunkStoreTraits>,
    /// The persistence path.
    path: Option<PathBuf>,
    /// True if chunks are packed into one frame.
    contiguous: bool,
    /// The size in bytes of one element.
    item_size: usize,
    /// The array shape.
    shape: ArrayShape,
    /// The chunk grid.
    chunk_grid: RegularGrid,
    /// The block grid of a chunk.
    block_grid: RegularGrid,
    /// The fill value.
    fill_value: FillValue,
    /// The block codecs.
    codecs: BlockCodecChain,
}

impl Array {
    /// Create an array from `metadata` over an existing chunk store.
    ///
    /// If `validate` is false only the dimensionality is checked.
    pub(crate) fn new_with_metadata(
        chunk_store: Arc<dyn ChunkStoreTraits>,
        path: Option<PathBuf>,
        metadata: &ArrayMetadata,
        validate: bool,
    ) -> Result<Self, ArrayCreateError> {
        if metadata.version != ARRAY_METADATA_VERSION {
            return Err(ArrayCreateError::UnsupportedMetadataVersion(
                metadata.version,
            ));
        }
        if validate {
            validate_layout(
                metadata.item_size,
                &metadata.shape,
                &metadata.chunk_shape,
                &metadata.block_shape,
                metadata.fill_value.len(),
            )?;
        } else {
            validate_dimensionality(
                &metadata.shape,
                &metadata.chunk_shape,
                &metadata.block_shape,
            )?;
        }
        let codecs = BlockCodecChain::from_metadata(&metadata.codecs)?;
        Ok(Self {
            chunk_store,
            path,
            contiguous: metadata.contiguous,
            item_size: metadata.item_size,
            shape: array_indices(&metadata.shape),
            chunk_grid: RegularGrid::new(array_indices(&metadata.chunk_shape)),
            block_grid: RegularGrid::new(array_indices(&metadata.block_shape)),
            fill_value: FillValue::new(metadata.fill_value.clone()),
            codecs,
        })
    }

    /// Open a persisted array at `path`.
    ///
    /// A directory is opened as a sparse array and a file as a contiguous array.
    /// The stored metadata is validated if [validate metadata on open](crate::config::Config#validate-metadata-on-open) is enabled.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - `path` does not exist or cannot be read,
    ///  - the metadata is missing, invalid, or does not match the layout of `path`, or
    ///  - the array codecs are not supported by this build.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArrayCreateError> {
        let path = path.as_ref();
        let path_metadata = std::fs::metadata(path).map_err(StorageError::from)?;
        let contiguous = path_metadata.is_file();
        let chunk_store: Arc<dyn ChunkStoreTraits> = if contiguous {
            let (store, key) = array_builder::frame_store(path)?;
            Arc::new(ContiguousChunkStore::open(store, key)?)
        } else {
            Arc::new(SparseChunkStore::new(Arc::new(FilesystemStore::new(path)?)))
        };
        let metadata = chunk_store
            .retrieve_metadata()?
            .ok_or(ArrayCreateError::MissingMetadata)?;
        if metadata.contiguous != contiguous {
            return Err(ArrayCreateError::InvalidPath(path.to_path_buf()));
        }
        let validate = global_config().validate_metadata_on_open();
        let array =
            Self::new_with_metadata(chunk_store, Some(path.to_path_buf()), &metadata, validate)?;
        log::debug!(
            "opened array {} with shape {:?}",
            path.display(),
            array.shape()
        );
        Ok(array)
    }

    /// Release the array.
    ///
    /// The chunks of an in-memory array are erased.
    /// The metadata of a persistent array is flushed and its storage is retained.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if there is an underlying storage error.
    pub fn free(self) -> Result<(), ArrayError> {
        if self.path.is_some() {
            self.store_metadata()?;
        } else {
            self.chunk_store.erase_chunks()?;
        }
        Ok(())
    }

    /// Get the item size in bytes.
    #[must_use]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Get the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Get the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        self.chunk_grid.cell_shape()
    }

    /// Get the block shape.
    #[must_use]
    pub fn block_shape(&self) -> &[u64] {
        self.block_grid.cell_shape()
    }

    /// Get the array dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Get the fill value.
    #[must_use]
    pub fn fill_value(&self) -> &FillValue {
        &self.fill_value
    }

    /// Get the block codecs.
    #[must_use]
    pub fn codecs(&self) -> &BlockCodecChain {
        &self.codecs
    }

    /// Get the persistence path, or [`None`] for an in-memory array.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if the array is persisted at a path.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Returns true if chunks are packed into one contiguous frame.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Get the chunk grid.
    #[must_use]
    pub fn chunk_grid(&self) -> &RegularGrid {
        &self.chunk_grid
    }

    /// Get the block grid of a chunk.
    #[must_use]
    pub fn block_grid(&self) -> &RegularGrid {
        &self.block_grid
    }

    /// Get the number of chunks along each dimension.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> ArrayShape {
        self.chunk_grid.grid_shape(&self.shape)
    }

    /// Get the number of blocks along each dimension of a chunk.
    #[must_use]
    pub fn block_grid_shape(&self) -> ArrayShape {
        self.block_grid.grid_shape(self.chunk_shape())
    }

    /// Get the number of blocks in a chunk.
    fn num_blocks(&self) -> usize {
        usize::try_from(self.block_grid.num_cells(self.chunk_shape())).unwrap_or(usize::MAX)
    }

    /// Get the subset of all elements of the array.
    #[must_use]
    pub fn subset_all(&self) -> ArraySubset {
        ArraySubset::new_with_shape(self.shape.clone())
    }

    /// Create the array metadata.
    #[must_use]
    pub fn metadata(&self) -> ArrayMetadata {
        ArrayMetadata {
            version: ARRAY_METADATA_VERSION,
            item_size: self.item_size,
            shape: self.shape.to_vec(),
            chunk_shape: self.chunk_shape().to_vec(),
            block_shape: self.block_shape().to_vec(),
            fill_value: self.fill_value.as_ne_bytes().to_vec(),
            contiguous: self.contiguous,
            codecs: self.codecs.metadata().clone(),
        }
    }

    /// Store the array metadata.
    fn store_metadata(&self) -> Result<(), StorageError> {
        self.chunk_store.store_metadata(&self.metadata())
    }

    fn validate_chunk_indices(&self, chunk_indices: &[u64]) -> Result<(), ArrayError> {
        let chunk_grid_shape = self.chunk_grid_shape();
        if chunk_indices.len() == chunk_grid_shape.len()
            && std::iter::zip(chunk_indices, chunk_grid_shape.iter()).all(|(i, n)| i < n)
        {
            Ok(())
        } else {
            Err(ArrayError::InvalidChunkGridIndices(
                chunk_indices.to_vec(),
                chunk_grid_shape,
            ))
        }
    }

    /// Return the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunk_indices` are outside of the chunk grid or there is an underlying storage error.
    pub fn chunk(&self, chunk_indices: &[u64]) -> Result<Chunk, ArrayError> {
        self.validate_chunk_indices(chunk_indices)?;
        Ok(match self.chunk_store.retrieve_chunk(chunk_indices)? {
            Some(encoded_chunk) => Chunk::Stored(encoded_chunk),
            None => Chunk::Uniform(self.fill_value.clone()),
        })
    }

    /// Returns true if the chunk at `chunk_indices` is materialised in storage.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunk_indices` are outside of the chunk grid or there is an underlying storage error.
    pub fn chunk_is_materialized(&self, chunk_indices: &[u64]) -> Result<bool, ArrayError> {
        self.validate_chunk_indices(chunk_indices)?;
        Ok(self.chunk_store.chunk_exists(chunk_indices)?)
    }

    /// Return the number of chunks materialised in storage.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if there is an underlying storage error.
    pub fn num_materialized_chunks(&self) -> Result<u64, ArrayError> {
        let mut num_chunks = 0;
        for chunk_indices in ArraySubset::new_with_shape(self.chunk_grid_shape()).iter_indices() {
            if self.chunk_store.chunk_exists(&chunk_indices)? {
                num_chunks += 1;
            }
        }
        Ok(num_chunks)
    }
}
