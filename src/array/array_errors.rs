use std::{collections::TryReserveError, path::PathBuf};

use thiserror::Error;

use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError, InvalidArraySubsetError},
    storage::{store::FilesystemStoreCreateError, StorageError},
};

use super::{codec::CodecError, ArrayShape, MAX_DIM};

/// An array creation error.
#[derive(Debug, Error)]
pub enum ArrayCreateError {
    /// The dimensionality exceeds [`MAX_DIM`].
    #[error("dimensionality {0} exceeds the maximum dimensionality {MAX_DIM}")]
    InvalidDimensionality(usize),
    /// The dimensionality of the chunk or block shape does not match the array dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// An unsupported item size.
    #[error("item size {0} is not supported, expected 1 to 255 bytes")]
    InvalidItemSize(usize),
    /// An invalid chunk shape.
    #[error("chunk shape {_0:?} is invalid for array shape {_1:?}: a chunk extent may only be zero where the array extent is zero")]
    InvalidChunkShape(Vec<u64>, Vec<u64>),
    /// An invalid block shape.
    #[error("block shape {_0:?} is invalid for chunk shape {_1:?}: a block extent must be non-zero and not exceed the chunk extent")]
    InvalidBlockShape(Vec<u64>, Vec<u64>),
    /// The fill value size does not match the item size.
    #[error("fill value has size {_0}, expected the item size {_1}")]
    InvalidFillValue(usize, usize),
    /// The persistence path already exists.
    #[error("path {0} already exists")]
    ExistingPath(PathBuf),
    /// The persistence path cannot hold an array.
    #[error("path {0} is not a valid array path")]
    InvalidPath(PathBuf),
    /// Unsupported metadata version.
    #[error("unsupported array metadata version {0}")]
    UnsupportedMetadataVersion(u32),
    /// A codec error.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// A filesystem store creation error.
    #[error(transparent)]
    FilesystemStoreCreateError(#[from] FilesystemStoreCreateError),
    /// Storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// Missing metadata.
    #[error("array metadata is missing")]
    MissingMetadata,
}

/// Array errors.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// A store error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// A codec error.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// A malformed array subset.
    #[error(transparent)]
    InvalidArraySubsetError(#[from] InvalidArraySubsetError),
    /// An array subset that is out of the bounds of the array.
    #[error("array subset {_0} is not compatible with array shape {_1:?}")]
    InvalidArraySubset(ArraySubset, ArrayShape),
    /// Invalid chunk grid indices.
    #[error("chunk indices {_0:?} are not within the chunk grid {_1:?}")]
    InvalidChunkGridIndices(Vec<u64>, ArrayShape),
    /// A buffer shape that cannot hold the array subset.
    #[error("buffer shape {_0:?} cannot hold array subset {_1}")]
    InvalidBufferShape(Vec<u64>, ArraySubset),
    /// An unexpected bytes input size.
    #[error("got bytes with size {_0}, expected at least {_1}")]
    InvalidBytesInputSize(usize, u64),
    /// An invalid axis.
    #[error("axis {_0} is invalid for an array with dimensionality {_1}")]
    InvalidAxis(usize, usize),
    /// An array cannot grow along an axis with a zero chunk extent.
    #[error("cannot grow along axis {_0} with a zero chunk extent")]
    ZeroChunkExtent(usize),
    /// Appended bytes are not a whole number of slabs.
    #[error("appended bytes with size {_0} are not a non-zero multiple of the slab size {_1}")]
    InvalidAppendBytes(usize, u64),
    /// The fill value size does not match the item size.
    #[error("fill value has size {_0}, expected the item size {_1}")]
    InvalidFillValue(usize, usize),
    /// Incompatible element size.
    #[error("got element size {_0}, expected {_1}")]
    IncompatibleElementSize(usize, usize),
    /// A buffer allocation failed.
    #[error(transparent)]
    OutOfMemory(#[from] TryReserveError),
    /// An ndarray shape error.
    #[cfg(feature = "ndarray")]
    #[error(transparent)]
    NdarrayShapeError(#[from] ndarray::ShapeError),
}

impl ArrayError {
    /// Returns true if the error was caused by an invalid argument rather than a codec, storage or allocation failure.
    ///
    /// An operation failing with an invalid argument performs no mutation.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(
            self,
            Self::StorageError(_) | Self::CodecError(_) | Self::OutOfMemory(_)
        )
    }
}
