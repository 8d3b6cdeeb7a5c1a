//! Array subsets.
//!
//! An [`ArraySubset`] is a hyperrectangular region of an array defined by a start and a shape.
//! It is used throughout this library to describe requested slices, chunk extents, and block extents.
//!
//! This module provides convenience functions for:
//!  - intersecting array subsets and expressing them relative to another origin, and
//!  - iterating over the indices of an array subset.

mod iterators;

pub(crate) use iterators::contiguous_runs;
pub use iterators::IndicesIterator;

use derive_more::Display;
use itertools::izip;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape, MAX_DIM};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default)]
#[display("start {start:?} shape {shape:?}")]
pub struct ArraySubset {
    /// The start of the array subset.
    start: ArrayIndices,
    /// The shape of the array subset.
    shape: ArrayShape,
}

impl ArraySubset {
    /// Create a new array subset with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: shape.iter().map(|_| 0).collect(),
            shape,
        }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    ///
    /// Returns [`IncompatibleDimensionalityError`] if the size of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Create a new array subset.
    ///
    /// # Safety
    ///
    /// The length of `start` and `shape` must match.
    #[doc(hidden)]
    #[must_use]
    pub unsafe fn new_with_start_shape_unchecked(start: ArrayIndices, shape: ArrayShape) -> Self {
        debug_assert_eq!(start.len(), shape.len());
        Self { start, shape }
    }

    /// Create a new array subset from a half-open range `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArraySubsetError`] if
    ///  - the lengths of `start` and `end` do not match or exceed [`MAX_DIM`], or
    ///  - any component of `end` is less than the corresponding component of `start`.
    pub fn new_with_start_end_exc(
        start: &[u64],
        end: &[u64],
    ) -> Result<Self, InvalidArraySubsetError> {
        if start.len() != end.len()
            || start.len() > MAX_DIM
            || std::iter::zip(start, end).any(|(start, end)| end < start)
        {
            return Err(InvalidArraySubsetError::new(start, end));
        }
        Ok(Self {
            start: start.iter().copied().collect(),
            shape: std::iter::zip(start, end)
                .map(|(start, end)| end - start)
                .collect(),
        })
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    ///
    /// Equal to the product of the components of its shape.
    /// A zero dimensional subset has one element.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the number of elements of the array subset as a `usize`.
    ///
    /// # Panics
    ///
    /// Panics if [`num_elements()`](Self::num_elements()) is greater than [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Returns true if the array subset contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&size| size == 0)
    }

    /// Return the intersection of this array subset with `other`.
    ///
    /// Returns [`None`] if the intersection is empty in any dimension.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        debug_assert_eq!(self.dimensionality(), other.dimensionality());
        let mut start = ArrayIndices::new();
        let mut shape = ArrayShape::new();
        for (&start_a, &size_a, &start_b, &size_b) in
            izip!(&self.start, &self.shape, &other.start, &other.shape)
        {
            let overlap_start = std::cmp::max(start_a, start_b);
            let overlap_end = std::cmp::min(start_a + size_a, start_b + size_b);
            if overlap_end <= overlap_start {
                return None;
            }
            start.push(overlap_start);
            shape.push(overlap_end - overlap_start);
        }
        Some(Self { start, shape })
    }

    /// Return this array subset with its start expressed relative to `origin`.
    ///
    /// `origin` must not exceed the start of the array subset in any dimension.
    #[must_use]
    pub fn relative_to(&self, origin: &[u64]) -> Self {
        debug_assert_eq!(self.dimensionality(), origin.len());
        Self {
            start: std::iter::zip(&self.start, origin)
                .map(|(start, origin)| {
                    debug_assert!(start >= origin);
                    start - origin
                })
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// Return this array subset with its start offset by `offset`.
    #[must_use]
    pub fn translate(&self, offset: &[u64]) -> Self {
        debug_assert_eq!(self.dimensionality(), offset.len());
        Self {
            start: std::iter::zip(&self.start, offset)
                .map(|(start, offset)| start + offset)
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// Returns true if the array subset is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(&self.start, &self.shape, array_shape)
                .all(|(start, size, shape)| size <= shape && *start <= shape - size)
    }

    /// Returns an iterator over the indices of elements within the subset.
    #[must_use]
    pub fn iter_indices(&self) -> IndicesIterator {
        IndicesIterator::new(self.clone())
    }
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An invalid array subset error.
#[derive(Clone, Debug, Error)]
#[error("invalid array subset with start {start:?} and end {end:?}")]
pub struct InvalidArraySubsetError {
    start: Vec<u64>,
    end: Vec<u64>,
}

impl InvalidArraySubsetError {
    /// Create a new invalid array subset error.
    #[must_use]
    pub fn new(start: &[u64], end: &[u64]) -> Self {
        Self {
            start: start.to_vec(),
            end: end.to_vec(),
        }
    }
}
