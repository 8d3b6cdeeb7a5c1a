use std::iter::FusedIterator;

use itertools::izip;

use crate::{
    array::{unravel_index, ArrayIndices, ArrayShape},
    array_subset::ArraySubset,
};

/// Iterates over element indices in an array subset in C (row-major) order.
pub struct IndicesIterator {
    subset: ArraySubset,
    index: u64,
    length: u64,
}

impl IndicesIterator {
    /// Create a new indices iterator.
    #[must_use]
    pub fn new(subset: ArraySubset) -> Self {
        let length = subset.num_elements();
        Self {
            subset,
            index: 0,
            length,
        }
    }
}

impl Iterator for IndicesIterator {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.length {
            return None;
        }
        let mut indices = unravel_index(self.index, self.subset.shape());
        for (index, start) in std::iter::zip(indices.iter_mut(), self.subset.start()) {
            *index += start;
        }
        self.index += 1;
        Some(indices)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.length - self.index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IndicesIterator {}

impl FusedIterator for IndicesIterator {}

/// Split a region of `region_shape` into runs of elements that are contiguous in every array of `array_shapes`.
///
/// Returns the shape of the outer iteration space (inner dimensions collapsed to 1) and the run length.
pub(crate) fn contiguous_runs(region_shape: &[u64], array_shapes: &[&[u64]]) -> (ArrayShape, u64) {
    let mut outer_shape: ArrayShape = region_shape.iter().copied().collect();
    let mut contiguous_elements = 1;
    for (dim, (&region_size, outer_size)) in
        izip!(region_shape, outer_shape.iter_mut()).enumerate().rev()
    {
        contiguous_elements *= region_size;
        *outer_size = 1;
        if !array_shapes
            .iter()
            .all(|array_shape| array_shape[dim] == region_size)
        {
            break;
        }
    }
    (outer_shape, contiguous_elements)
}
