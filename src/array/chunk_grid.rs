//! The regular grid.
//!
//! A [`RegularGrid`] partitions an N-dimensional index space into cells of a fixed shape.
//! The same grid type maps array indices to chunks, and chunk-local indices to compression blocks.
//! Trailing cells along any dimension may be partial when the partitioned shape is not an exact multiple of the cell shape.
//!
//! All methods are infallible and assume inputs with the dimensionality of the grid.

use crate::array_subset::ArraySubset;

use super::{ArrayIndices, ArrayShape};

/// A regular grid of cells with shape `cell_shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularGrid {
    cell_shape: ArrayShape,
}

impl RegularGrid {
    /// Create a new regular grid with cell shape `cell_shape`.
    #[must_use]
    pub fn new(cell_shape: ArrayShape) -> Self {
        Self { cell_shape }
    }

    /// Return the (nominal) cell shape.
    #[must_use]
    pub fn cell_shape(&self) -> &[u64] {
        &self.cell_shape
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.cell_shape.len()
    }

    /// Return the number of cells along each dimension covering `array_shape`.
    ///
    /// Elementwise ceiling division. A zero cell extent yields zero cells along that dimension.
    #[must_use]
    pub fn grid_shape(&self, array_shape: &[u64]) -> ArrayShape {
        debug_assert_eq!(array_shape.len(), self.dimensionality());
        std::iter::zip(array_shape, &self.cell_shape)
            .map(|(&a, &s)| if s == 0 { 0 } else { a.div_ceil(s) })
            .collect()
    }

    /// Return the total number of cells covering `array_shape`.
    #[must_use]
    pub fn num_cells(&self, array_shape: &[u64]) -> u64 {
        self.grid_shape(array_shape).iter().product()
    }

    /// Return the indices of the cell containing `array_indices`.
    #[must_use]
    pub fn cell_indices(&self, array_indices: &[u64]) -> ArrayIndices {
        debug_assert_eq!(array_indices.len(), self.dimensionality());
        std::iter::zip(array_indices, &self.cell_shape)
            .map(|(&i, &s)| if s == 0 { 0 } else { i / s })
            .collect()
    }

    /// Return the origin of the cell at `cell_indices`.
    #[must_use]
    pub fn cell_origin(&self, cell_indices: &[u64]) -> ArrayIndices {
        debug_assert_eq!(cell_indices.len(), self.dimensionality());
        std::iter::zip(cell_indices, &self.cell_shape)
            .map(|(i, s)| i * s)
            .collect()
    }

    /// Return the nominal subset of the cell at `cell_indices`.
    #[must_use]
    pub fn cell_subset(&self, cell_indices: &[u64]) -> ArraySubset {
        unsafe {
            ArraySubset::new_with_start_shape_unchecked(
                self.cell_origin(cell_indices),
                self.cell_shape.clone(),
            )
        }
    }

    /// Return the subset of the cell at `cell_indices` clamped to `array_shape`.
    ///
    /// This is the actual extent of a partial trailing cell.
    #[must_use]
    pub fn cell_subset_bounded(&self, cell_indices: &[u64], array_shape: &[u64]) -> ArraySubset {
        debug_assert_eq!(array_shape.len(), self.dimensionality());
        let origin = self.cell_origin(cell_indices);
        let shape = itertools::izip!(&origin, &self.cell_shape, array_shape)
            .map(|(&o, &s, &a)| std::cmp::min(o + s, a).saturating_sub(o))
            .collect();
        unsafe { ArraySubset::new_with_start_shape_unchecked(origin, shape) }
    }

    /// Return the subset of cell indices whose cells intersect `array_subset`.
    ///
    /// Returns [`None`] if `array_subset` is empty.
    #[must_use]
    pub fn cells_in_subset(&self, array_subset: &ArraySubset) -> Option<ArraySubset> {
        if array_subset.is_empty() {
            return None;
        }
        let first = self.cell_indices(array_subset.start());
        let last_inc = self.cell_indices(
            &array_subset
                .end_exc()
                .iter()
                .map(|end| end - 1)
                .collect::<ArrayIndices>(),
        );
        let shape = std::iter::zip(&first, &last_inc)
            .map(|(first, last)| last - first + 1)
            .collect();
        Some(unsafe { ArraySubset::new_with_start_shape_unchecked(first, shape) })
    }
}
