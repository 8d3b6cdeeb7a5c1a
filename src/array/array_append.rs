use crate::array_subset::{ArraySubset, IncompatibleDimensionalityError};

use super::{
    array_sync_writable::{ChunkJournal, UpdateSource},
    Array, ArrayError, ArrayShape, FillValue, SliceOptions,
};

impl Array {
    /// Append `bytes` to the end of the array along `axis`.
    ///
    /// `bytes` holds the C-order elements of the appended slab, which matches the array shape in every dimension other than `axis`.
    /// The extent appended along `axis` is the number of elements in `bytes` divided by the number of elements in one slab layer.
    /// Appending an empty buffer is a no-op.
    ///
    /// The append is all-or-nothing: on failure the shape and every replaced chunk are restored.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `axis` is not less than the dimensionality,
    ///  - the chunk extent along `axis` is zero,
    ///  - the length of `bytes` is not a multiple of the slab layer size, or
    ///  - there is a codec or storage error.
    pub fn append(&mut self, bytes: &[u8], axis: usize) -> Result<(), ArrayError> {
        self.append_opt(bytes, axis, &SliceOptions::default())
    }

    /// Explicit options version of [`append`](Array::append).
    #[allow(clippy::missing_errors_doc)]
    pub fn append_opt(
        &mut self,
        bytes: &[u8],
        axis: usize,
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        if axis >= self.dimensionality() {
            return Err(ArrayError::InvalidAxis(axis, self.dimensionality()));
        }
        if self.chunk_shape()[axis] == 0 {
            return Err(ArrayError::ZeroChunkExtent(axis));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let layer_size = self
            .shape
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != axis)
            .try_fold(self.item_size as u64, |layer_size, (_, &size)| {
                layer_size.checked_mul(size)
            })
            .unwrap_or(u64::MAX);
        if layer_size == 0 || bytes.len() as u64 % layer_size != 0 {
            return Err(ArrayError::InvalidAppendBytes(bytes.len(), layer_size));
        }
        let extent = bytes.len() as u64 / layer_size;

        let old_shape = self.shape.clone();
        let mut start: ArrayShape = old_shape.iter().map(|_| 0).collect();
        start[axis] = old_shape[axis];
        let mut slab_shape = old_shape.clone();
        slab_shape[axis] = extent;
        let slab = ArraySubset::new_with_start_shape(start, slab_shape)?;
        self.shape[axis] += extent;

        let source = UpdateSource::Bytes {
            bytes,
            shape: slab.shape(),
            origin: slab.start(),
        };
        let journal = ChunkJournal::default();
        let appended = self
            .update_subset(&slab, source, &journal, options, false)
            .and_then(|()| self.store_metadata().map_err(ArrayError::from));
        if let Err(err) = appended {
            log::warn!(
                "append of {slab} failed, restoring shape {old_shape:?} and {} chunks: {err}",
                journal.len()
            );
            self.shape = old_shape;
            journal.rollback(&*self.chunk_store);
            self.restore_metadata();
            return Err(err);
        }
        log::debug!(
            "appended {extent} along axis {axis}, shape is now {:?}",
            self.shape()
        );
        Ok(())
    }

    /// Resize the array to `new_shape`.
    ///
    /// Shrinking erases every chunk that lies wholly outside of the new shape.
    /// Growing exposes elements that read as the fill value.
    ///
    /// The resize is all-or-nothing: on failure the shape and every replaced or erased chunk are restored.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `new_shape` does not match the array dimensionality,
    ///  - a dimension with a zero chunk extent would have a non-zero extent, or
    ///  - there is a codec or storage error.
    pub fn resize(&mut self, new_shape: &[u64]) -> Result<(), ArrayError> {
        self.resize_opt(new_shape, &SliceOptions::default())
    }

    /// Explicit options version of [`resize`](Array::resize).
    #[allow(clippy::missing_errors_doc)]
    pub fn resize_opt(
        &mut self,
        new_shape: &[u64],
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        let dimensionality = self.dimensionality();
        if new_shape.len() != dimensionality {
            let err = IncompatibleDimensionalityError::new(new_shape.len(), dimensionality);
            return Err(err.into());
        }
        if let Some(axis) = std::iter::zip(self.chunk_shape(), new_shape)
            .position(|(&chunk, &size)| chunk == 0 && size != 0)
        {
            return Err(ArrayError::ZeroChunkExtent(axis));
        }
        if self.shape() == new_shape {
            return Ok(());
        }

        let old_shape = self.shape.clone();
        let journal = ChunkJournal::default();
        if let Err(err) = self.resize_chunks(new_shape, &journal, options) {
            log::warn!(
                "resize to {new_shape:?} failed, restoring {old_shape:?} and {} chunks: {err}",
                journal.len()
            );
            self.shape = old_shape;
            journal.rollback(&*self.chunk_store);
            self.restore_metadata();
            return Err(err);
        }
        log::debug!("resized array from {old_shape:?} to {new_shape:?}");
        Ok(())
    }

    fn resize_chunks(
        &mut self,
        new_shape: &[u64],
        journal: &ChunkJournal,
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        let old_shape = self.shape.clone();
        let new_grid_shape = self.chunk_grid.grid_shape(new_shape);
        if std::iter::zip(&old_shape, new_shape).any(|(old, new)| new < old) {
            let chunk_grid = ArraySubset::new_with_shape(self.chunk_grid_shape());
            for chunk_indices in chunk_grid.iter_indices() {
                if std::iter::zip(&chunk_indices, &new_grid_shape).any(|(i, n)| i >= n) {
                    if let Some(prior) = self.chunk_store.retrieve_chunk(&chunk_indices)? {
                        journal.record(&chunk_indices, Some(prior));
                        self.chunk_store.erase_chunk(&chunk_indices)?;
                    }
                }
            }
        }

        self.shape = new_shape.iter().copied().collect();
        for (axis, (&old, &new)) in std::iter::zip(&old_shape, new_shape).enumerate() {
            if new > old {
                let mut start: ArrayShape = new_shape.iter().map(|_| 0).collect();
                start[axis] = old;
                let mut shape = self.shape.clone();
                shape[axis] = new - old;
                let slab = ArraySubset::new_with_start_shape(start, shape)?;
                self.update_subset(&slab, UpdateSource::Fill, journal, options, true)?;
            }
        }
        self.store_metadata()?;
        Ok(())
    }

    /// Store the current metadata after a failed operation, logging any failure.
    fn restore_metadata(&self) {
        if let Err(err) = self.store_metadata() {
            log::warn!("failed to restore the array metadata: {err}");
        }
    }

    /// Set the fill value and demote every chunk to uniform.
    ///
    /// Every element of the array subsequently reads as `fill_value`.
    /// The refill is all-or-nothing: on failure the fill value and every erased chunk are restored.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `fill_value` does not match the item size, or there is an underlying storage error.
    pub fn refill(&mut self, fill_value: impl Into<FillValue>) -> Result<(), ArrayError> {
        let fill_value: FillValue = fill_value.into();
        if fill_value.size() != self.item_size {
            return Err(ArrayError::InvalidFillValue(
                fill_value.size(),
                self.item_size,
            ));
        }
        let old_fill_value = std::mem::replace(&mut self.fill_value, fill_value);
        let journal = ChunkJournal::default();
        let refilled = self
            .erase_journaled_chunks(&journal)
            .and_then(|()| self.store_metadata().map_err(ArrayError::from));
        if let Err(err) = refilled {
            log::warn!(
                "refill failed, restoring fill value {old_fill_value} and {} chunks: {err}",
                journal.len()
            );
            self.fill_value = old_fill_value;
            journal.rollback(&*self.chunk_store);
            self.restore_metadata();
            return Err(err);
        }
        // reclaims space only, every chunk is already erased
        if let Err(err) = self.chunk_store.erase_chunks() {
            log::warn!("failed to compact chunk storage after refill: {err}");
        }
        log::debug!("refilled array with {}", self.fill_value);
        Ok(())
    }

    /// Erase every materialized chunk, recording it in `journal` first.
    fn erase_journaled_chunks(&self, journal: &ChunkJournal) -> Result<(), ArrayError> {
        let chunk_grid = ArraySubset::new_with_shape(self.chunk_grid_shape());
        for chunk_indices in chunk_grid.iter_indices() {
            if let Some(prior) = self.chunk_store.retrieve_chunk(&chunk_indices)? {
                journal.record(&chunk_indices, Some(prior));
                self.chunk_store.erase_chunk(&chunk_indices)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::array::ArrayBuilder;

    use super::*;

    #[test]
    fn array_append_validation() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(2, vec![3, 0], vec![2, 0], vec![1, 0]).build_zeros()?;
        assert!(matches!(
            array.append(&[0; 4], 2),
            Err(ArrayError::InvalidAxis(2, 2))
        ));
        assert!(matches!(
            array.append(&[0; 4], 1),
            Err(ArrayError::ZeroChunkExtent(1))
        ));
        assert!(matches!(
            array.append(&[0; 4], 0),
            Err(ArrayError::InvalidAppendBytes(4, 0))
        ));
        array.append(&[], 0)?;
        assert_eq!(array.shape(), &[3, 0]);

        let mut array = ArrayBuilder::new(2, vec![3, 2], vec![2, 2], vec![1, 1]).build_zeros()?;
        assert!(matches!(
            array.append(&[0; 6], 0),
            Err(ArrayError::InvalidAppendBytes(6, 4))
        ));
        array.append(&[0; 8], 0)?;
        assert_eq!(array.shape(), &[5, 2]);

        // a slab layer too large to address
        let mut array = ArrayBuilder::new(2, vec![1 << 40, 1 << 40, 1], vec![1; 3], vec![1; 3])
            .build_zeros()?;
        assert!(matches!(
            array.append(&[0; 8], 2),
            Err(ArrayError::InvalidAppendBytes(8, u64::MAX))
        ));
        assert_eq!(array.shape(), &[1 << 40, 1 << 40, 1]);
        Ok(())
    }

    #[test]
    fn array_resize_shrink_grow() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(1, vec![6], vec![4], vec![2]).build_full(9u8)?;
        array.store_slice(&[0], &[6], &[0, 1, 2, 3, 4, 5], &[6])?;
        assert_eq!(array.num_materialized_chunks()?, 2);

        array.resize(&[3])?;
        assert_eq!(array.shape(), &[3]);
        assert_eq!(array.num_materialized_chunks()?, 1);

        array.resize(&[7])?;
        assert_eq!(
            array.retrieve_array_subset(&array.subset_all())?,
            vec![0, 1, 2, 9, 9, 9, 9]
        );
        assert!(!array.chunk_is_materialized(&[1])?);
        Ok(())
    }

    #[test]
    fn array_refill() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(2, vec![4, 4], vec![2, 2], vec![1, 2]).build_zeros()?;
        array.store_array_subset_elements::<u16>(&array.subset_all(), &[5; 16])?;
        assert!(matches!(
            array.refill(1u8),
            Err(ArrayError::InvalidFillValue(1, 2))
        ));
        array.refill(3u16)?;
        assert_eq!(array.num_materialized_chunks()?, 0);
        assert_eq!(
            array.retrieve_array_subset_elements::<u16>(&array.subset_all())?,
            vec![3; 16]
        );
        Ok(())
    }
}
