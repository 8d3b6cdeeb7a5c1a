use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::array_subset::{ArraySubset, IncompatibleDimensionalityError};

use super::{
    array_bytes::{copy_region, fill_region, vec_try_zeroed},
    chunk::EncodedChunk,
    codec::BlockCodecTraits,
    concurrency::concurrency_chunks_and_blocks,
    ravel_indices, Array, ArrayError, ArrayIndices, SliceOptions, UnsafeCellSlice,
};

impl Array {
    /// Validate the slice `[start, stop)` and a buffer of `buffer_len` bytes addressed with `buffer_shape`.
    ///
    /// The region is anchored at the origin of the buffer.
    pub(super) fn validate_slice(
        &self,
        start: &[u64],
        stop: &[u64],
        buffer_len: usize,
        buffer_shape: &[u64],
    ) -> Result<ArraySubset, ArrayError> {
        let dimensionality = self.dimensionality();
        for len in [start.len(), stop.len(), buffer_shape.len()] {
            if len != dimensionality {
                return Err(IncompatibleDimensionalityError::new(len, dimensionality).into());
            }
        }
        let array_subset = ArraySubset::new_with_start_end_exc(start, stop)?;
        if !array_subset.inbounds(&self.shape) {
            return Err(ArrayError::InvalidArraySubset(
                array_subset,
                self.shape.clone(),
            ));
        }
        if std::iter::zip(array_subset.shape(), buffer_shape).any(|(size, buffer)| size > buffer) {
            return Err(ArrayError::InvalidBufferShape(
                buffer_shape.to_vec(),
                array_subset,
            ));
        }
        // one past the last element of the region in the buffer, in bytes
        let required_len = if array_subset.is_empty() {
            Some(0)
        } else {
            std::iter::zip(array_subset.shape(), buffer_shape)
                .try_fold(0u64, |index, (size, buffer)| {
                    index.checked_mul(*buffer)?.checked_add(size - 1)
                })
                .and_then(|index| index.checked_add(1))
                .and_then(|len| len.checked_mul(self.item_size as u64))
        };
        let Some(required_len) = required_len else {
            return Err(ArrayError::InvalidBufferShape(
                buffer_shape.to_vec(),
                array_subset,
            ));
        };
        if (buffer_len as u64) < required_len {
            return Err(ArrayError::InvalidBytesInputSize(buffer_len, required_len));
        }
        Ok(array_subset)
    }

    /// Return the start and exclusive end of `array_subset` if it lies within the array.
    fn array_subset_bounds<'a>(
        &self,
        array_subset: &'a ArraySubset,
    ) -> Result<(&'a [u64], ArrayIndices), ArrayError> {
        if array_subset.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                array_subset.dimensionality(),
                self.dimensionality(),
            )
            .into());
        }
        if !array_subset.inbounds(&self.shape) {
            return Err(ArrayError::InvalidArraySubset(
                array_subset.clone(),
                self.shape.clone(),
            ));
        }
        Ok((array_subset.start(), array_subset.end_exc()))
    }

    /// Read the elements in `[start, stop)` into `dest`, a C-order buffer with shape `dest_shape`.
    ///
    /// The region is written at the origin of `dest`, so `dest_shape` must be at least `stop - start` in every dimension.
    /// Bytes of `dest` outside of the region are left untouched.
    /// Elements that have never been written read as the fill value.
    ///
    /// An empty region reads nothing and succeeds.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `start`, `stop` or `dest_shape` do not match the array dimensionality,
    ///  - `start` exceeds `stop` or `stop` exceeds the array shape,
    ///  - `dest_shape` or the length of `dest` cannot hold the region, or
    ///  - there is a codec or storage error.
    pub fn retrieve_slice_into(
        &self,
        start: &[u64],
        stop: &[u64],
        dest: &mut [u8],
        dest_shape: &[u64],
    ) -> Result<(), ArrayError> {
        self.retrieve_slice_into_opt(start, stop, dest, dest_shape, &SliceOptions::default())
    }

    /// Explicit options version of [`retrieve_slice_into`](Array::retrieve_slice_into).
    #[allow(clippy::missing_errors_doc)]
    pub fn retrieve_slice_into_opt(
        &self,
        start: &[u64],
        stop: &[u64],
        dest: &mut [u8],
        dest_shape: &[u64],
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        let array_subset = self.validate_slice(start, stop, dest.len(), dest_shape)?;
        let Some(chunks) = self.chunk_grid.cells_in_subset(&array_subset) else {
            return Ok(());
        };
        let chunks: Vec<ArrayIndices> = chunks.iter_indices().collect();
        let (chunk_concurrent_limit, block_concurrent_limit) = concurrency_chunks_and_blocks(
            options.concurrent_target(),
            chunks.len(),
            self.num_blocks(),
        );

        let dest = UnsafeCellSlice::new(dest);
        iter_concurrent_limit!(
            chunk_concurrent_limit,
            chunks,
            try_for_each,
            |chunk_indices: ArrayIndices| -> Result<(), ArrayError> {
                let chunk_subset = self.chunk_grid.cell_subset(&chunk_indices);
                let Some(overlap) = array_subset.overlap(&chunk_subset) else {
                    return Ok(());
                };
                self.retrieve_chunk_subset_into(
                    &chunk_indices,
                    &overlap,
                    dest,
                    dest_shape,
                    array_subset.start(),
                    block_concurrent_limit,
                )
            }
        )
    }

    /// Read the elements of the chunk at `chunk_indices` within `overlap` into `dest`.
    ///
    /// `overlap` is in array coordinates, and `dest_origin` is the array coordinate of the first element of `dest`.
    /// Only the blocks intersecting `overlap` are decompressed.
    fn retrieve_chunk_subset_into(
        &self,
        chunk_indices: &[u64],
        overlap: &ArraySubset,
        dest: UnsafeCellSlice<u8>,
        dest_shape: &[u64],
        dest_origin: &[u64],
        block_concurrent_limit: usize,
    ) -> Result<(), ArrayError> {
        let Some(encoded_chunk) = self.chunk_store.retrieve_chunk(chunk_indices)? else {
            let dest_start = overlap.relative_to(dest_origin);
            fill_region(
                unsafe { dest.get() },
                dest_shape,
                dest_start.start(),
                overlap.shape(),
                &self.fill_value,
            );
            return Ok(());
        };
        log::trace!(
            "retrieved chunk {chunk_indices:?} ({} bytes)",
            encoded_chunk.len()
        );
        let encoded_chunk = EncodedChunk::parse(&encoded_chunk, self.num_blocks())?;

        let chunk_origin = self.chunk_grid.cell_origin(chunk_indices);
        let chunk_overlap = overlap.relative_to(&chunk_origin);
        let Some(blocks) = self.block_grid.cells_in_subset(&chunk_overlap) else {
            return Ok(());
        };
        let blocks: Vec<ArrayIndices> = blocks.iter_indices().collect();
        let block_grid_shape = self.block_grid_shape();
        iter_concurrent_limit!(
            block_concurrent_limit,
            blocks,
            try_for_each,
            |block_indices: ArrayIndices| -> Result<(), ArrayError> {
                let block_subset = self
                    .block_grid
                    .cell_subset_bounded(&block_indices, self.chunk_shape());
                let Some(block_overlap) = chunk_overlap.overlap(&block_subset) else {
                    return Ok(());
                };
                let dest_start = block_overlap
                    .translate(&chunk_origin)
                    .relative_to(dest_origin);
                let block_index =
                    usize::try_from(ravel_indices(&block_indices, &block_grid_shape)).unwrap();
                let dest = unsafe { dest.get() };
                match encoded_chunk.block(block_index) {
                    Some(encoded_block) => {
                        let block_bytes = self.codecs.decompress(
                            encoded_block,
                            block_subset.num_elements_usize() * self.item_size,
                            self.item_size,
                        )?;
                        copy_region(
                            &block_bytes,
                            block_subset.shape(),
                            block_overlap.relative_to(block_subset.start()).start(),
                            dest,
                            dest_shape,
                            dest_start.start(),
                            block_overlap.shape(),
                            self.item_size,
                        );
                    }
                    None => fill_region(
                        dest,
                        dest_shape,
                        dest_start.start(),
                        block_overlap.shape(),
                        &self.fill_value,
                    ),
                }
                Ok(())
            }
        )
    }

    /// Read the elements of `array_subset` into a new C-order buffer.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `array_subset` is incompatible with the array shape,
    ///  - the output cannot be allocated, or
    ///  - there is a codec or storage error.
    pub fn retrieve_array_subset(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, ArrayError> {
        self.retrieve_array_subset_opt(array_subset, &SliceOptions::default())
    }

    /// Explicit options version of [`retrieve_array_subset`](Array::retrieve_array_subset).
    #[allow(clippy::missing_errors_doc)]
    pub fn retrieve_array_subset_opt(
        &self,
        array_subset: &ArraySubset,
        options: &SliceOptions,
    ) -> Result<Vec<u8>, ArrayError> {
        let (start, stop) = self.array_subset_bounds(array_subset)?;
        self.validate_slice(start, &stop, usize::MAX, array_subset.shape())?;
        let size = usize::try_from(array_subset.num_elements())
            .unwrap_or(usize::MAX)
            .saturating_mul(self.item_size);
        let mut bytes = vec_try_zeroed(size)?;
        self.retrieve_slice_into_opt(start, &stop, &mut bytes, array_subset.shape(), options)?;
        Ok(bytes)
    }

    /// Read the elements of `array_subset` into a new vector of `T`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the item size, or any error condition of [`retrieve_array_subset`](Array::retrieve_array_subset).
    pub fn retrieve_array_subset_elements<T: bytemuck::Pod>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<Vec<T>, ArrayError> {
        self.retrieve_array_subset_elements_opt(array_subset, &SliceOptions::default())
    }

    /// Explicit options version of [`retrieve_array_subset_elements`](Array::retrieve_array_subset_elements).
    #[allow(clippy::missing_errors_doc)]
    pub fn retrieve_array_subset_elements_opt<T: bytemuck::Pod>(
        &self,
        array_subset: &ArraySubset,
        options: &SliceOptions,
    ) -> Result<Vec<T>, ArrayError> {
        if std::mem::size_of::<T>() != self.item_size {
            return Err(ArrayError::IncompatibleElementSize(
                std::mem::size_of::<T>(),
                self.item_size,
            ));
        }
        let (start, stop) = self.array_subset_bounds(array_subset)?;
        self.validate_slice(start, &stop, usize::MAX, array_subset.shape())?;
        let num_elements = usize::try_from(array_subset.num_elements()).unwrap_or(usize::MAX);
        let mut elements = Vec::new();
        elements.try_reserve_exact(num_elements)?;
        elements.resize(num_elements, T::zeroed());
        self.retrieve_slice_into_opt(
            start,
            &stop,
            bytemuck::cast_slice_mut(&mut elements),
            array_subset.shape(),
            options,
        )?;
        Ok(elements)
    }

    #[cfg(feature = "ndarray")]
    /// Read the elements of `array_subset` into a new [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// See [`retrieve_array_subset_elements`](Array::retrieve_array_subset_elements).
    pub fn retrieve_array_subset_ndarray<T: bytemuck::Pod>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ndarray::ArrayD<T>, ArrayError> {
        let elements = self.retrieve_array_subset_elements::<T>(array_subset)?;
        let shape: Vec<usize> = array_subset
            .shape()
            .iter()
            .map(|&size| usize::try_from(size).unwrap_or(usize::MAX))
            .collect();
        Ok(ndarray::ArrayD::from_shape_vec(shape, elements)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::array::{ArrayBuilder, FillValue};

    use super::*;

    #[test]
    fn array_validate_slice() -> Result<(), Box<dyn std::error::Error>> {
        let array = ArrayBuilder::new(2, vec![8, 6], vec![4, 4], vec![2, 2]).build_zeros()?;
        assert!(array.validate_slice(&[0, 0], &[8, 6], 96, &[8, 6]).is_ok());
        assert!(array.validate_slice(&[2, 2], &[2, 5], 0, &[0, 3]).is_ok());
        // a 2x2 region in a 3x4 buffer reaches 4 + 2 elements
        assert!(array.validate_slice(&[0, 0], &[2, 2], 12, &[3, 4]).is_ok());
        assert!(matches!(
            array.validate_slice(&[0, 0], &[2, 2], 11, &[3, 4]),
            Err(ArrayError::InvalidBytesInputSize(11, 12))
        ));
        assert!(matches!(
            array.validate_slice(&[0, 0], &[9, 6], usize::MAX, &[9, 6]),
            Err(ArrayError::InvalidArraySubset(..))
        ));
        assert!(matches!(
            array.validate_slice(&[3, 0], &[2, 6], usize::MAX, &[9, 6]),
            Err(ArrayError::InvalidArraySubsetError(..))
        ));
        assert!(matches!(
            array.validate_slice(&[0, 0], &[4, 4], usize::MAX, &[4, 3]),
            Err(ArrayError::InvalidBufferShape(..))
        ));
        assert!(matches!(
            array.validate_slice(&[0], &[4], usize::MAX, &[4]),
            Err(ArrayError::IncompatibleDimensionalityError(..))
        ));
        Ok(())
    }

    #[test]
    fn array_validate_slice_overflowing_buffer_shape() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(2, vec![8, 6], vec![4, 4], vec![2, 2]).build_zeros()?;
        assert!(matches!(
            array.validate_slice(&[0, 0], &[2, 2], 100, &[2, 1 << 63]),
            Err(ArrayError::InvalidBufferShape(..))
        ));
        assert!(matches!(
            array.validate_slice(&[0, 0], &[2, 2], usize::MAX, &[u64::MAX, u64::MAX]),
            Err(ArrayError::InvalidBufferShape(..))
        ));

        let mut dest = [0u8; 100];
        assert!(array
            .retrieve_slice_into(&[0, 0], &[2, 2], &mut dest, &[2, 1 << 63])
            .is_err_and(|err| err.is_invalid_argument()));
        assert!(dest.iter().all(|&b| b == 0));
        assert!(array
            .store_slice(&[0, 0], &[2, 2], &dest, &[2, 1 << 62])
            .is_err_and(|err| err.is_invalid_argument()));
        assert_eq!(array.num_materialized_chunks()?, 0);
        Ok(())
    }

    #[test]
    fn array_retrieve_into_larger_buffer() -> Result<(), Box<dyn std::error::Error>> {
        let array = ArrayBuilder::new(1, vec![5, 5], vec![2, 3], vec![1, 2])
            .build_full(FillValue::from(3u8))?;
        let mut dest = vec![0u8; 4 * 4];
        array.retrieve_slice_into(&[1, 1], &[3, 4], &mut dest, &[4, 4])?;
        assert_eq!(dest, vec![3, 3, 3, 0, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        Ok(())
    }
}
