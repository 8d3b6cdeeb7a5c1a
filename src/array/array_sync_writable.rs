use std::{borrow::Cow, collections::BTreeMap};

use parking_lot::Mutex;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    storage::ChunkStoreTraits,
};

use super::{
    array_bytes::{copy_region, fill_region, vec_try_zeroed},
    array_indices,
    chunk::{encode_chunk, EncodedChunk},
    codec::BlockCodecTraits,
    concurrency::concurrency_chunks_and_blocks,
    ravel_indices, Array, ArrayError, ArrayIndices, SliceOptions,
};

/// The prior state of every chunk replaced by an operation.
///
/// Only the first state recorded for a chunk is kept.
#[derive(Debug, Default)]
pub(super) struct ChunkJournal {
    prior: Mutex<BTreeMap<ArrayIndices, Option<Vec<u8>>>>,
}

impl ChunkJournal {
    /// Record the encoded chunk at `chunk_indices` before it is replaced, or [`None`] if it was not materialised.
    pub(super) fn record(&self, chunk_indices: &[u64], prior: Option<Vec<u8>>) {
        self.prior
            .lock()
            .entry(array_indices(chunk_indices))
            .or_insert(prior);
    }

    /// Return the number of recorded chunks.
    pub(super) fn len(&self) -> usize {
        self.prior.lock().len()
    }

    /// Restore every recorded chunk.
    ///
    /// Failures are logged, and restoration continues with the remaining chunks.
    pub(super) fn rollback(self, chunk_store: &dyn ChunkStoreTraits) {
        for (chunk_indices, prior) in self.prior.into_inner() {
            let restored = match prior {
                Some(encoded_chunk) => chunk_store.store_chunk(&chunk_indices, &encoded_chunk),
                None => chunk_store.erase_chunk(&chunk_indices).map(|_| ()),
            };
            if let Err(err) = restored {
                log::warn!("failed to restore chunk {chunk_indices:?}: {err}");
            }
        }
    }
}

/// The elements written by [`Array::update_subset`].
#[derive(Debug, Clone, Copy)]
pub(super) enum UpdateSource<'a> {
    /// A C-order buffer with `shape` whose first element lies at the array indices `origin`.
    Bytes {
        bytes: &'a [u8],
        shape: &'a [u64],
        origin: &'a [u64],
    },
    /// The fill value.
    Fill,
}

impl Array {
    /// Write `source` over `array_subset`, recording every replaced chunk in `journal`.
    ///
    /// If `materialized_only` is true, chunks that are not materialised are skipped.
    /// The array shape must already cover `array_subset`.
    pub(super) fn update_subset(
        &self,
        array_subset: &ArraySubset,
        source: UpdateSource,
        journal: &ChunkJournal,
        options: &SliceOptions,
        materialized_only: bool,
    ) -> Result<(), ArrayError> {
        let Some(chunks) = self.chunk_grid.cells_in_subset(array_subset) else {
            return Ok(());
        };
        let mut chunks: Vec<ArrayIndices> = chunks.iter_indices().collect();
        if materialized_only {
            let mut materialized = Vec::with_capacity(chunks.len());
            for chunk_indices in chunks {
                if self.chunk_store.chunk_exists(&chunk_indices)? {
                    materialized.push(chunk_indices);
                }
            }
            chunks = materialized;
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let (chunk_concurrent_limit, block_concurrent_limit) = concurrency_chunks_and_blocks(
            options.concurrent_target(),
            chunks.len(),
            self.num_blocks(),
        );
        iter_concurrent_limit!(
            chunk_concurrent_limit,
            chunks,
            try_for_each,
            |chunk_indices: ArrayIndices| -> Result<(), ArrayError> {
                let chunk_subset = self.chunk_grid.cell_subset(&chunk_indices);
                let Some(overlap) = array_subset.overlap(&chunk_subset) else {
                    return Ok(());
                };
                self.update_chunk(
                    &chunk_indices,
                    &overlap,
                    source,
                    journal,
                    block_concurrent_limit,
                )
            }
        )
    }

    /// Write `source` over `overlap` (in array coordinates) within the chunk at `chunk_indices`.
    ///
    /// Blocks outside of `overlap` keep their encoded bytes.
    fn update_chunk(
        &self,
        chunk_indices: &[u64],
        overlap: &ArraySubset,
        source: UpdateSource,
        journal: &ChunkJournal,
        block_concurrent_limit: usize,
    ) -> Result<(), ArrayError> {
        let prior = self.chunk_store.retrieve_chunk(chunk_indices)?;
        let chunk_origin = self.chunk_grid.cell_origin(chunk_indices);
        let chunk_overlap = overlap.relative_to(&chunk_origin);
        let visible = self
            .chunk_grid
            .cell_subset_bounded(chunk_indices, &self.shape)
            .relative_to(&chunk_origin);
        let Some(touched) = self.block_grid.cells_in_subset(&chunk_overlap) else {
            return Ok(());
        };
        let touched: Vec<(ArrayIndices, ArraySubset, ArraySubset)> = touched
            .iter_indices()
            .filter_map(|block_indices| {
                let block_subset = self
                    .block_grid
                    .cell_subset_bounded(&block_indices, self.chunk_shape());
                chunk_overlap
                    .overlap(&block_subset)
                    .map(|block_overlap| (block_indices, block_subset, block_overlap))
            })
            .collect();

        let num_blocks = self.num_blocks();
        let block_grid_shape = self.block_grid_shape();
        let encoded_chunk = {
            let prior_chunk = prior
                .as_deref()
                .map(|prior| EncodedChunk::parse(prior, num_blocks))
                .transpose()?;
            let prior_block = |block_index: usize| prior_chunk.as_ref()?.block(block_index);

            let updated_blocks = iter_concurrent_limit!(
                block_concurrent_limit,
                touched,
                map,
                |(block_indices, block_subset, block_overlap): (
                    ArrayIndices,
                    ArraySubset,
                    ArraySubset
                )|
                 -> Result<(usize, Vec<u8>), ArrayError> {
                    let block_index =
                        usize::try_from(ravel_indices(&block_indices, &block_grid_shape)).unwrap();
                    let num_elements = block_subset.num_elements_usize();
                    let decoded_size = num_elements * self.item_size;
                    let covers_visible =
                        block_subset.overlap(&visible).as_ref() == Some(&block_overlap);
                    let mut block_bytes = if covers_visible && block_overlap == block_subset {
                        vec_try_zeroed(decoded_size)?
                    } else if covers_visible {
                        self.fill_value.repeat(num_elements)?
                    } else if let Some(encoded_block) = prior_block(block_index) {
                        self.codecs
                            .decompress(encoded_block, decoded_size, self.item_size)?
                    } else {
                        self.fill_value.repeat(num_elements)?
                    };

                    let block_start = block_overlap.relative_to(block_subset.start());
                    match source {
                        UpdateSource::Bytes {
                            bytes,
                            shape,
                            origin,
                        } => {
                            let src_start = block_overlap
                                .translate(&chunk_origin)
                                .relative_to(origin);
                            copy_region(
                                bytes,
                                shape,
                                src_start.start(),
                                &mut block_bytes,
                                block_subset.shape(),
                                block_start.start(),
                                block_overlap.shape(),
                                self.item_size,
                            );
                        }
                        UpdateSource::Fill => fill_region(
                            &mut block_bytes,
                            block_subset.shape(),
                            block_start.start(),
                            block_overlap.shape(),
                            &self.fill_value,
                        ),
                    }
                    let encoded_block = self.codecs.compress(&block_bytes, self.item_size)?;
                    Ok((block_index, encoded_block))
                }
            )
            .collect::<Result<Vec<_>, ArrayError>>()?;

            let mut blocks: Vec<Option<Cow<[u8]>>> = (0..num_blocks)
                .map(|block_index| prior_block(block_index).map(Cow::Borrowed))
                .collect();
            for (block_index, encoded_block) in updated_blocks {
                blocks[block_index] = Some(Cow::Owned(encoded_block));
            }
            encode_chunk(&blocks)
        };

        log::trace!(
            "storing chunk {chunk_indices:?} ({} bytes)",
            encoded_chunk.len()
        );
        journal.record(chunk_indices, prior);
        self.chunk_store.store_chunk(chunk_indices, &encoded_chunk)?;
        Ok(())
    }

    /// Write the elements of `src`, a C-order buffer with shape `src_shape`, into `[start, stop)`.
    ///
    /// The region is read from the origin of `src`, so `src_shape` must be at least `stop - start` in every dimension.
    /// Every chunk touched by the region is materialised.
    ///
    /// The write is all-or-nothing: if any chunk fails to encode or store, the chunks already replaced are restored.
    /// An empty region writes nothing and succeeds.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `start`, `stop` or `src_shape` do not match the array dimensionality,
    ///  - `start` exceeds `stop` or `stop` exceeds the array shape,
    ///  - `src_shape` or the length of `src` cannot hold the region, or
    ///  - there is a codec or storage error.
    pub fn store_slice(
        &mut self,
        start: &[u64],
        stop: &[u64],
        src: &[u8],
        src_shape: &[u64],
    ) -> Result<(), ArrayError> {
        self.store_slice_opt(start, stop, src, src_shape, &SliceOptions::default())
    }

    /// Explicit options version of [`store_slice`](Array::store_slice).
    #[allow(clippy::missing_errors_doc)]
    pub fn store_slice_opt(
        &mut self,
        start: &[u64],
        stop: &[u64],
        src: &[u8],
        src_shape: &[u64],
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        let array_subset = self.validate_slice(start, stop, src.len(), src_shape)?;
        if array_subset.is_empty() {
            return Ok(());
        }
        let source = UpdateSource::Bytes {
            bytes: src,
            shape: src_shape,
            origin: array_subset.start(),
        };
        let journal = ChunkJournal::default();
        if let Err(err) = self.update_subset(&array_subset, source, &journal, options, false) {
            log::warn!(
                "store of {array_subset} failed, restoring {} chunks: {err}",
                journal.len()
            );
            journal.rollback(&*self.chunk_store);
            return Err(err);
        }
        Ok(())
    }

    /// Write `subset_bytes`, the C-order elements of `array_subset`.
    ///
    /// # Errors
    /// See [`store_slice`](Array::store_slice).
    pub fn store_array_subset(
        &mut self,
        array_subset: &ArraySubset,
        subset_bytes: &[u8],
    ) -> Result<(), ArrayError> {
        self.store_array_subset_opt(array_subset, subset_bytes, &SliceOptions::default())
    }

    /// Explicit options version of [`store_array_subset`](Array::store_array_subset).
    #[allow(clippy::missing_errors_doc)]
    pub fn store_array_subset_opt(
        &mut self,
        array_subset: &ArraySubset,
        subset_bytes: &[u8],
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
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
        let expected_size = array_subset
            .shape()
            .iter()
            .try_fold(self.item_size as u64, |size, &n| size.checked_mul(n));
        if expected_size != Some(subset_bytes.len() as u64) {
            return Err(ArrayError::InvalidBytesInputSize(
                subset_bytes.len(),
                expected_size.unwrap_or(u64::MAX),
            ));
        }
        self.store_slice_opt(
            array_subset.start(),
            &array_subset.end_exc(),
            subset_bytes,
            array_subset.shape(),
            options,
        )
    }

    /// Write `subset_elements`, the C-order elements of `array_subset`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the item size, or any error condition of [`store_array_subset`](Array::store_array_subset).
    pub fn store_array_subset_elements<T: bytemuck::Pod>(
        &mut self,
        array_subset: &ArraySubset,
        subset_elements: &[T],
    ) -> Result<(), ArrayError> {
        self.store_array_subset_elements_opt(
            array_subset,
            subset_elements,
            &SliceOptions::default(),
        )
    }

    /// Explicit options version of [`store_array_subset_elements`](Array::store_array_subset_elements).
    #[allow(clippy::missing_errors_doc)]
    pub fn store_array_subset_elements_opt<T: bytemuck::Pod>(
        &mut self,
        array_subset: &ArraySubset,
        subset_elements: &[T],
        options: &SliceOptions,
    ) -> Result<(), ArrayError> {
        if std::mem::size_of::<T>() != self.item_size {
            return Err(ArrayError::IncompatibleElementSize(
                std::mem::size_of::<T>(),
                self.item_size,
            ));
        }
        self.store_array_subset_opt(array_subset, bytemuck::cast_slice(subset_elements), options)
    }

    #[cfg(feature = "ndarray")]
    /// Write the elements of `subset_array` into the region of the same shape starting at `subset_start`.
    ///
    /// # Errors
    /// See [`store_array_subset_elements`](Array::store_array_subset_elements).
    pub fn store_array_subset_ndarray<T: bytemuck::Pod>(
        &mut self,
        subset_start: &[u64],
        subset_array: ndarray::ArrayViewD<'_, T>,
    ) -> Result<(), ArrayError> {
        let subset_shape: Vec<u64> = subset_array
            .shape()
            .iter()
            .map(|&size| size as u64)
            .collect();
        let stop: Vec<u64> = std::iter::zip(subset_start, &subset_shape)
            .map(|(start, size)| start + size)
            .collect();
        let array_subset = ArraySubset::new_with_start_end_exc(subset_start, &stop)?;
        let elements: Vec<T> = subset_array.iter().copied().collect();
        self.store_array_subset_elements(&array_subset, &elements)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::{ArrayBuilder, Chunk, FillValue},
        storage::{store::MemoryStore, SparseChunkStore},
    };

    use super::*;

    #[test]
    fn chunk_journal_first_record_wins() -> Result<(), Box<dyn std::error::Error>> {
        let chunk_store = SparseChunkStore::new(std::sync::Arc::new(MemoryStore::new()));
        chunk_store.store_chunk(&[0], &[1, 2, 3])?;
        chunk_store.store_chunk(&[1], &[4])?;

        let journal = ChunkJournal::default();
        journal.record(&[0], Some(vec![1, 2, 3]));
        journal.record(&[0], Some(vec![9]));
        journal.record(&[1], None);
        assert_eq!(journal.len(), 2);
        chunk_store.store_chunk(&[0], &[9])?;

        journal.rollback(&chunk_store);
        assert_eq!(chunk_store.retrieve_chunk(&[0])?, Some(vec![1, 2, 3]));
        assert!(!chunk_store.chunk_exists(&[1])?);
        Ok(())
    }

    #[test]
    fn array_store_partial_block() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(1, vec![6, 6], vec![4, 4], vec![2, 3])
            .build_full(FillValue::from(7u8))?;
        array.store_slice(&[1, 1], &[3, 2], &[1, 2], &[2, 1])?;
        assert!(array.chunk_is_materialized(&[0, 0])?);
        assert!(!array.chunk_is_materialized(&[1, 1])?);

        let elements = array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(
            &[0, 0],
            &[4, 3],
        )?)?;
        assert_eq!(elements, vec![7, 7, 7, 7, 1, 7, 7, 2, 7, 7, 7, 7]);
        Ok(())
    }

    #[test]
    fn array_store_untouched_blocks_stay_absent() -> Result<(), Box<dyn std::error::Error>> {
        let mut array = ArrayBuilder::new(1, vec![4], vec![4], vec![1]).build_zeros()?;
        array.store_slice(&[2], &[3], &[5], &[1])?;
        let Chunk::Stored(encoded_chunk) = array.chunk(&[0])? else {
            panic!("chunk is not materialised");
        };
        let encoded_chunk = EncodedChunk::parse(&encoded_chunk, 4)?;
        assert!(encoded_chunk.block(0).is_none());
        assert!(encoded_chunk.block(1).is_none());
        assert!(encoded_chunk.block(2).is_some());
        assert!(encoded_chunk.block(3).is_none());
        Ok(())
    }
}
