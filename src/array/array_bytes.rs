//! Strided copies between C-order element buffers.
//!
//! Every buffer is a dense C-order array of fixed size elements described by its shape.
//! A region is addressed in each buffer by its start indices, and copies proceed in the longest runs that are contiguous in both buffers.

use std::collections::TryReserveError;

use itertools::izip;

use crate::array_subset::{contiguous_runs, ArraySubset};

use super::FillValue;

/// Return the linearised index of `start + offset` in an array of `shape`.
fn ravel_offset(start: &[u64], offset: &[u64], shape: &[u64]) -> u64 {
    izip!(start, offset, shape)
        .fold(0, |acc, (start, offset, size)| acc * size + start + offset)
}

/// Return the byte offset of `start + offset` in an array of `shape`.
fn byte_offset(start: &[u64], offset: &[u64], shape: &[u64], item_size: usize) -> usize {
    usize::try_from(ravel_offset(start, offset, shape)).unwrap() * item_size
}

/// Allocate `size` zero bytes.
///
/// # Errors
/// Returns a [`TryReserveError`] if the bytes cannot be allocated.
pub(crate) fn vec_try_zeroed(size: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(size)?;
    bytes.resize(size, 0);
    Ok(bytes)
}

/// Copy a region of `region_shape` elements from `src` at `src_start` to `dst` at `dst_start`.
///
/// The region must lie within both `src_shape` and `dst_shape`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_region(
    src: &[u8],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    region_shape: &[u64],
    item_size: usize,
) {
    debug_assert_eq!(src_shape.len(), region_shape.len());
    debug_assert_eq!(dst_shape.len(), region_shape.len());
    if region_shape.iter().any(|&size| size == 0) {
        return;
    }
    let (outer_shape, run) = contiguous_runs(region_shape, &[src_shape, dst_shape]);
    let run_bytes = usize::try_from(run).unwrap() * item_size;
    for outer in ArraySubset::new_with_shape(outer_shape).iter_indices() {
        let src_offset = byte_offset(src_start, &outer, src_shape, item_size);
        let dst_offset = byte_offset(dst_start, &outer, dst_shape, item_size);
        dst[dst_offset..dst_offset + run_bytes]
            .copy_from_slice(&src[src_offset..src_offset + run_bytes]);
    }
}

/// Fill a region of `region_shape` elements in `dst` at `dst_start` with `fill_value`.
///
/// The region must lie within `dst_shape`.
pub(crate) fn fill_region(
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    region_shape: &[u64],
    fill_value: &FillValue,
) {
    debug_assert_eq!(dst_shape.len(), region_shape.len());
    if region_shape.iter().any(|&size| size == 0) {
        return;
    }
    let item_size = fill_value.size();
    let (outer_shape, run) = contiguous_runs(region_shape, &[dst_shape]);
    let run_bytes = usize::try_from(run).unwrap() * item_size;
    for outer in ArraySubset::new_with_shape(outer_shape).iter_indices() {
        let dst_offset = byte_offset(dst_start, &outer, dst_shape, item_size);
        fill_value.fill(&mut dst[dst_offset..dst_offset + run_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_bytes_copy_region() {
        let src: Vec<u8> = (0..16).collect();
        let mut dst = vec![0u8; 3 * 3];
        copy_region(
            &src,
            &[4, 4],
            &[1, 1],
            &mut dst,
            &[3, 3],
            &[1, 0],
            &[2, 2],
            1,
        );
        assert_eq!(dst, vec![0, 0, 0, 5, 6, 0, 9, 10, 0]);

        let src: Vec<u8> = (0..8).collect();
        let mut dst = vec![0u8; 8];
        copy_region(
            &src,
            &[2, 2],
            &[0, 0],
            &mut dst,
            &[2, 2],
            &[0, 0],
            &[2, 2],
            2,
        );
        assert_eq!(dst, src);
    }

    #[test]
    fn array_bytes_copy_region_zero_dimensional() {
        let mut dst = vec![0u8; 2];
        copy_region(&[7, 8], &[], &[], &mut dst, &[], &[], &[], 2);
        assert_eq!(dst, vec![7, 8]);
    }

    #[test]
    fn array_bytes_fill_region() {
        let mut dst = vec![0u8; 4 * 4];
        fill_region(&mut dst, &[4, 4], &[1, 2], &[3, 2], &FillValue::from(9u8));
        assert_eq!(dst, vec![0, 0, 0, 0, 0, 0, 9, 9, 0, 0, 9, 9, 0, 0, 9, 9]);

        let mut dst = vec![1u8; 4];
        fill_region(&mut dst, &[2], &[0], &[0], &FillValue::from(0u16));
        assert_eq!(dst, vec![1, 1, 1, 1]);
    }

    #[test]
    fn array_bytes_vec_try_zeroed() -> Result<(), TryReserveError> {
        assert_eq!(vec_try_zeroed(3)?, vec![0, 0, 0]);
        assert!(vec_try_zeroed(usize::MAX).is_err());
        Ok(())
    }
}
