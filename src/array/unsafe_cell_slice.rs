/// A destination buffer shared between threads that write disjoint regions of it.
///
/// Slice reads decode chunks and blocks in parallel straight into the caller's buffer.
/// Each worker writes only the elements of its own region, which the chunk and block grids keep disjoint.
#[derive(Copy, Clone)]
pub struct UnsafeCellSlice<'a, T>(&'a [std::cell::UnsafeCell<T>]);

unsafe impl<'a, T: Send + Sync> Send for UnsafeCellSlice<'a, T> {}
unsafe impl<'a, T: Send + Sync> Sync for UnsafeCellSlice<'a, T> {}

impl<'a, T: Copy> UnsafeCellSlice<'a, T> {
    /// Create a new [`UnsafeCellSlice`].
    #[must_use]
    pub fn new(slice: &'a mut [T]) -> Self {
        let ptr = slice as *mut [T] as *const [std::cell::UnsafeCell<T>];
        Self(unsafe { &*ptr })
    }

    /// Get the underlying buffer.
    ///
    /// # Safety
    /// Every caller holding the buffer at the same time must write a disjoint set of elements.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut [T] {
        let ptr = std::cell::UnsafeCell::raw_get(self.0.as_ptr());
        std::slice::from_raw_parts_mut(ptr, self.0.len())
    }

    /// Get the length of the slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the slice has a length of 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;

    #[test]
    fn unsafe_cell_slice_disjoint_writes() {
        let mut data = vec![0u8; 64];
        {
            let slice = UnsafeCellSlice::new(&mut data);
            (0..8usize).into_par_iter().for_each(|i| {
                let data = unsafe { slice.get() };
                data[i * 8..(i + 1) * 8].fill(u8::try_from(i).unwrap());
            });
        }
        assert!(data.chunks_exact(8).enumerate().all(|(i, chunk)| chunk
            .iter()
            .all(|&v| usize::from(v) == i)));

        let mut empty: Vec<u8> = vec![];
        let slice = UnsafeCellSlice::new(&mut empty);
        assert!(slice.is_empty());
        assert!(unsafe { slice.get() }.is_empty());
    }
}
