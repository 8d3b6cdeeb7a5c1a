//! Fill values.
//!
//! Every element of an array that has not been written reads as the fill value.
//! A fill value holds the byte pattern of exactly one element.

use std::collections::TryReserveError;

/// The fill value of an array.
///
/// Provides an element value to use for unmaterialised portions of the array.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FillValue(Vec<u8>);

impl core::fmt::Display for FillValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Vec<u8>> for FillValue {
    fn from(value: Vec<u8>) -> Self {
        FillValue(value)
    }
}

impl From<&[u8]> for FillValue {
    fn from(value: &[u8]) -> Self {
        FillValue(value.to_vec())
    }
}

macro_rules! impl_fill_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FillValue {
                fn from(value: $t) -> Self {
                    FillValue(value.to_ne_bytes().to_vec())
                }
            }
        )*
    };
}

impl_fill_value_from!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl FillValue {
    /// Create a new fill value composed of `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create a fill value of `size` zero bytes.
    #[must_use]
    pub fn new_zeros(size: usize) -> Self {
        Self(vec![0; size])
    }

    /// Returns the size in bytes of the fill value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Return the byte representation of the fill value.
    #[must_use]
    pub fn as_ne_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if every byte of the fill value is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&byte| byte == 0)
    }

    /// Return the bytes of `num_elements` elements equal to the fill value.
    ///
    /// # Errors
    /// Returns a [`TryReserveError`] if the bytes cannot be allocated.
    pub fn repeat(&self, num_elements: usize) -> Result<Vec<u8>, TryReserveError> {
        let size = num_elements.saturating_mul(self.0.len());
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size)?;
        if self.is_zero() {
            bytes.resize(size, 0);
        } else {
            for _ in 0..num_elements {
                bytes.extend_from_slice(&self.0);
            }
        }
        Ok(bytes)
    }

    /// Fill `bytes` with the fill value.
    ///
    /// The length of `bytes` must be a multiple of the fill value size.
    pub fn fill(&self, bytes: &mut [u8]) {
        if self.is_zero() {
            bytes.fill(0);
        } else {
            for element in bytes.chunks_exact_mut(self.0.len()) {
                element.copy_from_slice(&self.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_value_repeat() {
        let fill_value = FillValue::from(0x0102u16);
        assert_eq!(fill_value.size(), 2);
        assert!(!fill_value.is_zero());
        let bytes = fill_value.repeat(3).unwrap();
        assert_eq!(bytes.len(), 6);
        let element = 0x0102u16.to_ne_bytes();
        assert!(bytes.chunks_exact(2).all(|chunk| chunk == element));

        let zeros = FillValue::new_zeros(4);
        assert!(zeros.is_zero());
        assert_eq!(zeros.repeat(2).unwrap(), vec![0; 8]);
    }

    #[test]
    fn fill_value_fill() {
        let fill_value = FillValue::new(vec![7, 9]);
        let mut bytes = vec![0u8; 6];
        fill_value.fill(&mut bytes);
        assert_eq!(bytes, vec![7, 9, 7, 9, 7, 9]);
        assert_eq!(fill_value.to_string(), "[7, 9]");
    }
}
