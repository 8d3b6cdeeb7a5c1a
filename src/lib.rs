//! A chunked, block-compressed N-dimensional array store.
//!
//! An [`Array`](array::Array) is a dense N-dimensional array of fixed size elements, partitioned into chunks by a regular grid.
//! Each chunk is further partitioned into blocks that are compressed independently, so that partial reads and writes only touch the blocks they intersect.
//! Arrays live in memory or persist at a path, and can be grown along any axis with [`append`](array::Array::append) or [`resize`](array::Array::resize).
//!
//! ## Getting Started
//! - [`array::ArrayBuilder`] creates new arrays and [`array::Array::open`] opens persisted arrays.
//! - [`array::Array`] documents reading, writing and growing arrays.
//! - [`storage`] documents the sparse and contiguous chunk layouts.
//!
//! ## Example
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ndstore::array::ArrayBuilder;
//! use ndstore::array_subset::ArraySubset;
//!
//! let mut array = ArrayBuilder::new(
//!     8,              // item size
//!     vec![64, 64],   // array shape
//!     vec![16, 16],   // chunk shape
//!     vec![4, 16],    // block shape
//! )
//! .build_full(f64::NAN)?;
//!
//! // Write a 2x3 region
//! let subset = ArraySubset::new_with_start_end_exc(&[10, 20], &[12, 23])?;
//! array.store_array_subset_elements::<f64>(&subset, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])?;
//!
//! // Read a 3x3 region overlapping the written region
//! let subset = ArraySubset::new_with_start_end_exc(&[9, 20], &[12, 23])?;
//! let elements = array.retrieve_array_subset_elements::<f64>(&subset)?;
//! assert!(elements[..3].iter().all(|element| element.is_nan()));
//! assert_eq!(&elements[3..], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
//!
//! // Append 8 rows
//! array.append(&vec![0u8; 8 * 8 * 64], 0)?;
//! assert_eq!(array.shape(), &[72, 64]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`Array`](crate::array::Array).
//!  - Codecs: `gzip`, `zstd`.
//!
//! ## Licence
//! `ndstore` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod array_subset;
pub mod byte_range;
pub mod config;
pub mod storage;

pub use storage::remove;
