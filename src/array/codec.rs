//! Block codecs.
//!
//! Every compression block of a chunk is compressed independently by a [`BlockCodecChain`].
//! A chain is an optional byte [`ShuffleCodec`] followed by one compressor:
//!  - [`BytesCodec`]: stores block bytes as-is,
//!  - [`ZstdCodec`]: `zstd` compression (requires the `zstd` feature), or
//!  - [`GzipCodec`]: `gzip` compression (requires the `gzip` feature).
//!
//! The chain configuration is serialised into the array metadata as [`BlockCodecChainMetadata`] so an array can be reopened with the same codecs.

mod bytes_codec;
#[cfg(feature = "gzip")]
mod gzip_codec;
mod shuffle_codec;
#[cfg(feature = "zstd")]
mod zstd_codec;

pub use bytes_codec::BytesCodec;
#[cfg(feature = "gzip")]
pub use gzip_codec::{GzipCodec, GzipCodecConfiguration};
pub use shuffle_codec::ShuffleCodec;
#[cfg(feature = "zstd")]
pub use zstd_codec::{ZstdCodec, ZstdCodecConfiguration};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Traits for a codec compressing and decompressing a single block.
pub trait BlockCodecTraits: core::fmt::Debug + Send + Sync {
    /// Compress the raw bytes of a block holding elements of `item_size` bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if compression fails.
    fn compress(&self, decoded_value: &[u8], item_size: usize) -> Result<Vec<u8>, CodecError>;

    /// Decompress an encoded block into exactly `decoded_size` bytes of elements of `item_size` bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if decompression fails, including when the decompressed size is not `decoded_size`.
    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        item_size: usize,
    ) -> Result<Vec<u8>, CodecError>;
}

/// A codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An unexpected decoded size.
    #[error("got decoded size {_0}, expected {_1}")]
    UnexpectedDecodedSize(usize, usize),
    /// An encoded chunk is corrupt or truncated.
    #[error("invalid encoded chunk: {_0}")]
    InvalidEncodedChunk(String),
    /// The codec is not supported by this build.
    #[error("unsupported codec {_0}")]
    Unsupported(String),
    /// An invalid codec configuration.
    #[error("invalid codec configuration: {_0}")]
    InvalidConfiguration(String),
    /// Other.
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for CodecError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for CodecError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Check that a decoded block has the expected size.
fn check_decoded_size(decoded_value: Vec<u8>, decoded_size: usize) -> Result<Vec<u8>, CodecError> {
    if decoded_value.len() == decoded_size {
        Ok(decoded_value)
    } else {
        Err(CodecError::UnexpectedDecodedSize(
            decoded_value.len(),
            decoded_size,
        ))
    }
}

/// The compressor of a [`BlockCodecChain`] as stored in array metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum CompressorMetadata {
    /// Uncompressed block bytes.
    Bytes,
    /// `zstd` compression.
    Zstd {
        /// The compression level.
        level: i32,
    },
    /// `gzip` compression.
    Gzip {
        /// The compression level.
        level: u32,
    },
}

/// The configuration of a [`BlockCodecChain`] as stored in array metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlockCodecChainMetadata {
    /// Apply a byte shuffle filter before compression.
    pub shuffle: bool,
    /// The compressor.
    pub compressor: CompressorMetadata,
}

/// A chain of block codecs: an optional byte shuffle followed by a compressor.
#[derive(Debug, Clone)]
pub struct BlockCodecChain {
    shuffle: Option<ShuffleCodec>,
    compressor: Arc<dyn BlockCodecTraits>,
    metadata: BlockCodecChainMetadata,
}

impl BlockCodecChain {
    /// Create a new block codec chain from its metadata.
    ///
    /// # Errors
    /// Returns [`CodecError::Unsupported`] if the compressor is not enabled in this build, or [`CodecError::InvalidConfiguration`] if its level is out of range.
    pub fn from_metadata(metadata: &BlockCodecChainMetadata) -> Result<Self, CodecError> {
        let compressor: Arc<dyn BlockCodecTraits> = match &metadata.compressor {
            CompressorMetadata::Bytes => Arc::new(BytesCodec),
            #[cfg(feature = "zstd")]
            CompressorMetadata::Zstd { level } => Arc::new(ZstdCodec::new_with_configuration(
                &ZstdCodecConfiguration { level: *level },
            )?),
            #[cfg(feature = "gzip")]
            CompressorMetadata::Gzip { level } => Arc::new(GzipCodec::new_with_configuration(
                &GzipCodecConfiguration { level: *level },
            )?),
            #[allow(unreachable_patterns)]
            compressor => {
                return Err(CodecError::Unsupported(format!("{compressor:?}")));
            }
        };
        Ok(Self {
            shuffle: metadata.shuffle.then_some(ShuffleCodec),
            compressor,
            metadata: metadata.clone(),
        })
    }

    /// Create a chain that stores blocks uncompressed.
    #[must_use]
    pub fn new_bytes() -> Self {
        Self {
            shuffle: None,
            compressor: Arc::new(BytesCodec),
            metadata: BlockCodecChainMetadata {
                shuffle: false,
                compressor: CompressorMetadata::Bytes,
            },
        }
    }

    /// Create a chain from a `compressor` with an optional preceding byte shuffle.
    ///
    /// # Errors
    /// See [`BlockCodecChain::from_metadata`].
    pub fn new(shuffle: bool, compressor: CompressorMetadata) -> Result<Self, CodecError> {
        Self::from_metadata(&BlockCodecChainMetadata {
            shuffle,
            compressor,
        })
    }

    /// Return the metadata of the chain.
    #[must_use]
    pub fn metadata(&self) -> &BlockCodecChainMetadata {
        &self.metadata
    }
}

impl Default for BlockCodecChain {
    /// The default chain: byte shuffle with `zstd` level 5 if enabled, else `gzip` level 5, else uncompressed.
    fn default() -> Self {
        #[cfg(feature = "zstd")]
        let compressor = Some(CompressorMetadata::Zstd { level: 5 });
        #[cfg(all(not(feature = "zstd"), feature = "gzip"))]
        let compressor = Some(CompressorMetadata::Gzip { level: 5 });
        #[cfg(not(any(feature = "zstd", feature = "gzip")))]
        let compressor: Option<CompressorMetadata> = None;

        compressor
            .and_then(|compressor| Self::new(true, compressor).ok())
            .unwrap_or_else(Self::new_bytes)
    }
}

impl BlockCodecTraits for BlockCodecChain {
    fn compress(&self, decoded_value: &[u8], item_size: usize) -> Result<Vec<u8>, CodecError> {
        match &self.shuffle {
            Some(shuffle) => {
                let shuffled = shuffle.compress(decoded_value, item_size)?;
                self.compressor.compress(&shuffled, item_size)
            }
            None => self.compressor.compress(decoded_value, item_size),
        }
    }

    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        item_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let decoded_value = self
            .compressor
            .decompress(encoded_value, decoded_size, item_size)?;
        match &self.shuffle {
            Some(shuffle) => shuffle.decompress(&decoded_value, decoded_size, item_size),
            None => Ok(decoded_value),
        }
    }
}
