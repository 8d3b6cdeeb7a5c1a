use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};

use super::{check_decoded_size, BlockCodecTraits, CodecError};

/// Configuration parameters for the `gzip` block codec.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
pub struct GzipCodecConfiguration {
    /// The compression level, `0..=9`.
    pub level: u32,
}

/// A `gzip` block codec.
#[derive(Clone, Debug)]
pub struct GzipCodec {
    compression_level: u32,
}

impl GzipCodec {
    /// Create a new `gzip` codec from configuration.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidConfiguration`] if the level is greater than 9.
    pub fn new_with_configuration(
        configuration: &GzipCodecConfiguration,
    ) -> Result<Self, CodecError> {
        if configuration.level > 9 {
            Err(CodecError::InvalidConfiguration(format!(
                "gzip level {} is out of range 0..=9",
                configuration.level
            )))
        } else {
            Ok(Self {
                compression_level: configuration.level,
            })
        }
    }
}

impl BlockCodecTraits for GzipCodec {
    fn compress(&self, decoded_value: &[u8], _item_size: usize) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        _item_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::with_capacity(decoded_size);
        decoder.read_to_end(&mut out)?;
        check_decoded_size(out, decoded_size)
    }
}
