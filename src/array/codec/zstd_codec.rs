use serde::{Deserialize, Serialize};

use super::{check_decoded_size, BlockCodecTraits, CodecError};

/// Configuration parameters for the `zstd` block codec.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
pub struct ZstdCodecConfiguration {
    /// The compression level.
    pub level: i32,
}

/// A `zstd` block codec.
#[derive(Clone, Debug)]
pub struct ZstdCodec {
    level: zstd::zstd_safe::CompressionLevel,
}

impl ZstdCodec {
    /// Create a new `zstd` codec from configuration.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidConfiguration`] if the level is outside the range supported by `zstd`.
    pub fn new_with_configuration(
        configuration: &ZstdCodecConfiguration,
    ) -> Result<Self, CodecError> {
        if zstd::compression_level_range().contains(&configuration.level) {
            Ok(Self {
                level: configuration.level,
            })
        } else {
            Err(CodecError::InvalidConfiguration(format!(
                "zstd level {} is out of range",
                configuration.level
            )))
        }
    }
}

impl BlockCodecTraits for ZstdCodec {
    fn compress(&self, decoded_value: &[u8], _item_size: usize) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(decoded_value, self.level).map_err(CodecError::IOError)
    }

    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        _item_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let decoded_value = zstd::decode_all(encoded_value).map_err(CodecError::IOError)?;
        check_decoded_size(decoded_value, decoded_size)
    }
}
