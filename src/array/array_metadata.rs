use serde::{Deserialize, Serialize};

use super::codec::BlockCodecChainMetadata;

/// The version of the array metadata written by this crate.
pub const ARRAY_METADATA_VERSION: u32 = 1;

/// Array metadata.
///
/// Persisted alongside the chunks of an array and used to reopen it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArrayMetadata {
    /// The metadata version. Must be [`ARRAY_METADATA_VERSION`].
    pub version: u32,
    /// The size in bytes of one element.
    pub item_size: usize,
    /// The array shape.
    pub shape: Vec<u64>,
    /// The chunk shape.
    pub chunk_shape: Vec<u64>,
    /// The block shape.
    pub block_shape: Vec<u64>,
    /// The bytes of the fill value.
    pub fill_value: Vec<u8>,
    /// True if chunks are packed into one contiguous frame.
    pub contiguous: bool,
    /// The block codecs.
    pub codecs: BlockCodecChainMetadata,
}

impl ArrayMetadata {
    /// Serialise the metadata to pretty JSON.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if serialisation fails.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Deserialise the metadata from JSON.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if `bytes` are not valid array metadata.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::codec::CompressorMetadata;

    #[test]
    fn array_metadata_json() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = ArrayMetadata {
            version: ARRAY_METADATA_VERSION,
            item_size: 4,
            shape: vec![10, 5],
            chunk_shape: vec![4, 5],
            block_shape: vec![2, 5],
            fill_value: vec![0, 0, 128, 63],
            contiguous: false,
            codecs: BlockCodecChainMetadata {
                shuffle: true,
                compressor: CompressorMetadata::Zstd { level: 5 },
            },
        };
        let json = metadata.to_json_vec()?;
        assert_eq!(ArrayMetadata::from_json_slice(&json)?, metadata);

        let unknown_field = String::from_utf8(json)?.replace("\"contiguous\"", "\"layout\"");
        assert!(ArrayMetadata::from_json_slice(unknown_field.as_bytes()).is_err());
        Ok(())
    }
}
