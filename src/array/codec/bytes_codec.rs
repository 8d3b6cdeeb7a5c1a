use super::{check_decoded_size, BlockCodecTraits, CodecError};

/// A codec storing block bytes without compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl BlockCodecTraits for BytesCodec {
    fn compress(&self, decoded_value: &[u8], _item_size: usize) -> Result<Vec<u8>, CodecError> {
        Ok(decoded_value.to_vec())
    }

    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        _item_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        check_decoded_size(encoded_value.to_vec(), decoded_size)
    }
}
