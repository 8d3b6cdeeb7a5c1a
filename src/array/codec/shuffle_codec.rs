use super::{check_decoded_size, BlockCodecTraits, CodecError};

/// A byte shuffle filter.
///
/// Groups the `n`th byte of every element together, which typically improves the compression ratio of multi-byte elements.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShuffleCodec;

fn validate_length(length: usize, item_size: usize) -> Result<(), CodecError> {
    if item_size == 0 || length % item_size != 0 {
        Err(CodecError::Other(format!(
            "the shuffle codec expects a byte length {length} that is an integer multiple of the item size {item_size}"
        )))
    } else {
        Ok(())
    }
}

impl BlockCodecTraits for ShuffleCodec {
    fn compress(&self, decoded_value: &[u8], item_size: usize) -> Result<Vec<u8>, CodecError> {
        validate_length(decoded_value.len(), item_size)?;
        let mut encoded_value = vec![0; decoded_value.len()];
        let count = decoded_value.len() / item_size;
        for (i, element) in decoded_value.chunks_exact(item_size).enumerate() {
            for (byte_index, byte) in element.iter().enumerate() {
                encoded_value[byte_index * count + i] = *byte;
            }
        }
        Ok(encoded_value)
    }

    fn decompress(
        &self,
        encoded_value: &[u8],
        decoded_size: usize,
        item_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        validate_length(encoded_value.len(), item_size)?;
        let mut decoded_value = vec![0; encoded_value.len()];
        let count = encoded_value.len() / item_size;
        for (byte_index, plane) in encoded_value.chunks_exact(count.max(1)).enumerate() {
            for (i, byte) in plane.iter().enumerate() {
                decoded_value[i * item_size + byte_index] = *byte;
            }
        }
        check_decoded_size(decoded_value, decoded_size)
    }
}
