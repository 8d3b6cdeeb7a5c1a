//! Encoded chunks.
//!
//! A stored chunk is laid out over the nominal chunk shape and partitioned into compression blocks by a [`RegularGrid`](super::RegularGrid).
//! Its encoded representation is a block index followed by the independently compressed blocks:
//!
//! ```text
//! [b"NDCK"][u32 LE number of blocks]
//! [number of blocks x (u64 LE offset, u64 LE length)]
//! [compressed blocks]
//! ```
//!
//! Offsets are relative to the start of the compressed blocks.
//! A block that has never been written has an index entry of `(u64::MAX, u64::MAX)` and reads as the fill value.

use crate::byte_range::ByteRange;

use super::{codec::CodecError, FillValue};

const CHUNK_MAGIC: [u8; 4] = *b"NDCK";

const CHUNK_HEADER_SIZE: usize = 8;

const BLOCK_INDEX_ENTRY_SIZE: usize = 16;

const BLOCK_MISSING: u64 = u64::MAX;

/// The state of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// The chunk has not been materialised: every element equals the fill value.
    Uniform(FillValue),
    /// The chunk is materialised as encoded bytes.
    Stored(Vec<u8>),
}

impl Chunk {
    /// Returns true if the chunk is [`Chunk::Uniform`].
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform(_))
    }
}

/// A parsed view of an encoded chunk.
#[derive(Debug)]
pub struct EncodedChunk<'a> {
    blocks: &'a [u8],
    index: Vec<Option<ByteRange>>,
}

impl<'a> EncodedChunk<'a> {
    /// Parse the block index of an encoded chunk with `num_blocks` blocks.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidEncodedChunk`] if the chunk is truncated, has an unexpected block count, or an index entry lies outside of the encoded blocks.
    pub fn parse(bytes: &'a [u8], num_blocks: usize) -> Result<Self, CodecError> {
        let index_size = num_blocks * BLOCK_INDEX_ENTRY_SIZE;
        if bytes.len() < CHUNK_HEADER_SIZE + index_size || bytes[..4] != CHUNK_MAGIC {
            return Err(CodecError::InvalidEncodedChunk(format!(
                "chunk of {} bytes is too short or has an invalid header",
                bytes.len()
            )));
        }
        let stored_blocks = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if u64::from(stored_blocks) != num_blocks as u64 {
            return Err(CodecError::InvalidEncodedChunk(format!(
                "chunk has {stored_blocks} blocks, expected {num_blocks}"
            )));
        }

        let blocks = &bytes[CHUNK_HEADER_SIZE + index_size..];
        let index = bytes[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + index_size]
            .chunks_exact(BLOCK_INDEX_ENTRY_SIZE)
            .map(|entry| {
                let (offset, length) = entry.split_at(8);
                let offset = u64::from_le_bytes(offset.try_into().unwrap_or_default());
                let length = u64::from_le_bytes(length.try_into().unwrap_or_default());
                if offset == BLOCK_MISSING && length == BLOCK_MISSING {
                    Ok(None)
                } else {
                    let byte_range = ByteRange::FromStart(offset, Some(length));
                    if byte_range.is_within(blocks.len() as u64) {
                        Ok(Some(byte_range))
                    } else {
                        Err(CodecError::InvalidEncodedChunk(format!(
                            "block {byte_range} is outside of {} encoded bytes",
                            blocks.len()
                        )))
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { blocks, index })
    }

    /// Return the number of blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Return the encoded bytes of the block at `block_index`, or [`None`] if it has never been written.
    #[must_use]
    pub fn block(&self, block_index: usize) -> Option<&'a [u8]> {
        self.index[block_index]
            .map(|byte_range| &self.blocks[byte_range.to_range_usize(self.blocks.len() as u64)])
    }
}

/// Encode a chunk from its encoded blocks. A [`None`] block is stored as never written.
#[must_use]
pub fn encode_chunk<B: AsRef<[u8]>>(blocks: &[Option<B>]) -> Vec<u8> {
    let num_blocks = u32::try_from(blocks.len()).unwrap_or(u32::MAX);
    let blocks_size: usize = blocks
        .iter()
        .flatten()
        .map(|block| block.as_ref().len())
        .sum();
    let capacity = CHUNK_HEADER_SIZE + blocks.len() * BLOCK_INDEX_ENTRY_SIZE + blocks_size;
    let mut encoded = Vec::with_capacity(capacity);
    encoded.extend_from_slice(&CHUNK_MAGIC);
    encoded.extend_from_slice(&num_blocks.to_le_bytes());
    let mut offset = 0u64;
    for block in blocks {
        if let Some(block) = block {
            let length = block.as_ref().len() as u64;
            encoded.extend_from_slice(&offset.to_le_bytes());
            encoded.extend_from_slice(&length.to_le_bytes());
            offset += length;
        } else {
            encoded.extend_from_slice(&BLOCK_MISSING.to_le_bytes());
            encoded.extend_from_slice(&BLOCK_MISSING.to_le_bytes());
        }
    }
    for block in blocks.iter().flatten() {
        encoded.extend_from_slice(block.as_ref());
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_chunk_blocks() -> Result<(), Box<dyn std::error::Error>> {
        let blocks = [Some(vec![1u8, 2, 3]), None, Some(vec![]), Some(vec![4])];
        let encoded = encode_chunk(&blocks);
        assert_eq!(
            encoded.len(),
            CHUNK_HEADER_SIZE + 4 * BLOCK_INDEX_ENTRY_SIZE + 4
        );

        let chunk = EncodedChunk::parse(&encoded, 4)?;
        assert_eq!(chunk.num_blocks(), 4);
        assert_eq!(chunk.block(0), Some([1u8, 2, 3].as_slice()));
        assert_eq!(chunk.block(1), None);
        assert_eq!(chunk.block(2), Some([].as_slice()));
        assert_eq!(chunk.block(3), Some([4u8].as_slice()));
        Ok(())
    }

    #[test]
    fn encoded_chunk_corrupt() {
        let encoded = encode_chunk(&[Some(vec![1u8, 2, 3]), Some(vec![4])]);
        assert!(EncodedChunk::parse(&encoded, 3).is_err());
        assert!(EncodedChunk::parse(&encoded[..encoded.len() - 1], 2).is_err());
        assert!(EncodedChunk::parse(&encoded[..20], 2).is_err());
        let mut bad_magic = encoded.clone();
        bad_magic[0] = b'X';
        assert!(EncodedChunk::parse(&bad_magic, 2).is_err());
    }
}
