//! Chunk planning for uploads and downloads.
//!
//! Chunk sizes grow by 128 KiB for the first eight chunks
//! (128, 256, ... 1024 KiB) and stay at 1 MiB afterwards. Each chunk is
//! encrypted and MACed independently, so its position also determines the
//! CTR counter it starts from.

use crate::crypto::keys::{a32_to_block, block_to_a32};

const CHUNK_UNIT: u64 = 131_072;
const MAX_CHUNK: u64 = 1_048_576;

/// One transfer unit: a byte offset and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize {
    /// Offset of the chunk in the file
    pub position: u64,
    /// Chunk length in bytes
    pub size: usize,
}

impl ChunkSize {
    pub fn new(position: u64, size: usize) -> Self {
        Self { position, size }
    }

    /// Offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.position + self.size as u64
    }
}

/// Split a file of `total_size` bytes into chunks.
///
/// Returns an empty plan for an empty file.
pub fn get_chunk_sizes(total_size: u64) -> Vec<ChunkSize> {
    let mut chunks = Vec::new();
    let mut position = 0u64;
    let mut index = 1u64;

    while position < total_size {
        let nominal = if index <= 8 {
            index * CHUNK_UNIT
        } else {
            MAX_CHUNK
        };
        let size = nominal.min(total_size - position);
        chunks.push(ChunkSize::new(position, size as usize));
        position += size;
        index += 1;
    }

    chunks
}

/// CTR counter block for the chunk starting at `position`.
///
/// Words 0 and 1 come from the node's nonce; words 2 and 3 hold the 128-bit
/// block counter (`position / 16`) split into its high and low halves.
pub fn ctr_iv(nonce: &[u8; 16], position: u64) -> [u8; 16] {
    let mut words = block_to_a32(nonce);
    words[2] = (position / 0x10_0000_0000) as u32;
    words[3] = (position / 0x10) as u32;
    a32_to_block(words)
}

/// Starting block for a chunk's CBC-MAC: nonce words (0, 1, 0, 1).
pub fn chunk_mac_iv(nonce: &[u8; 16]) -> [u8; 16] {
    let words = block_to_a32(nonce);
    a32_to_block([words[0], words[1], words[0], words[1]])
}
