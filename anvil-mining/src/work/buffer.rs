//! Legacy getwork buffers.
//!
//! Getwork-era miners expect the block header pre-padded for SHA-256 and
//! delivered as a word-swapped 128-byte buffer, together with the hash state
//! after the first 64-byte block (so the miner only compresses the second
//! block per nonce) and a padded buffer for the second hash stage.
//!
//! # Byte layout
//!
//! The unswapped 128-byte buffer is:
//!
//! ```text
//! offset  len  field
//!      0    4  version          (i32, little-endian)
//!      4   32  prev block hash  (internal byte order)
//!     36   32  merkle root      (internal byte order)
//!     68    4  time             (u32, little-endian)
//!     72    4  bits             (u32, little-endian)
//!     76    4  nonce            (u32, little-endian)
//!     80    1  0x80             (SHA-256 padding start)
//!     81   43  zero
//!    124    4  message length in bits (640, big-endian)
//! ```
//!
//! On the wire every 32-bit word of that buffer is byte-reversed. The swap
//! is done on bytes, so the result does not depend on host endianness.

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::pow::{CompactTarget, Target};
use bitcoin::{BlockHash, TxMerkleNode};
use sha2::digest::generic_array::GenericArray;
use thiserror::Error;

/// Length of the serialized block header.
pub const HEADER_LEN: usize = 80;

/// Length of the getwork `data` buffer.
pub const DATA_LEN: usize = 128;

/// SHA-256 initial hash value.
const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkBufferError {
    #[error("work data must be {DATA_LEN} bytes, got {len}")]
    InvalidFormat { len: usize },

    #[error("work data is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A header encoded for legacy getwork miners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkBuffer {
    /// SHA-256 state after the first 64 header bytes, as little-endian words.
    pub midstate: [u8; 32],

    /// Padded, word-swapped header.
    pub data: [u8; DATA_LEN],

    /// Padded, word-swapped buffer for the second hash stage.
    pub hash1: [u8; 64],

    /// Full 256-bit target, little-endian.
    pub target: [u8; 32],
}

impl WorkBuffer {
    /// Encode a header into getwork buffers.
    pub fn encode(header: &Header) -> Self {
        let mut block = [0u8; DATA_LEN];
        write_header(header, &mut block[..HEADER_LEN]);
        sha256_pad(&mut block, HEADER_LEN);

        let midstate = midstate(&block[..64]);

        let mut data = block;
        swap_words(&mut data);

        let mut hash1 = [0u8; 64];
        sha256_pad(&mut hash1, 32);
        swap_words(&mut hash1);

        Self {
            midstate,
            data,
            hash1,
            target: Target::from_compact(header.bits).to_le_bytes(),
        }
    }

    /// Decode the header fields from a submitted `data` buffer.
    ///
    /// Only the first 80 bytes (after un-swapping) carry header fields; the
    /// padding is not checked because miners are free to leave it untouched
    /// or zero it.
    pub fn decode(bytes: &[u8]) -> Result<Header, WorkBufferError> {
        if bytes.len() != DATA_LEN {
            return Err(WorkBufferError::InvalidFormat { len: bytes.len() });
        }
        let mut buf = [0u8; DATA_LEN];
        buf.copy_from_slice(bytes);
        swap_words(&mut buf);
        Ok(read_header(&buf[..HEADER_LEN]))
    }

    /// Decode a hex-encoded `data` buffer.
    pub fn decode_hex(data: &str) -> Result<Header, WorkBufferError> {
        let bytes = hex::decode(data)?;
        Self::decode(&bytes)
    }
}

/// Byte-reverse every 32-bit word in `buf`.
///
/// `buf.len()` is always a multiple of four here; a trailing partial word
/// would be left untouched.
pub fn swap_words(buf: &mut [u8]) {
    for word in buf.chunks_exact_mut(4) {
        word.reverse();
    }
}

fn write_header(header: &Header, out: &mut [u8]) {
    out[0..4].copy_from_slice(&header.version.to_consensus().to_le_bytes());
    out[4..36].copy_from_slice(header.prev_blockhash.as_byte_array());
    out[36..68].copy_from_slice(header.merkle_root.as_byte_array());
    out[68..72].copy_from_slice(&header.time.to_le_bytes());
    out[72..76].copy_from_slice(&header.bits.to_consensus().to_le_bytes());
    out[76..80].copy_from_slice(&header.nonce.to_le_bytes());
}

fn read_header(bytes: &[u8]) -> Header {
    Header {
        version: Version::from_consensus(i32::from_le_bytes(array(bytes, 0))),
        prev_blockhash: BlockHash::from_byte_array(array(bytes, 4)),
        merkle_root: TxMerkleNode::from_byte_array(array(bytes, 36)),
        time: u32::from_le_bytes(array(bytes, 68)),
        bits: CompactTarget::from_consensus(u32::from_le_bytes(array(bytes, 72))),
        nonce: u32::from_le_bytes(array(bytes, 76)),
    }
}

fn array<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

/// Apply SHA-256 message padding for a `len`-byte message occupying the
/// front of `buf`. `buf` must be exactly the padded size.
fn sha256_pad(buf: &mut [u8], len: usize) {
    buf[len] = 0x80;
    let bits = (len as u32) * 8;
    let end = buf.len();
    buf[end - 4..].copy_from_slice(&bits.to_be_bytes());
}

fn midstate(first_block: &[u8]) -> [u8; 32] {
    let mut state = SHA256_IV;
    sha2::compress256(&mut state, &[GenericArray::clone_from_slice(first_block)]);

    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}
