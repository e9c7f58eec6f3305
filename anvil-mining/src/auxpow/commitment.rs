//! The auxiliary-chain commitment and where it lives in the coinbase.
//!
//! # Layout
//!
//! ```text
//! coinbase script:  <bits> <extra nonce> OP_2 <payload>
//! payload (44):     fa be 6d 6d | root (32) | size (u32 LE) | nonce (u32 LE)
//! ```
//!
//! The root is carried exactly as supplied by the merged-mining pool, which
//! writes it in display (reversed) byte order.

use bitcoin::Script;
use bitcoin::ScriptBuf;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_PUSHNUM_2;
use bitcoin::pow::CompactTarget;
use bitcoin::script::{Builder, Instruction};

use super::AuxPowError;
use crate::merkle::Digest;
use crate::template::{CandidateBlock, CoinbaseRewrite};
use crate::work::coinbase::push_small;

/// Bytes announcing a merged-mining commitment.
pub const MERGED_MINING_MARKER: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];

/// Serialized length of an [`AuxChainCommitment`].
pub const COMMITMENT_LEN: usize = 40;

/// Root of the auxiliary-chain tree plus its declared size and slot nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuxChainCommitment {
    pub root: Digest,
    pub size: u32,
    pub nonce: u32,
}

impl AuxChainCommitment {
    pub fn to_bytes(&self) -> [u8; COMMITMENT_LEN] {
        let mut out = [0u8; COMMITMENT_LEN];
        out[..32].copy_from_slice(self.root.as_byte_array());
        out[32..36].copy_from_slice(&self.size.to_le_bytes());
        out[36..].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuxPowError> {
        if bytes.len() != COMMITMENT_LEN {
            return Err(AuxPowError::CommitmentLength { len: bytes.len() });
        }
        let mut root = [0u8; 32];
        root.copy_from_slice(&bytes[..32]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[32..36]);
        let mut nonce = [0u8; 4];
        nonce.copy_from_slice(&bytes[36..]);
        Ok(Self {
            root: Digest::from_byte_array(root),
            size: u32::from_le_bytes(size),
            nonce: u32::from_le_bytes(nonce),
        })
    }

    pub fn from_hex(aux: &str) -> Result<Self, AuxPowError> {
        Self::from_bytes(&hex::decode(aux)?)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Slot an auxiliary chain must occupy in a tree of `size` leaves.
    ///
    /// Derived from the nonce and the chain id, so a parent block cannot
    /// commit to two different blocks of the same chain. `None` for an
    /// empty tree.
    pub fn expected_index(&self, chain_id: u32) -> Option<u32> {
        if self.size == 0 {
            return None;
        }
        let mut rand = self.nonce;
        rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        rand = rand.wrapping_add(chain_id);
        rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        Some(rand % self.size)
    }
}

/// Merged-work coinbase script committing to `commitment`.
pub fn commitment_script(
    bits: CompactTarget,
    extra_nonce: u32,
    commitment: &AuxChainCommitment,
) -> ScriptBuf {
    let mut payload = [0u8; MERGED_MINING_MARKER.len() + COMMITMENT_LEN];
    payload[..4].copy_from_slice(&MERGED_MINING_MARKER);
    payload[4..].copy_from_slice(&commitment.to_bytes());

    let builder = Builder::new()
        .push_int(i64::from(bits.to_consensus()))
        .push_int(i64::from(extra_nonce))
        .push_opcode(OP_PUSHNUM_2);
    push_small(builder, &payload).into_script()
}

/// Rewrite the candidate's coinbase to commit to `commitment`.
///
/// The candidate itself is untouched; the returned rewrite carries the new
/// coinbase and the transaction root recomputed over it.
pub fn embed_commitment(
    candidate: &CandidateBlock,
    extra_nonce: u32,
    commitment: &AuxChainCommitment,
) -> CoinbaseRewrite {
    let script = commitment_script(candidate.header().bits, extra_nonce, commitment);
    candidate.rewrite_coinbase(script)
}

/// Parse the commitment back out of a merged-work coinbase script.
pub fn extract_commitment(script: &Script) -> Result<AuxChainCommitment, AuxPowError> {
    let malformed = |reason: &str| AuxPowError::MalformedScript(reason.to_owned());

    let mut instructions = script.instructions();
    for _ in 0..2 {
        match instructions.next() {
            Some(Ok(_)) => {}
            _ => return Err(malformed("script ends before the tag")),
        }
    }

    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_PUSHNUM_2 => {}
        _ => return Err(malformed("third element is not OP_2")),
    }

    let payload = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes(),
        _ => return Err(malformed("no commitment push after OP_2")),
    };

    let body = payload
        .strip_prefix(&MERGED_MINING_MARKER[..])
        .ok_or_else(|| malformed("merged mining marker missing"))?;

    AuxChainCommitment::from_bytes(body)
        .map_err(|_| malformed(&format!("commitment is {} bytes", body.len())))
}

/// Locate a commitment anywhere in a parent coinbase script.
///
/// Parent chains lay out their coinbase freely; only the marker and the
/// bytes following it matter. The marker must appear exactly once.
pub fn find_commitment(script: &Script) -> Result<AuxChainCommitment, AuxPowError> {
    let bytes = script.as_bytes();
    let mut hits = bytes
        .windows(MERGED_MINING_MARKER.len())
        .enumerate()
        .filter(|(_, window)| *window == MERGED_MINING_MARKER)
        .map(|(at, _)| at);

    let at = hits.next().ok_or(AuxPowError::Check("merged mining marker missing"))?;
    if hits.next().is_some() {
        return Err(AuxPowError::Check("multiple merged mining markers"));
    }

    let start = at + MERGED_MINING_MARKER.len();
    let body = bytes
        .get(start..start + COMMITMENT_LEN)
        .ok_or(AuxPowError::Check("commitment truncated"))?;
    AuxChainCommitment::from_bytes(body)
}
