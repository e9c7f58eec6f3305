//! Coinbase input scripts.
//!
//! ```text
//! solo:        <height> <extra nonce as scriptnum> || flags
//! aux block:   <bits> <1 as scriptnum> OP_2
//! merged work: <bits> <extra nonce> OP_2 <marker || commitment>
//! ```
//!
//! The merged-work layout is owned by [`crate::auxpow`]; this module only
//! supplies the push helpers it is built from.

use bitcoin::ScriptBuf;
use bitcoin::opcodes::all::OP_PUSHNUM_2;
use bitcoin::pow::CompactTarget;
use bitcoin::script::{Builder, write_scriptint};

/// Consensus limit on the coinbase input script.
pub const MAX_SCRIPT_LEN: usize = 100;

/// Room left for flags after the two worst-case pushes of the solo script.
pub const MAX_FLAGS_LEN: usize = MAX_SCRIPT_LEN - 2 * (1 + 5);

/// Largest payload a single-byte direct push can carry.
const MAX_DIRECT_PUSH: usize = 75;

/// Solo-mining script for a block at `height`.
pub fn solo_script(height: u32, extra_nonce: u32, flags: &[u8]) -> ScriptBuf {
    let builder = Builder::new().push_int(i64::from(height));
    let mut bytes = push_num(builder, i64::from(extra_nonce))
        .into_script()
        .into_bytes();
    bytes.extend_from_slice(flags);
    debug_assert!(bytes.len() <= MAX_SCRIPT_LEN);
    ScriptBuf::from_bytes(bytes)
}

/// Script of a named auxiliary block. The trailing `OP_2` leaves room for
/// versioning the layout.
pub fn aux_block_script(bits: CompactTarget) -> ScriptBuf {
    let builder = Builder::new().push_int(i64::from(bits.to_consensus()));
    push_num(builder, 1).push_opcode(OP_PUSHNUM_2).into_script()
}

/// Push `n` as a minimally encoded scriptnum data push.
///
/// Unlike [`Builder::push_int`], small values are never collapsed into
/// `OP_1`..`OP_16`, so the pushed bytes are always the number's encoding.
pub fn push_num(builder: Builder, n: i64) -> Builder {
    let mut num = [0u8; 8];
    let len = write_scriptint(&mut num, n);
    push_small(builder, &num[..len])
}

/// Append a direct data push of at most 75 bytes.
pub(crate) fn push_small(builder: Builder, data: &[u8]) -> Builder {
    debug_assert!(data.len() <= MAX_DIRECT_PUSH);
    let mut bytes = builder.into_script().into_bytes();
    bytes.push(data.len() as u8);
    bytes.extend_from_slice(data);
    Builder::from(bytes)
}
