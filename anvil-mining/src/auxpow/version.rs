//! Merged-mining fields of the block version.
//!
//! ```text
//! bit   31      16 15       9  8  7          0
//!       +---------+----------+---+------------+
//!       | chain id| reserved |AUX| base version|
//!       +---------+----------+---+------------+
//! ```
//!
//! The AUX flag says an [`AuxPow`](super::AuxPow) follows the header in the
//! block's serialization. The chain id keeps proofs for one chain from being
//! replayed on another that shares the same parent.

use bitcoin::block::Version;

/// Set when the block carries an auxiliary proof of work.
pub const AUXPOW_FLAG: i32 = 1 << 8;

/// First bit of the chain id.
pub const CHAIN_ID_SHIFT: u32 = 16;

/// Largest chain id that keeps the version positive.
pub const MAX_CHAIN_ID: u32 = 0x7fff;

const BASE_MASK: i32 = 0xff;

/// Version of a merged-mined block for `chain_id`, keeping the low byte of
/// `base`.
pub fn merged_version(base: Version, chain_id: u32) -> Version {
    let chain = ((chain_id & MAX_CHAIN_ID) as i32) << CHAIN_ID_SHIFT;
    Version::from_consensus((base.to_consensus() & BASE_MASK) | AUXPOW_FLAG | chain)
}

pub fn is_auxpow(version: Version) -> bool {
    version.to_consensus() & AUXPOW_FLAG != 0
}

pub fn chain_id(version: Version) -> u32 {
    (version.to_consensus() >> CHAIN_ID_SHIFT) as u32 & MAX_CHAIN_ID
}
