//! Merged mining.
//!
//! This chain's coinbase can commit to the root of a tree of auxiliary-chain
//! block hashes. Once a parent block meeting an auxiliary chain's target is
//! found, an [`AuxPow`] proves the auxiliary block hash is committed inside
//! it: the coinbase reaches the parent's transaction root, and the auxiliary
//! hash reaches the committed root.

use thiserror::Error;

use crate::merkle::MerkleError;

pub mod commitment;
pub mod proof;
pub mod version;

pub use commitment::{
    AuxChainCommitment, COMMITMENT_LEN, MERGED_MINING_MARKER, embed_commitment,
    extract_commitment,
};
pub use proof::{AuxPow, build_proof};
pub use version::{AUXPOW_FLAG, MAX_CHAIN_ID};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuxPowError {
    #[error("{0}")]
    MalformedScript(String),

    #[error("aux commitment must be {COMMITMENT_LEN} bytes, got {len}")]
    CommitmentLength { len: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("chain index {index} out of range for aux tree of size {size}")]
    ChainIndexOutOfRange { index: u32, size: u32 },

    #[error("aux pow does not decode: {0}")]
    Decode(String),

    #[error("aux pow check failed: {0}")]
    Check(&'static str),

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}
