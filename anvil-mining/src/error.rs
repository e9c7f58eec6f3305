//! Errors surfaced by mining operations.
//!
//! Component modules keep their own error enums; they fold into
//! [`MiningError`] at the operation boundary. Negative outcomes (an unknown
//! work root, a rejected block) are ordinary return values, not errors.

use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::auxpow::AuxPowError;
use crate::merkle::MerkleError;
use crate::work::WorkBufferError;

pub type Result<T, E = MiningError> = std::result::Result<T, E>;

/// Stable classification of a [`MiningError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    InitialSyncInProgress,
    InvalidParameter,
    DeserializationFailed,
    MalformedCommitmentScript,
    ResourceExhausted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("node is not connected to any peers")]
    NotConnected,

    #[error("node is downloading blocks")]
    InitialSyncInProgress,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("block decode failed: {0}")]
    DeserializationFailed(String),

    #[error("invalid aux pow script: {0}")]
    MalformedCommitmentScript(String),

    #[error("candidate block assembly failed: {0}")]
    ResourceExhausted(String),
}

impl MiningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected => ErrorKind::NotConnected,
            Self::InitialSyncInProgress => ErrorKind::InitialSyncInProgress,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::DeserializationFailed(_) => ErrorKind::DeserializationFailed,
            Self::MalformedCommitmentScript(_) => ErrorKind::MalformedCommitmentScript,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
        }
    }

    /// Legacy JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotConnected => -9,
            ErrorKind::InitialSyncInProgress => -10,
            ErrorKind::InvalidParameter => -8,
            ErrorKind::DeserializationFailed => -22,
            ErrorKind::MalformedCommitmentScript => -1,
            ErrorKind::ResourceExhausted => -7,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected | Self::InitialSyncInProgress)
    }
}

impl From<WorkBufferError> for MiningError {
    fn from(e: WorkBufferError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<MerkleError> for MiningError {
    fn from(e: MerkleError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<AuxPowError> for MiningError {
    fn from(e: AuxPowError) -> Self {
        match e {
            AuxPowError::MalformedScript(_) => Self::MalformedCommitmentScript(e.to_string()),
            AuxPowError::Decode(_) => Self::DeserializationFailed(e.to_string()),
            AuxPowError::ChainIndexOutOfRange { .. }
            | AuxPowError::CommitmentLength { .. }
            | AuxPowError::InvalidHex(_)
            | AuxPowError::Merkle(_)
            | AuxPowError::Check(_) => Self::InvalidParameter(e.to_string()),
        }
    }
}
