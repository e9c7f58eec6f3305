//! Interfaces to the rest of the node.
//!
//! The mining layer never selects transactions, validates proof of work or
//! touches chain state itself. It reads the node through [`ChainState`],
//! asks a [`BlockAssembler`] for candidates and hands solutions to a
//! [`BlockSubmitter`].
//!
//! Assembly and submission are blocking calls with no timeout: they return
//! when the node is done. The template cache never holds a lock across
//! them, so a slow call stalls only the request that made it and any poller
//! waiting for that same context's rebuild.

use bitcoin::pow::CompactTarget;
use bitcoin::{Amount, Block, BlockHash};
use thiserror::Error;

use crate::template::SolvedBlock;

/// The best block a candidate builds on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainTip {
    pub hash: BlockHash,
    pub height: u32,

    /// Median time of the last eleven blocks (unix seconds).
    pub median_time_past: u32,

    /// Difficulty bits required of the next block.
    pub bits: CompactTarget,
}

/// Read-only view of node state.
pub trait ChainState: Send + Sync {
    fn tip(&self) -> ChainTip;

    /// Counter bumped whenever the transaction pool changes.
    fn transactions_updated(&self) -> u64;

    fn connection_count(&self) -> usize;

    fn is_initial_block_download(&self) -> bool;

    /// Network-adjusted time (unix seconds).
    fn adjusted_time(&self) -> u32;

    /// Local clock (unix seconds), used for rebuild debouncing.
    fn now(&self) -> u64;

    /// Number of transactions in the pool.
    fn mempool_size(&self) -> usize;

    fn is_testnet(&self) -> bool;
}

/// A block fresh from the assembler, with its accounting.
///
/// `fees` and `sigops` run parallel to `block.txdata`; the coinbase entry
/// comes first and is not reported to template clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledBlock {
    pub block: Block,
    pub fees: Vec<Amount>,
    pub sigops: Vec<u64>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct AssemblyError(pub String);

pub trait BlockAssembler: Send + Sync {
    /// Build a new candidate on `tip`. Blocking, no timeout.
    fn create_new_block(&self, tip: &ChainTip) -> Result<AssembledBlock, AssemblyError>;
}

/// Consensus verdict on a submitted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

pub trait BlockSubmitter: Send + Sync {
    /// Validate and connect `block`. Blocking, no timeout.
    fn process_block(&self, block: &SolvedBlock) -> Verdict;
}
